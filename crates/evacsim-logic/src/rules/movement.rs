//! Movement: target selection, timing and commit.
//!
//! Per individual and step the movement rule walks a small state machine:
//!
//! 1. not alarmed: no move, possibly look around;
//! 2. alarmed but still walking (`current_time < step_end_time`): skip;
//! 3. alarmed and free: choose a target among the neighbours (plus the
//!    current cell) by a weighted draw over `exp(effective potential)`,
//!    then commit it or stage it for the swap pass.
//!
//! A committed step takes `distance / (speed · cell speed · stair factor)`
//! seconds, converted to steps, plus the sway delay for turning.

use log::trace;
use rand::{Rng, RngCore};

use super::{EvacuationRule, RuleContext};
use crate::action::Action;
use crate::cell::CellId;
use crate::direction::sway_delay;
use crate::error::{EvacError, Result};
use crate::individual::IndividualId;

/// Chance that a waiting, not yet alarmed individual turns its head.
pub const LOOK_AROUND_PROBABILITY: f64 = 0.2;

/// Weight multiplier for the candidate straight ahead.
pub const FACING_BOOST: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Draw proportionally to weight.
    Roulette,
    /// Always the heaviest candidate, earliest on ties.
    MostProbable,
}

/// A movement choice waiting for the swap pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedMove {
    pub individual: IndividualId,
    pub from: CellId,
    pub target: CellId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovementRule {
    name: &'static str,
    selection: Selection,
    only_free: bool,
    facing_boost: bool,
    idle: bool,
}

impl MovementRule {
    pub fn simple() -> Self {
        Self {
            name: "movement_simple",
            selection: Selection::Roulette,
            only_free: true,
            facing_boost: false,
            idle: false,
        }
    }

    /// Like [`MovementRule::simple`], but sometimes stands idle.
    pub fn waiting() -> Self {
        Self {
            name: "movement_waiting",
            idle: true,
            ..Self::simple()
        }
    }

    /// Also targets occupied cells so that the swap pass can exchange
    /// individuals facing each other.
    pub fn swap() -> Self {
        Self {
            name: "movement_swap",
            only_free: false,
            facing_boost: true,
            ..Self::simple()
        }
    }

    pub fn most_probable() -> Self {
        Self {
            name: "movement_most_probable",
            selection: Selection::MostProbable,
            facing_boost: true,
            ..Self::simple()
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn only_free(&self) -> bool {
        self.only_free
    }

    /// Candidate cells around `origin` with their selection weights.
    ///
    /// The origin is always offered; cells the assigned potential does
    /// not reach are dropped. Without an assigned potential there are no
    /// candidates.
    pub fn weighted_candidates(
        &self,
        ctx: &RuleContext<'_>,
        id: IndividualId,
        origin: CellId,
        only_free: bool,
    ) -> Result<Vec<(CellId, f64)>> {
        let Some(potential) = ctx.state.assigned_potential(id)? else {
            return Ok(Vec::new());
        };
        let property = ctx.state.property_for(id)?;
        let grid = ctx.state.grid();
        let dynamic = ctx.state.potentials().dynamic();

        let mut cells = vec![origin];
        for n in grid.neighbours(origin) {
            if only_free && !grid.is_free(n.cell) {
                continue;
            }
            if !cells.contains(&n.cell) {
                cells.push(n.cell);
            }
        }

        let scored: Vec<(CellId, f64)> = cells
            .into_iter()
            .filter_map(|c| {
                ctx.params
                    .effective_potential(property, potential, origin, c, dynamic)
                    .map(|e| (c, e))
            })
            .collect();
        let Some(max) = scored.iter().map(|&(_, e)| e).reduce(f64::max) else {
            return Ok(Vec::new());
        };
        let mut weighted: Vec<(CellId, f64)> =
            scored.into_iter().map(|(c, e)| (c, (e - max).exp())).collect();

        if self.facing_boost {
            let home = grid.cell(origin)?;
            let mut same_room = true;
            for &(c, _) in &weighted {
                let cell = grid.cell(c)?;
                same_room &= cell.floor == home.floor && cell.room == home.room;
            }
            if same_room {
                for (c, w) in weighted.iter_mut() {
                    if *c != origin && grid.direction(origin, *c)? == Some(property.direction) {
                        *w *= FACING_BOOST;
                    }
                }
            }
        }

        Ok(weighted)
    }
}

/// Choose one candidate. An empty list means staying on `origin`.
pub fn select_target(
    origin: CellId,
    candidates: &[(CellId, f64)],
    selection: Selection,
    rng: &mut dyn RngCore,
) -> CellId {
    let Some(&(first, _)) = candidates.first() else {
        return origin;
    };

    let heaviest = candidates
        .iter()
        .fold((first, f64::NEG_INFINITY), |best, &(c, w)| {
            if w > best.1 {
                (c, w)
            } else {
                best
            }
        })
        .0;

    match selection {
        Selection::MostProbable => heaviest,
        Selection::Roulette => {
            let total: f64 = candidates.iter().map(|&(_, w)| w).sum();
            if !(total.is_finite() && total > 0.0) {
                return heaviest;
            }
            let draw = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            for &(cell, weight) in candidates {
                acc += weight;
                if draw < acc {
                    return cell;
                }
            }
            candidates[candidates.len() - 1].0
        }
    }
}

fn update_panic(ctx: &mut RuleContext<'_>, id: IndividualId, cell: CellId) -> Result<()> {
    let neighbours = ctx.state.grid().neighbours(cell);
    let occupied = neighbours
        .iter()
        .filter(|n| !ctx.state.grid().is_free(n.cell))
        .count();
    let share = if neighbours.is_empty() {
        0.0
    } else {
        occupied as f64 / neighbours.len() as f64
    };

    let property = ctx.state.property_for(id)?;
    let panic = ctx.params.update_panic(property, share);
    if panic != property.panic {
        ctx.state.property_mut(id)?.panic = panic;
        ctx.record(&Action::PanicChanged {
            individual: id,
            panic,
        });
    }
    Ok(())
}

fn update_exhaustion(ctx: &mut RuleContext<'_>, id: IndividualId, moved: bool) -> Result<()> {
    let property = ctx.state.property_for(id)?;
    let exhaustion = ctx.params.update_exhaustion(property, moved);
    if exhaustion != property.exhaustion {
        ctx.state.property_mut(id)?.exhaustion = exhaustion;
        ctx.record(&Action::ExhaustionChanged {
            individual: id,
            exhaustion,
        });
    }
    Ok(())
}

/// Spend one time unit without moving.
pub(crate) fn no_move(ctx: &mut RuleContext<'_>, id: IndividualId, look_around: bool) -> Result<()> {
    let turn_to = if look_around && ctx.rng.gen::<f64>() < LOOK_AROUND_PROBABILITY {
        let cell = ctx.state.property_for(id)?.cell;
        let neighbours = cell.map(|c| ctx.state.grid().neighbours(c)).unwrap_or(&[]);
        if neighbours.is_empty() {
            None
        } else {
            Some(neighbours[ctx.rng.gen_range(0..neighbours.len())].direction)
        }
    } else {
        None
    };

    let property = ctx.state.property_mut(id)?;
    property.step_start_time = property.step_end_time;
    property.step_end_time += 1.0;
    if let Some(direction) = turn_to {
        property.direction = direction;
    }
    Ok(())
}

/// An alarmed individual deliberately stays where it is.
pub(crate) fn stay(ctx: &mut RuleContext<'_>, id: IndividualId, cell: CellId) -> Result<Action> {
    no_move(ctx, id, false)?;
    update_exhaustion(ctx, id, false)?;
    Ok(Action::Stay {
        individual: id,
        cell,
    })
}

/// Walking time for a step `from → to` that has already been committed
/// to the grid. Updates direction, step times and the target's
/// occupancy time.
fn apply_timing(ctx: &mut RuleContext<'_>, id: IndividualId, from: CellId, to: CellId) -> Result<()> {
    update_exhaustion(ctx, id, true)?;
    let individual = ctx.state.individual(id)?;
    let speed = ctx
        .params
        .update_preferred_speed(individual, ctx.state.property_for(id)?);
    ctx.state.property_mut(id)?.speed = speed;

    let grid = ctx.state.grid();
    let property = ctx.state.property_for(id)?;
    let direction = grid.direction(from, to)?.unwrap_or(property.direction);
    let distance = grid.distance(from, to, ctx.config.cell_size)?;
    let target = grid.cell(to)?;
    let effective_speed = property.speed * target.speed_factor * target.stair_factor(direction);
    if !(effective_speed.is_finite() && effective_speed > 0.0) {
        return Err(EvacError::InvalidSpeed {
            individual: id,
            speed: effective_speed,
        });
    }

    let time = ctx.current_time();
    // A step that ended during the previous step continues without a gap.
    let start = if property.step_end_time > time - 1.0 {
        property.step_end_time
    } else {
        time
    };
    let duration = distance / effective_speed * ctx.config.steps_per_second
        + sway_delay(property.direction, direction);
    let end = start + duration;

    let property = ctx.state.property_mut(id)?;
    property.direction = direction;
    property.step_start_time = start;
    property.step_end_time = end;
    ctx.state.grid.set_occupied_until(to, end)?;
    ctx.state.record_step_end(end);
    Ok(())
}

/// Move the occupant of `from` onto the free cell `to` and time the step.
pub(crate) fn commit_move(
    ctx: &mut RuleContext<'_>,
    id: IndividualId,
    from: CellId,
    to: CellId,
) -> Result<Action> {
    ctx.controller().move_individual(from, to)?;
    apply_timing(ctx, id, from, to)?;
    trace!("individual {id} moved {from} -> {to}");
    Ok(Action::Move {
        individual: id,
        from,
        to,
    })
}

/// Exchange the occupants of `a` and `b` and time both steps.
pub(crate) fn commit_swap(ctx: &mut RuleContext<'_>, a: CellId, b: CellId) -> Result<Action> {
    let (first, second) = ctx.controller().swap(a, b)?;
    apply_timing(ctx, first, a, b)?;
    apply_timing(ctx, second, b, a)?;
    trace!("individuals {first} and {second} swapped {a} <-> {b}");
    Ok(Action::Swap {
        first,
        second,
        first_cell: a,
        second_cell: b,
    })
}

impl EvacuationRule for MovementRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool {
        ctx.occupant(cell)
            .and_then(|id| ctx.state.property_for(id).ok())
            .is_some_and(|p| !p.is_marked_for_removal())
    }

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        let Some(id) = ctx.occupant(cell) else {
            return Ok(None);
        };
        let property = ctx.state.property_for(id)?;

        if !property.alarmed {
            no_move(ctx, id, true)?;
            return Ok(None);
        }
        if property.is_busy_at(ctx.current_time()) {
            return Ok(None);
        }

        update_panic(ctx, id, cell)?;

        let idle = self.idle && {
            let threshold = ctx.params.idle_threshold(ctx.state.property_for(id)?);
            ctx.rng.gen::<f64>() < threshold
        };
        let target = if idle {
            cell
        } else {
            let candidates = self.weighted_candidates(ctx, id, cell, self.only_free)?;
            select_target(cell, &candidates, self.selection, ctx.rng)
        };

        if target == cell {
            return stay(ctx, id, cell).map(Some);
        }
        if !ctx.direct_execute {
            ctx.staged.push(StagedMove {
                individual: id,
                from: cell,
                target,
            });
            return Ok(None);
        }
        if !ctx.state.grid().is_free(target) {
            return stay(ctx, id, cell).map(Some);
        }
        commit_move(ctx, id, cell, target).map(Some)
    }
}
