//! Switching to a different exit during the run.

use log::trace;
use rand::Rng;

use super::{EvacuationRule, RuleContext};
use crate::action::Action;
use crate::cell::CellId;
use crate::error::Result;
use crate::potential::StaticPotential;

/// Free neighbours that must look better under a candidate potential
/// before it is adopted.
pub const MIN_PROMISING_NEIGHBOURS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTrigger {
    /// Wants to change with the parameter set's change threshold.
    Probabilistic,
    /// Wants to change when no free neighbour is closer to the current exit.
    Blocked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PotentialChangeRule {
    trigger: ChangeTrigger,
}

impl PotentialChangeRule {
    pub fn new(trigger: ChangeTrigger) -> Self {
        Self { trigger }
    }

    pub fn trigger(&self) -> ChangeTrigger {
        self.trigger
    }
}

fn cost_or_max(potential: &StaticPotential, cell: CellId) -> u32 {
    potential.cost(cell).unwrap_or(u32::MAX)
}

/// Free neighbours that are strictly cheaper under `candidate` than
/// under `current`.
fn promising_neighbours(
    ctx: &RuleContext<'_>,
    cell: CellId,
    current: &StaticPotential,
    candidate: &StaticPotential,
) -> usize {
    ctx.state
        .grid()
        .free_neighbours(cell)
        .iter()
        .filter(|n| {
            candidate
                .cost(n.cell)
                .is_some_and(|c| c < cost_or_max(current, n.cell))
        })
        .count()
}

impl EvacuationRule for PotentialChangeRule {
    fn name(&self) -> &'static str {
        match self.trigger {
            ChangeTrigger::Probabilistic => "potential_change_probabilistic",
            ChangeTrigger::Blocked => "potential_change_blocked",
        }
    }

    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool {
        let interval = ctx.config.potential_change_interval_steps();
        if ctx.state.time_step() % interval != 0 {
            return false;
        }
        ctx.occupant(cell)
            .and_then(|id| ctx.state.property_for(id).ok())
            .is_some_and(|p| {
                p.alarmed && !p.is_safe() && !p.is_marked_for_removal() && p.static_potential.is_some()
            })
    }

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        let Some(id) = ctx.occupant(cell) else {
            return Ok(None);
        };
        let Some(current) = ctx.state.assigned_potential(id)? else {
            return Ok(None);
        };
        let current_id = current.id;

        let wants_change = match self.trigger {
            ChangeTrigger::Probabilistic => {
                let threshold = ctx.params.change_potential_threshold(ctx.state.property_for(id)?);
                ctx.rng.gen::<f64>() < threshold
            }
            ChangeTrigger::Blocked => {
                let here = cost_or_max(current, cell);
                !ctx.state
                    .grid()
                    .free_neighbours(cell)
                    .iter()
                    .any(|n| current.cost(n.cell).is_some_and(|c| c < here))
            }
        };
        if !wants_change {
            return Ok(None);
        }

        let mut candidates: Vec<&StaticPotential> = ctx
            .state
            .potentials()
            .reachable_from(cell)
            .into_iter()
            .filter(|p| p.id != current_id)
            .collect();
        candidates.sort_by_key(|p| (cost_or_max(p, cell), p.id));

        let adopted = candidates
            .iter()
            .find(|candidate| {
                promising_neighbours(ctx, cell, current, candidate) >= MIN_PROMISING_NEIGHBOURS
            })
            .map(|p| p.id);

        let Some(next) = adopted else {
            return Ok(None);
        };
        ctx.state.property_mut(id)?.static_potential = Some(next);
        trace!("individual {id} changed exit {current_id} -> {next}");
        Ok(Some(Action::PotentialChanged {
            individual: id,
            from: current_id,
            to: next,
        }))
    }
}
