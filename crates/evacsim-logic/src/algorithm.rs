//! The step-driven scheduler.
//!
//! [`EvacuationCellularAutomaton`] turns an [`EvacuationProblem`] into a
//! run: primary rules once per individual, then loop rules every step
//! until everyone is safe or time runs out.
//!
//! ```
//! use evacsim_logic::algorithm::EvacuationCellularAutomaton;
//! use evacsim_logic::scenario::Scenario;
//! use evacsim_logic::stats::NullSink;
//!
//! let scenario = Scenario::from_json(r#"{
//!     "name": "corridor",
//!     "layout": ["....E"],
//!     "individuals": [{ "x": 0, "y": 0 }],
//!     "config": { "rule_set": "shortest_path" }
//! }"#).unwrap();
//! let mut ca = EvacuationCellularAutomaton::new(scenario.build().unwrap()).unwrap();
//! let outcome = ca.run(&mut NullSink).unwrap();
//! assert_eq!(outcome.evacuated_count(), 1);
//! ```

use std::collections::{HashMap, HashSet};

use log::{debug, info, trace, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::action::Action;
use crate::cell::CellId;
use crate::config::{SchedulingStrategy, SimulationConfig};
use crate::controller::EvacuationStateController;
use crate::diffusion::diffuse_and_decay;
use crate::error::{EvacError, Result};
use crate::grid::CellGrid;
use crate::individual::{DeathCause, Individual, IndividualId};
use crate::order::ordered_individuals;
use crate::parameters::{DefaultParameterSet, ParameterSet};
use crate::persistence::RunOutcome;
use crate::potential::{PotentialManager, StaticPotential};
use crate::rules::movement::{commit_move, commit_swap, stay};
use crate::rules::{
    select_target, EvacuationRule, ExitAssignments, MovementRule, Rule, RuleContext, StagedMove,
};
use crate::ruleset::RuleSet;
use crate::state::EvacuationState;
use crate::stats::StatisticsSink;

/// Everything needed to start a run.
#[derive(Debug, Clone)]
pub struct EvacuationProblem {
    pub grid: CellGrid,
    /// Static potentials; ids must equal their position.
    pub potentials: Vec<StaticPotential>,
    /// Individuals with their start cells; ids must equal their position.
    pub individuals: Vec<(Individual, CellId)>,
    /// Exit cell each individual was told to use.
    pub individual_exits: HashMap<IndividualId, CellId>,
    pub config: SimulationConfig,
}

pub struct EvacuationCellularAutomaton {
    state: EvacuationState,
    params: Box<dyn ParameterSet>,
    config: SimulationConfig,
    rules: RuleSet,
    assignments: ExitAssignments,
    rng: ChaCha8Rng,
    initialized: bool,
}

impl EvacuationCellularAutomaton {
    /// Set up a run with the default behaviour model.
    pub fn new(problem: EvacuationProblem) -> Result<Self> {
        let params = DefaultParameterSet::new(
            problem.config.parameters.clone(),
            problem.config.absolute_max_speed,
        );
        Self::with_parameters(problem, Box::new(params))
    }

    /// Set up a run with a custom behaviour model. Every configuration
    /// error surfaces here, before any rule runs.
    pub fn with_parameters(
        problem: EvacuationProblem,
        params: Box<dyn ParameterSet>,
    ) -> Result<Self> {
        let EvacuationProblem {
            grid,
            potentials,
            individuals,
            individual_exits,
            config,
        } = problem;

        config.validate()?;
        let rules = config.build_rule_set()?;
        if config.strategy == SchedulingStrategy::Swap && rules.movement().is_none() {
            return Err(EvacError::InvalidConfig(
                "swap scheduling needs a movement rule in the loop set".to_string(),
            ));
        }

        let manager = PotentialManager::new(potentials)?;
        let exit_mapping = manager.exit_mapping(config.strict_exit_mapping)?;
        for (&id, &exit) in &individual_exits {
            if !exit_mapping.contains_key(&exit) {
                return Err(EvacError::InvalidConfig(format!(
                    "individual {id} is assigned to {exit}, which no potential leads to"
                )));
            }
        }

        let state = EvacuationState::new(grid, manager, individuals, params.as_ref())?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        Ok(Self {
            state,
            params,
            config,
            rules,
            assignments: ExitAssignments {
                exit_mapping,
                individual_exits,
            },
            rng,
            initialized: false,
        })
    }

    /// Replace the random source, e.g. with a differently seeded one.
    pub fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &EvacuationState {
        &self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the primary rules once per individual in insertion order and
    /// flush anyone they queued for removal. A second call does nothing.
    pub fn initialize(&mut self, sink: &mut dyn StatisticsSink) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        let mut ctx = RuleContext::new(
            &mut self.state,
            self.params.as_ref(),
            &self.config,
            &self.assignments,
            &mut self.rng,
            sink,
        );
        let population = ctx.state.remaining().to_vec();
        for &id in &population {
            let Some(cell) = ctx.state.property_for(id)?.cell else {
                continue;
            };
            run_rules(self.rules.primary(), id, cell, &mut ctx)?;
        }
        EvacuationStateController::new(&mut *ctx.state).remove_marked()?;

        self.initialized = true;
        info!(
            "initialized {} individuals on {} cells: {} remaining, {} dead",
            self.state.initial_count(),
            self.state.grid().len(),
            self.state.remaining().len(),
            self.state.dead().len()
        );
        Ok(())
    }

    /// Advance the run by one step.
    pub fn step(&mut self, sink: &mut dyn StatisticsSink) -> Result<()> {
        if !self.initialized {
            return Err(EvacError::NotInitialized);
        }

        let swap_pass = match self.config.strategy {
            SchedulingStrategy::Direct => None,
            SchedulingStrategy::Swap => self.rules.movement(),
        };

        let mut ctx = RuleContext::new(
            &mut self.state,
            self.params.as_ref(),
            &self.config,
            &self.assignments,
            &mut self.rng,
            sink,
        );
        let order = ordered_individuals(&*ctx.state, self.config.order, &mut *ctx.rng);

        match swap_pass {
            None => {
                for &id in &order {
                    let Some(cell) = ctx.state.property_for(id)?.cell else {
                        continue;
                    };
                    run_rules(self.rules.loop_rules(), id, cell, &mut ctx)?;
                }
            }
            Some((position, movement)) => {
                ctx.direct_execute = false;
                for &id in &order {
                    let Some(cell) = ctx.state.property_for(id)?.cell else {
                        continue;
                    };
                    run_rules(self.rules.loop_rules().take(position + 1), id, cell, &mut ctx)?;
                }
                ctx.direct_execute = true;

                let staged = std::mem::take(&mut ctx.staged);
                resolve_staged(&mut ctx, staged, movement)?;

                for &id in &order {
                    if !ctx.state.is_remaining(id) {
                        continue;
                    }
                    let Some(cell) = ctx.state.property_for(id)?.cell else {
                        continue;
                    };
                    run_rules(self.rules.loop_rules().skip(position + 1), id, cell, &mut ctx)?;
                }
            }
        }

        let mut controller = EvacuationStateController::new(&mut *ctx.state);
        let evacuated = controller.remove_marked()?;
        diffuse_and_decay(
            &mut controller,
            self.config.diffusion,
            self.config.decay,
            &mut *ctx.rng,
        )?;

        self.state.advance_time();
        debug!(
            "step {}: {} evacuated, {} remaining, {} not safe",
            self.state.time_step(),
            evacuated.len(),
            self.state.remaining().len(),
            self.state.not_safe_count()
        );
        Ok(())
    }

    /// Everyone is safe and every committed move has completed, or the
    /// time limit is reached.
    pub fn is_finished(&self) -> bool {
        let time = self.state.time_step();
        let everyone_safe = self.state.not_safe_count() == 0 && time >= self.state.needed_time();
        everyone_safe || time >= self.config.max_steps()
    }

    /// Settle everyone still on the grid: the unsafe die for lack of
    /// time, the safe are evacuated.
    pub fn terminate(&mut self, sink: &mut dyn StatisticsSink) -> Result<()> {
        let step = self.state.time_step();
        let time_limit = step >= self.config.max_steps();
        let mut controller = EvacuationStateController::new(&mut self.state);
        let remaining = controller.state().remaining().to_vec();

        let mut died = 0;
        for id in remaining {
            let property = controller.state().property_for(id)?;
            if property.is_safe() {
                let cell = property.cell;
                controller.mark_for_removal(id)?;
                if let Some(cell) = cell {
                    sink.record(step, &Action::Exit { individual: id, cell });
                }
            } else {
                let cause = DeathCause::NotEnoughTime;
                let cell = controller.die(id, cause)?;
                sink.record(
                    step,
                    &Action::Die {
                        individual: id,
                        cell,
                        cause,
                    },
                );
                died += 1;
            }
        }
        controller.remove_marked()?;

        if time_limit {
            warn!("time limit of {step} steps reached");
        }
        if died > 0 {
            info!("{died} individuals did not reach safety in time");
        }
        info!(
            "run finished after {step} steps: {} evacuated, {} dead",
            self.state.evacuated().len(),
            self.state.dead().len()
        );
        Ok(())
    }

    /// Initialize if needed, step until finished and settle the rest.
    pub fn run(&mut self, sink: &mut dyn StatisticsSink) -> Result<RunOutcome> {
        self.initialize(sink)?;
        while !self.is_finished() {
            self.step(sink)?;
        }
        self.terminate(sink)?;
        Ok(self.outcome())
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome::from_state(&self.state, self.config.seed)
    }

    /// Completion estimate in `[0, 1]` for progress display only.
    pub fn progress(&self) -> f64 {
        let steps = self.state.time_step() as f64 / self.config.max_steps().max(1) as f64;
        let safe = match self.state.initial_count() {
            0 => 1.0,
            n => self.state.safe_count() as f64 / n as f64,
        };
        steps.max(safe).min(1.0)
    }
}

/// Run `rules` in order for the individual standing on `cell`, stopping
/// as soon as it has left the cell.
fn run_rules<'r>(
    rules: impl Iterator<Item = &'r Rule>,
    id: IndividualId,
    cell: CellId,
    ctx: &mut RuleContext<'_>,
) -> Result<()> {
    for rule in rules {
        if ctx.occupant(cell) != Some(id) {
            break;
        }
        if let Some(action) = rule.execute(cell, ctx)? {
            ctx.record(&action);
        }
    }
    Ok(())
}

/// Commit staged moves. Free targets are entered, mutual targets are
/// swapped and targets held by a staged individual are retried until no
/// more progress is made. Whatever is left draws again over free cells.
fn resolve_staged(
    ctx: &mut RuleContext<'_>,
    staged: Vec<StagedMove>,
    movement: &MovementRule,
) -> Result<()> {
    let mut pending = staged;
    let mut leftovers = Vec::new();
    let mut done: HashSet<IndividualId> = HashSet::new();

    while !pending.is_empty() {
        let mut retry = Vec::new();
        let mut progress = false;

        for m in &pending {
            if done.contains(&m.individual) {
                continue;
            }
            let Some(other) = ctx.state.grid().occupant(m.target)? else {
                let action = commit_move(ctx, m.individual, m.from, m.target)?;
                ctx.record(&action);
                done.insert(m.individual);
                progress = true;
                continue;
            };

            let partner = pending
                .iter()
                .find(|o| o.individual == other && !done.contains(&other));
            match partner {
                Some(p) if p.target == m.from && p.from == m.target => {
                    let action = commit_swap(ctx, m.from, m.target)?;
                    ctx.record(&action);
                    done.insert(m.individual);
                    done.insert(other);
                    progress = true;
                }
                Some(_) => retry.push(*m),
                None => leftovers.push(*m),
            }
        }

        retry.retain(|m| !done.contains(&m.individual));
        if !progress {
            leftovers.extend(retry);
            break;
        }
        pending = retry;
    }

    for m in leftovers {
        if ctx.occupant(m.from) != Some(m.individual) {
            continue;
        }
        let candidates = movement.weighted_candidates(ctx, m.individual, m.from, true)?;
        let target = select_target(m.from, &candidates, movement.selection(), &mut *ctx.rng);
        let action = if target != m.from && ctx.state.grid().is_free(target) {
            commit_move(ctx, m.individual, m.from, target)?
        } else {
            stay(ctx, m.individual, m.from)?
        };
        trace!("staged move of {} fell back to {:?}", m.individual, action);
        ctx.record(&action);
    }
    Ok(())
}
