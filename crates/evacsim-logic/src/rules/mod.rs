//! The per-cell rule state machine.
//!
//! A rule looks at one occupied cell, decides whether it applies
//! ([`EvacuationRule::executable_on`]) and, if so, changes the state and
//! reports what happened as an [`Action`]. Rules hold no state between
//! calls; everything they read or write lives in the [`RuleContext`].
//!
//! Rules are constructed by name through [`Rule::from_name`]:
//!
//! | Name | Rule |
//! |------|------|
//! | `reaction_one_person` | alarm when the own reaction time has passed |
//! | `reaction_all_in_room` | first to react alarms the whole room |
//! | `reaction_complete_room` | react early once anyone in the room is alarmed |
//! | `initial_potential_shortest_path` | nearest exit |
//! | `initial_potential_attractivity` | most attractive reachable exit |
//! | `initial_potential_familiarity` | familiarity-weighted choice |
//! | `initial_potential_exit_mapping` | explicitly assigned exit |
//! | `potential_change_probabilistic` | random wish to change exit |
//! | `potential_change_blocked` | change exit when stuck |
//! | `movement_simple` | roulette draw over free neighbours |
//! | `movement_waiting` | as simple, with idle steps |
//! | `movement_swap` | may target occupied cells, facing boost |
//! | `movement_most_probable` | always the best neighbour, facing boost |
//! | `save` | reaching a safe or exit cell makes safe |
//! | `evacuate` | completed arrival on an exit queues removal |
//! | `teleport` | instant relocation from teleport cells |

use std::collections::HashMap;

use rand::RngCore;

use crate::action::Action;
use crate::cell::CellId;
use crate::config::SimulationConfig;
use crate::controller::EvacuationStateController;
use crate::error::{EvacError, Result};
use crate::individual::IndividualId;
use crate::parameters::ParameterSet;
use crate::potential::PotentialId;
use crate::state::EvacuationState;
use crate::stats::StatisticsSink;

pub mod evacuate;
pub mod initial_potential;
pub mod movement;
pub mod potential_change;
pub mod reaction;
pub mod save;
pub mod teleport;

pub use evacuate::EvacuateRule;
pub use initial_potential::{InitialPotentialRule, InitialStrategy};
pub use movement::{select_target, MovementRule, Selection, StagedMove};
pub use potential_change::{ChangeTrigger, PotentialChangeRule};
pub use reaction::{ReactionRule, ReactionScope};
pub use save::SaveRule;
pub use teleport::TeleportRule;

/// Fixed exit assignments of a run.
#[derive(Debug, Clone, Default)]
pub struct ExitAssignments {
    /// Exit cell → potential leading to it.
    pub exit_mapping: HashMap<CellId, PotentialId>,
    /// Individual → the exit cell it was told to use.
    pub individual_exits: HashMap<IndividualId, CellId>,
}

/// Everything a rule may read or change.
pub struct RuleContext<'a> {
    pub state: &'a mut EvacuationState,
    pub params: &'a dyn ParameterSet,
    pub config: &'a SimulationConfig,
    pub assignments: &'a ExitAssignments,
    pub rng: &'a mut dyn RngCore,
    sink: &'a mut dyn StatisticsSink,
    /// When false, movement rules stage their choice in `staged`
    /// instead of committing it.
    pub(crate) direct_execute: bool,
    pub(crate) staged: Vec<StagedMove>,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        state: &'a mut EvacuationState,
        params: &'a dyn ParameterSet,
        config: &'a SimulationConfig,
        assignments: &'a ExitAssignments,
        rng: &'a mut dyn RngCore,
        sink: &'a mut dyn StatisticsSink,
    ) -> Self {
        Self {
            state,
            params,
            config,
            assignments,
            rng,
            sink,
            direct_execute: true,
            staged: Vec::new(),
        }
    }

    pub fn controller(&mut self) -> EvacuationStateController<'_> {
        EvacuationStateController::new(self.state)
    }

    /// Report an action besides the one a rule returns.
    pub fn record(&mut self, action: &Action) {
        self.sink.record(self.state.time_step(), action);
    }

    /// The remaining individual standing on `cell`.
    pub fn occupant(&self, cell: CellId) -> Option<IndividualId> {
        self.state
            .grid()
            .occupant(cell)
            .ok()
            .flatten()
            .filter(|&id| self.state.is_remaining(id))
    }

    pub fn current_time(&self) -> f64 {
        self.state.current_time()
    }

    pub fn steps_per_second(&self) -> f64 {
        self.config.steps_per_second
    }
}

pub trait EvacuationRule {
    fn name(&self) -> &'static str;

    /// Whether the rule applies to the occupant of `cell` right now.
    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool;

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>>;

    /// Run the rule if it applies. Not applying is a silent skip.
    fn execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        if self.executable_on(cell, ctx) {
            self.on_execute(cell, ctx)
        } else {
            Ok(None)
        }
    }
}

/// Closed set of rule kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Reaction(ReactionRule),
    InitialPotential(InitialPotentialRule),
    PotentialChange(PotentialChangeRule),
    Movement(MovementRule),
    Save(SaveRule),
    Evacuate(EvacuateRule),
    Teleport(TeleportRule),
}

impl Rule {
    pub const NAMES: [&'static str; 16] = [
        "reaction_one_person",
        "reaction_all_in_room",
        "reaction_complete_room",
        "initial_potential_shortest_path",
        "initial_potential_attractivity",
        "initial_potential_familiarity",
        "initial_potential_exit_mapping",
        "potential_change_probabilistic",
        "potential_change_blocked",
        "movement_simple",
        "movement_waiting",
        "movement_swap",
        "movement_most_probable",
        "save",
        "evacuate",
        "teleport",
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        let rule = match name {
            "reaction_one_person" => Rule::Reaction(ReactionRule::new(ReactionScope::OnePerson)),
            "reaction_all_in_room" => {
                Rule::Reaction(ReactionRule::new(ReactionScope::AllPersonsInRoom))
            }
            "reaction_complete_room" => {
                Rule::Reaction(ReactionRule::new(ReactionScope::CompleteRoom))
            }
            "initial_potential_shortest_path" => {
                Rule::InitialPotential(InitialPotentialRule::new(InitialStrategy::ShortestPath))
            }
            "initial_potential_attractivity" => {
                Rule::InitialPotential(InitialPotentialRule::new(InitialStrategy::Attractivity))
            }
            "initial_potential_familiarity" => {
                Rule::InitialPotential(InitialPotentialRule::new(InitialStrategy::Familiarity))
            }
            "initial_potential_exit_mapping" => {
                Rule::InitialPotential(InitialPotentialRule::new(InitialStrategy::ExitMapping))
            }
            "potential_change_probabilistic" => {
                Rule::PotentialChange(PotentialChangeRule::new(ChangeTrigger::Probabilistic))
            }
            "potential_change_blocked" => {
                Rule::PotentialChange(PotentialChangeRule::new(ChangeTrigger::Blocked))
            }
            "movement_simple" => Rule::Movement(MovementRule::simple()),
            "movement_waiting" => Rule::Movement(MovementRule::waiting()),
            "movement_swap" => Rule::Movement(MovementRule::swap()),
            "movement_most_probable" => Rule::Movement(MovementRule::most_probable()),
            "save" => Rule::Save(SaveRule),
            "evacuate" => Rule::Evacuate(EvacuateRule),
            "teleport" => Rule::Teleport(TeleportRule),
            other => return Err(EvacError::UnknownRule(other.to_string())),
        };
        Ok(rule)
    }

    fn inner(&self) -> &dyn EvacuationRule {
        match self {
            Rule::Reaction(r) => r,
            Rule::InitialPotential(r) => r,
            Rule::PotentialChange(r) => r,
            Rule::Movement(r) => r,
            Rule::Save(r) => r,
            Rule::Evacuate(r) => r,
            Rule::Teleport(r) => r,
        }
    }

    pub fn as_movement(&self) -> Option<&MovementRule> {
        match self {
            Rule::Movement(m) => Some(m),
            _ => None,
        }
    }
}

impl EvacuationRule for Rule {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool {
        self.inner().executable_on(cell, ctx)
    }

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        self.inner().on_execute(cell, ctx)
    }
}
