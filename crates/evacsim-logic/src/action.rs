//! Records of what a rule did.
//!
//! Rules return at most one [`Action`] per execution; the scheduler hands
//! each to the [`StatisticsSink`](crate::stats::StatisticsSink).

use serde::{Deserialize, Serialize};

use crate::cell::CellId;
use crate::individual::{DeathCause, IndividualId};
use crate::potential::PotentialId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Move {
        individual: IndividualId,
        from: CellId,
        to: CellId,
    },
    Stay {
        individual: IndividualId,
        cell: CellId,
    },
    Swap {
        first: IndividualId,
        second: IndividualId,
        first_cell: CellId,
        second_cell: CellId,
    },
    Die {
        individual: IndividualId,
        cell: Option<CellId>,
        cause: DeathCause,
    },
    Save {
        individual: IndividualId,
        cell: CellId,
    },
    Exit {
        individual: IndividualId,
        cell: CellId,
    },
    Teleport {
        individual: IndividualId,
        from: CellId,
        to: CellId,
    },
    TeleportFailed {
        individual: IndividualId,
        cell: CellId,
    },
    Alarm {
        individual: IndividualId,
    },
    AlarmRoom {
        room: u32,
        individuals: Vec<IndividualId>,
    },
    PotentialAssigned {
        individual: IndividualId,
        potential: PotentialId,
    },
    PotentialChanged {
        individual: IndividualId,
        from: PotentialId,
        to: PotentialId,
    },
    PanicChanged {
        individual: IndividualId,
        panic: f64,
    },
    ExhaustionChanged {
        individual: IndividualId,
        exhaustion: f64,
    },
}

impl Action {
    /// Individuals this action is about, in a fixed order.
    pub fn individuals(&self) -> Vec<IndividualId> {
        match self {
            Action::Move { individual, .. }
            | Action::Stay { individual, .. }
            | Action::Die { individual, .. }
            | Action::Save { individual, .. }
            | Action::Exit { individual, .. }
            | Action::Teleport { individual, .. }
            | Action::TeleportFailed { individual, .. }
            | Action::Alarm { individual }
            | Action::PotentialAssigned { individual, .. }
            | Action::PotentialChanged { individual, .. }
            | Action::PanicChanged { individual, .. }
            | Action::ExhaustionChanged { individual, .. } => vec![*individual],
            Action::Swap { first, second, .. } => vec![*first, *second],
            Action::AlarmRoom { individuals, .. } => individuals.clone(),
        }
    }

    /// Whether the action changed someone's cell.
    pub fn is_relocation(&self) -> bool {
        matches!(
            self,
            Action::Move { .. } | Action::Swap { .. } | Action::Teleport { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_names_both_individuals() {
        let action = Action::Swap {
            first: IndividualId(1),
            second: IndividualId(2),
            first_cell: CellId(0),
            second_cell: CellId(1),
        };
        assert_eq!(action.individuals(), vec![IndividualId(1), IndividualId(2)]);
        assert!(action.is_relocation());
        assert!(!Action::Alarm {
            individual: IndividualId(0)
        }
        .is_relocation());
    }
}
