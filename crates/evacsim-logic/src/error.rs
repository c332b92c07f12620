//! Fatal error conditions.
//!
//! Only programming-invariant violations and setup errors live here.
//! Expected simulation outcomes (unreachable exits, failed teleports,
//! running out of time) are state transitions, not errors.

use thiserror::Error;

use crate::cell::CellId;
use crate::individual::IndividualId;
use crate::potential::PotentialId;

#[derive(Error, Debug)]
pub enum EvacError {
    #[error("individual {0} is not registered in the evacuation state")]
    UnknownIndividual(IndividualId),

    #[error("cell {0} does not exist")]
    UnknownCell(CellId),

    #[error("static potential {0} does not exist")]
    UnknownPotential(PotentialId),

    #[error("individual {0} is already dead")]
    AlreadyDead(IndividualId),

    #[error("individual {0} is no longer part of the remaining population")]
    NotRemaining(IndividualId),

    #[error("cell {0} is not occupied")]
    CellEmpty(CellId),

    #[error("cell {cell} is already occupied by individual {occupant}")]
    CellOccupied { cell: CellId, occupant: IndividualId },

    #[error("cannot swap cell {0} with itself")]
    SwapSameCell(CellId),

    #[error("dynamic potential of cell {0} would drop below zero")]
    NegativeDynamicPotential(CellId),

    #[error("individual {individual} has invalid speed {speed}")]
    InvalidSpeed { individual: IndividualId, speed: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown rule: {0}")]
    UnknownRule(String),

    #[error("unknown rule set: {0}")]
    UnknownRuleSet(String),

    #[error("exit cell {exit} is mapped to potentials {first} and {second}")]
    DuplicateExitMapping {
        exit: CellId,
        first: PotentialId,
        second: PotentialId,
    },

    #[error("cannot merge an empty list of potentials")]
    EmptyPotentialMerge,

    #[error("simulation has not been initialized")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("outcome version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

pub type Result<T> = std::result::Result<T, EvacError>;
