//! Saving and loading run outcomes.
//!
//! Uses bincode; the file starts with a format version so an outcome
//! written by an incompatible build is rejected instead of misread.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{EvacError, Result};
use crate::individual::{DeathCause, IndividualId, IndividualStatus};
use crate::state::EvacuationState;

/// Version number for the outcome format (increment when it changes)
pub const OUTCOME_VERSION: u32 = 1;

/// Final record of one individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualOutcome {
    pub id: IndividualId,
    pub status: IndividualStatus,
    pub death_cause: Option<DeathCause>,
    /// When the last committed step completed, in steps.
    pub step_end_time: f64,
}

/// Summary of a finished (or aborted) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub steps: u64,
    pub needed_time: u64,
    pub seed: u64,
    /// Evacuated individuals in the order they left.
    pub evacuation_order: Vec<IndividualId>,
    pub individuals: Vec<IndividualOutcome>,
}

impl RunOutcome {
    pub fn from_state(state: &EvacuationState, seed: u64) -> Self {
        let individuals = state
            .individuals()
            .iter()
            .filter_map(|individual| {
                let property = state.property_for(individual.id).ok()?;
                Some(IndividualOutcome {
                    id: individual.id,
                    status: property.status(),
                    death_cause: property.death_cause(),
                    step_end_time: property.step_end_time,
                })
            })
            .collect();
        Self {
            steps: state.time_step(),
            needed_time: state.needed_time(),
            seed,
            evacuation_order: state.evacuated().to_vec(),
            individuals,
        }
    }

    pub fn evacuated_count(&self) -> usize {
        self.count_status(IndividualStatus::Evacuated)
    }

    pub fn dead_count(&self) -> usize {
        self.count_status(IndividualStatus::Dead)
    }

    pub fn remaining_count(&self) -> usize {
        self.count_status(IndividualStatus::Remaining)
    }

    pub fn deaths_by(&self, cause: DeathCause) -> usize {
        self.individuals
            .iter()
            .filter(|i| i.death_cause == Some(cause))
            .count()
    }

    fn count_status(&self, status: IndividualStatus) -> usize {
        self.individuals.iter().filter(|i| i.status == status).count()
    }
}

#[derive(Serialize, Deserialize)]
struct OutcomeFile {
    version: u32,
    outcome: RunOutcome,
}

/// Write an outcome to a writer
pub fn save_outcome<W: Write>(writer: W, outcome: &RunOutcome) -> Result<()> {
    let file = OutcomeFile {
        version: OUTCOME_VERSION,
        outcome: outcome.clone(),
    };
    bincode::serialize_into(writer, &file)?;
    Ok(())
}

/// Read an outcome from a reader
pub fn load_outcome<R: Read>(reader: R) -> Result<RunOutcome> {
    let file: OutcomeFile = bincode::deserialize_from(reader)?;
    if file.version != OUTCOME_VERSION {
        return Err(EvacError::VersionMismatch {
            expected: OUTCOME_VERSION,
            found: file.version,
        });
    }
    Ok(file.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> RunOutcome {
        RunOutcome {
            steps: 12,
            needed_time: 11,
            seed: 42,
            evacuation_order: vec![IndividualId(1)],
            individuals: vec![
                IndividualOutcome {
                    id: IndividualId(0),
                    status: IndividualStatus::Dead,
                    death_cause: Some(DeathCause::NotEnoughTime),
                    step_end_time: 3.5,
                },
                IndividualOutcome {
                    id: IndividualId(1),
                    status: IndividualStatus::Evacuated,
                    death_cause: None,
                    step_end_time: 10.2,
                },
            ],
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let original = outcome();
        let mut buffer = Vec::new();
        save_outcome(&mut buffer, &original).unwrap();
        let loaded = load_outcome(&buffer[..]).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.dead_count(), 1);
        assert_eq!(loaded.evacuated_count(), 1);
        assert_eq!(loaded.deaths_by(DeathCause::NotEnoughTime), 1);
    }

    #[test]
    fn rejects_other_versions() {
        let file = OutcomeFile {
            version: OUTCOME_VERSION + 1,
            outcome: outcome(),
        };
        let buffer = bincode::serialize(&file).unwrap();
        assert!(matches!(
            load_outcome(&buffer[..]),
            Err(EvacError::VersionMismatch { found, .. }) if found == OUTCOME_VERSION + 1
        ));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut buffer = Vec::new();
        save_outcome(&mut buffer, &outcome()).unwrap();
        buffer.truncate(buffer.len() / 2);
        assert!(matches!(
            load_outcome(&buffer[..]),
            Err(EvacError::Bincode(_))
        ));
    }
}
