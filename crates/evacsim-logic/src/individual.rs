//! Individuals: immutable identity plus mutable per-run properties.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cell::CellId;
use crate::direction::Direction8;
use crate::potential::PotentialId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndividualId(pub u32);

impl IndividualId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for IndividualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical and behavioural attributes fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub id: IndividualId,
    pub age: u32,
    /// Knowledge of the building, 0.0 (stranger) to 1.0 (knows every exit).
    pub familiarity: f64,
    /// Seconds until the individual reacts to the alarm.
    pub reaction_time: f64,
    /// Walking speed as a fraction of the absolute maximum speed.
    pub relative_speed: f64,
}

impl Individual {
    pub fn new(id: IndividualId) -> Self {
        Self {
            id,
            age: 30,
            familiarity: 1.0,
            reaction_time: 0.0,
            relative_speed: 1.0,
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = age;
        self
    }

    pub fn with_familiarity(mut self, familiarity: f64) -> Self {
        self.familiarity = familiarity;
        self
    }

    pub fn with_reaction_time(mut self, seconds: f64) -> Self {
        self.reaction_time = seconds;
        self
    }

    pub fn with_relative_speed(mut self, relative_speed: f64) -> Self {
        self.relative_speed = relative_speed;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeathCause {
    /// No static potential reaches the individual's start cell.
    ExitUnreachable,
    /// The run ended before the individual reached safety.
    NotEnoughTime,
}

impl fmt::Display for DeathCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeathCause::ExitUnreachable => write!(f, "exit unreachable"),
            DeathCause::NotEnoughTime => write!(f, "not enough time"),
        }
    }
}

/// Population membership. Exactly one holds for every individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndividualStatus {
    Remaining,
    Dead,
    Evacuated,
}

/// Mutable simulation attributes of one individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualProperty {
    /// Current cell; `None` once removed from the grid.
    pub cell: Option<CellId>,
    pub static_potential: Option<PotentialId>,
    pub alarmed: bool,
    pub panic: f64,
    pub exhaustion: f64,
    /// Current walking speed in m/s.
    pub speed: f64,
    pub direction: Direction8,
    pub step_start_time: f64,
    pub step_end_time: f64,
    pub teleport_failed: bool,
    pub(crate) safe: bool,
    pub(crate) death_cause: Option<DeathCause>,
    pub(crate) status: IndividualStatus,
    pub(crate) marked_for_removal: bool,
}

impl IndividualProperty {
    pub(crate) fn new(cell: CellId, speed: f64) -> Self {
        Self {
            cell: Some(cell),
            static_potential: None,
            alarmed: false,
            panic: 0.0,
            exhaustion: 0.0,
            speed,
            direction: Direction8::default(),
            step_start_time: 0.0,
            step_end_time: 0.0,
            teleport_failed: false,
            safe: false,
            death_cause: None,
            status: IndividualStatus::Remaining,
            marked_for_removal: false,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn is_dead(&self) -> bool {
        self.death_cause.is_some()
    }

    pub fn death_cause(&self) -> Option<DeathCause> {
        self.death_cause
    }

    pub fn status(&self) -> IndividualStatus {
        self.status
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    /// Whether a previous move is still in progress at `time`.
    pub fn is_busy_at(&self, time: f64) -> bool {
        time < self.step_end_time
    }
}
