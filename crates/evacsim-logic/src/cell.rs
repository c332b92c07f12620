//! Lattice cells and their special capabilities.
//!
//! A cell is a walkable square of the floor plan. Special cells (exits,
//! safe areas, doors, stairs, teleports) are variants of [`CellKind`];
//! rules never inspect the variant directly but go through the
//! capability queries on [`Cell`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::direction::Direction8;
use crate::individual::IndividualId;
use crate::potential::PotentialId;

/// Index of a cell inside its [`CellGrid`](crate::grid::CellGrid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u32);

impl CellId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stair geometry: which way is "up" and how much slower each way is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stairs {
    pub up: Direction8,
    pub up_factor: f64,
    pub down_factor: f64,
}

impl Stairs {
    /// Speed factor for walking in `direction` on these stairs.
    ///
    /// Directions within 45° of `up` climb, directions within 45° of the
    /// opposite descend, perpendicular moves are unaffected.
    pub fn factor(&self, direction: Direction8) -> f64 {
        match direction.turns_to(self.up) {
            0 | 1 => self.up_factor,
            3 | 4 => self.down_factor,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellKind {
    Room,
    Door,
    Exit {
        attractivity: f64,
    },
    Save {
        /// Potential adopted by individuals reaching this safe area.
        exit_potential: Option<PotentialId>,
    },
    Stairs(Stairs),
    Teleport {
        targets: Vec<CellId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub x: i32,
    pub y: i32,
    pub floor: u32,
    pub room: u32,
    pub speed_factor: f64,
    pub kind: CellKind,
    pub(crate) occupant: Option<IndividualId>,
    /// Simulation time until which the last arrival is still walking in.
    pub(crate) occupied_until: f64,
}

impl Cell {
    pub fn new(id: CellId, x: i32, y: i32, floor: u32, room: u32, kind: CellKind) -> Self {
        Self {
            id,
            x,
            y,
            floor,
            room,
            speed_factor: 1.0,
            kind,
            occupant: None,
            occupied_until: 0.0,
        }
    }

    pub fn occupant(&self) -> Option<IndividualId> {
        self.occupant
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    pub fn occupied_until(&self) -> f64 {
        self.occupied_until
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, CellKind::Exit { .. })
    }

    /// Safe areas count as safe; exits are handled by [`Cell::is_exit`].
    pub fn is_safe(&self) -> bool {
        matches!(self.kind, CellKind::Save { .. })
    }

    pub fn is_door(&self) -> bool {
        matches!(self.kind, CellKind::Door)
    }

    pub fn exit_attractivity(&self) -> Option<f64> {
        match self.kind {
            CellKind::Exit { attractivity } => Some(attractivity),
            _ => None,
        }
    }

    pub fn exit_potential(&self) -> Option<PotentialId> {
        match self.kind {
            CellKind::Save { exit_potential } => exit_potential,
            _ => None,
        }
    }

    pub fn as_stairs(&self) -> Option<&Stairs> {
        match &self.kind {
            CellKind::Stairs(stairs) => Some(stairs),
            _ => None,
        }
    }

    /// Stair slowdown for entering this cell in `direction` (1.0 off stairs).
    pub fn stair_factor(&self, direction: Direction8) -> f64 {
        self.as_stairs().map_or(1.0, |s| s.factor(direction))
    }

    pub fn teleport_targets(&self) -> Option<&[CellId]> {
        match &self.kind {
            CellKind::Teleport { targets } => Some(targets.as_slice()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellKind) -> Cell {
        Cell::new(CellId(0), 0, 0, 0, 0, kind)
    }

    #[test]
    fn capability_queries() {
        assert!(cell(CellKind::Exit { attractivity: 5.0 }).is_exit());
        assert!(!cell(CellKind::Exit { attractivity: 5.0 }).is_safe());
        assert!(cell(CellKind::Save {
            exit_potential: None
        })
        .is_safe());
        assert!(cell(CellKind::Door).is_door());
        assert_eq!(
            cell(CellKind::Teleport {
                targets: vec![CellId(3)]
            })
            .teleport_targets(),
            Some(&[CellId(3)][..])
        );
        assert_eq!(cell(CellKind::Room).teleport_targets(), None);
    }

    #[test]
    fn stair_factor_depends_on_direction() {
        let stairs = cell(CellKind::Stairs(Stairs {
            up: Direction8::North,
            up_factor: 0.5,
            down_factor: 0.8,
        }));
        assert_eq!(stairs.stair_factor(Direction8::North), 0.5);
        assert_eq!(stairs.stair_factor(Direction8::NorthWest), 0.5);
        assert_eq!(stairs.stair_factor(Direction8::South), 0.8);
        assert_eq!(stairs.stair_factor(Direction8::SouthEast), 0.8);
        assert_eq!(stairs.stair_factor(Direction8::East), 1.0);
        assert_eq!(cell(CellKind::Room).stair_factor(Direction8::North), 1.0);
    }
}
