//! Eight-way lattice directions and the sway penalty for turning.

use serde::{Deserialize, Serialize};

/// One of the eight lattice directions. `y` grows southwards.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Direction8 {
    #[default]
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction8 {
    pub const ALL: [Direction8; 8] = [
        Direction8::North,
        Direction8::NorthEast,
        Direction8::East,
        Direction8::SouthEast,
        Direction8::South,
        Direction8::SouthWest,
        Direction8::West,
        Direction8::NorthWest,
    ];

    /// The four axis-aligned directions.
    pub const ORTHOGONAL: [Direction8; 4] = [
        Direction8::North,
        Direction8::East,
        Direction8::South,
        Direction8::West,
    ];

    /// Position on the compass, clockwise from north.
    pub fn index(self) -> u8 {
        match self {
            Direction8::North => 0,
            Direction8::NorthEast => 1,
            Direction8::East => 2,
            Direction8::SouthEast => 3,
            Direction8::South => 4,
            Direction8::SouthWest => 5,
            Direction8::West => 6,
            Direction8::NorthWest => 7,
        }
    }

    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index % 8) as usize]
    }

    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction8::North => (0, -1),
            Direction8::NorthEast => (1, -1),
            Direction8::East => (1, 0),
            Direction8::SouthEast => (1, 1),
            Direction8::South => (0, 1),
            Direction8::SouthWest => (-1, 1),
            Direction8::West => (-1, 0),
            Direction8::NorthWest => (-1, -1),
        }
    }

    /// Direction of a coordinate delta, using only its signs.
    /// Returns `None` for a zero delta.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx.signum(), dy.signum()) {
            (0, -1) => Some(Direction8::North),
            (1, -1) => Some(Direction8::NorthEast),
            (1, 0) => Some(Direction8::East),
            (1, 1) => Some(Direction8::SouthEast),
            (0, 1) => Some(Direction8::South),
            (-1, 1) => Some(Direction8::SouthWest),
            (-1, 0) => Some(Direction8::West),
            (-1, -1) => Some(Direction8::NorthWest),
            _ => None,
        }
    }

    pub fn is_diagonal(self) -> bool {
        self.index() % 2 == 1
    }

    pub fn opposite(self) -> Self {
        Self::from_index(self.index() + 4)
    }

    /// Number of 45° turns between two directions (0..=4).
    pub fn turns_to(self, other: Direction8) -> u8 {
        let diff = (self.index() as i16 - other.index() as i16).rem_euclid(8) as u8;
        diff.min(8 - diff)
    }
}

/// Extra steps charged for turning from `current` to `next`.
///
/// | turn | delay |
/// |------|-------|
/// | 0°   | 0.0   |
/// | 45°  | 0.5   |
/// | 90°  | 1.0   |
/// | 135° | 2.0   |
/// | 180° | 2.0   |
pub fn sway_delay(current: Direction8, next: Direction8) -> f64 {
    match current.turns_to(next) {
        0 => 0.0,
        1 => 0.5,
        2 => 1.0,
        _ => 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sway_delay_by_angle() {
        let d = Direction8::East;
        assert_eq!(sway_delay(d, Direction8::East), 0.0);
        assert_eq!(sway_delay(d, Direction8::NorthEast), 0.5);
        assert_eq!(sway_delay(d, Direction8::SouthEast), 0.5);
        assert_eq!(sway_delay(d, Direction8::North), 1.0);
        assert_eq!(sway_delay(d, Direction8::NorthWest), 2.0);
        assert_eq!(sway_delay(d, Direction8::West), 2.0);
    }

    #[test]
    fn turns_wrap_around() {
        assert_eq!(Direction8::North.turns_to(Direction8::NorthWest), 1);
        assert_eq!(Direction8::NorthWest.turns_to(Direction8::NorthEast), 2);
        assert_eq!(Direction8::North.turns_to(Direction8::South), 4);
    }

    #[test]
    fn delta_round_trip() {
        for dir in Direction8::ALL {
            let (dx, dy) = dir.offset();
            assert_eq!(Direction8::from_delta(dx, dy), Some(dir));
            assert_eq!(Direction8::from_delta(dx * 3, dy * 3), Some(dir));
        }
        assert_eq!(Direction8::from_delta(0, 0), None);
    }

    #[test]
    fn diagonal_and_opposite() {
        assert!(Direction8::NorthEast.is_diagonal());
        assert!(!Direction8::South.is_diagonal());
        assert_eq!(Direction8::SouthWest.opposite(), Direction8::NorthEast);
        assert_eq!(Direction8::West.opposite(), Direction8::East);
    }
}
