//! The cell graph: storage, neighbourhoods and occupancy.
//!
//! `CellGrid` is the reference implementation of the floor-plan provider.
//! Geometry is fixed after [`GridBuilder::build`]; only occupancy changes
//! during a run, and only through the
//! [`EvacuationStateController`](crate::controller::EvacuationStateController).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellId, CellKind};
use crate::direction::Direction8;
use crate::error::{EvacError, Result};
use crate::individual::IndividualId;

/// How many lattice neighbours a cell is linked to automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

/// A directed link to an adjacent cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbour {
    pub cell: CellId,
    pub direction: Direction8,
}

#[derive(Debug, Clone)]
pub struct CellGrid {
    cells: Vec<Cell>,
    adjacency: Vec<Vec<Neighbour>>,
    by_position: HashMap<(i32, i32, u32), CellId>,
    /// (floor, room) → member cells, ascending id.
    rooms: BTreeMap<(u32, u32), Vec<CellId>>,
}

impl CellGrid {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, id: CellId) -> Result<&Cell> {
        self.cells.get(id.index()).ok_or(EvacError::UnknownCell(id))
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> Result<&mut Cell> {
        self.cells.get_mut(id.index()).ok_or(EvacError::UnknownCell(id))
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn cell_at(&self, x: i32, y: i32, floor: u32) -> Option<CellId> {
        self.by_position.get(&(x, y, floor)).copied()
    }

    pub fn occupant(&self, id: CellId) -> Result<Option<IndividualId>> {
        Ok(self.cell(id)?.occupant)
    }

    pub fn is_free(&self, id: CellId) -> bool {
        self.cells.get(id.index()).is_some_and(|c| c.occupant.is_none())
    }

    /// All linked neighbours, in link order. Unknown cells have none.
    pub fn neighbours(&self, id: CellId) -> &[Neighbour] {
        self.adjacency
            .get(id.index())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn free_neighbours(&self, id: CellId) -> Vec<Neighbour> {
        self.neighbours(id)
            .iter()
            .filter(|n| self.is_free(n.cell))
            .copied()
            .collect()
    }

    /// Direction of the step `from → to`. Linked cells report the link
    /// direction; otherwise the coordinate delta decides.
    pub fn direction(&self, from: CellId, to: CellId) -> Result<Option<Direction8>> {
        if let Some(n) = self.neighbours(from).iter().find(|n| n.cell == to) {
            return Ok(Some(n.direction));
        }
        let a = self.cell(from)?;
        let b = self.cell(to)?;
        Ok(Direction8::from_delta(b.x - a.x, b.y - a.y))
    }

    /// Walking distance in metres between two adjacent cells.
    ///
    /// Cells sharing the same lattice offset (e.g. linked across floors)
    /// are one `cell_size` apart.
    pub fn distance(&self, from: CellId, to: CellId, cell_size: f64) -> Result<f64> {
        let a = self.cell(from)?;
        let b = self.cell(to)?;
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        if dx != 0 && dy != 0 {
            Ok(std::f64::consts::SQRT_2 * cell_size)
        } else {
            Ok(cell_size)
        }
    }

    pub fn cells_in_room(&self, floor: u32, room: u32) -> &[CellId] {
        self.rooms
            .get(&(floor, room))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn exits(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .filter(|c| c.is_exit())
            .map(|c| c.id)
            .collect()
    }

    pub(crate) fn set_occupant(&mut self, id: CellId, occupant: Option<IndividualId>) -> Result<()> {
        self.cell_mut(id)?.occupant = occupant;
        Ok(())
    }

    pub(crate) fn set_occupied_until(&mut self, id: CellId, time: f64) -> Result<()> {
        self.cell_mut(id)?.occupied_until = time;
        Ok(())
    }
}

/// Incrementally assembles a [`CellGrid`].
#[derive(Debug, Clone, Default)]
pub struct GridBuilder {
    cells: Vec<Cell>,
    connectivity: Connectivity,
    links: Vec<(CellId, CellId, Direction8)>,
}

impl GridBuilder {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            cells: Vec::new(),
            connectivity,
            links: Vec::new(),
        }
    }

    /// Parse a single-floor plan.
    ///
    /// | char | cell |
    /// |------|------|
    /// | `.` | room cell, room 0 |
    /// | `a`–`z` | room cell, rooms 1–26 |
    /// | `D` | door |
    /// | `E` | exit (attractivity 1.0) |
    /// | `S` | safe area |
    /// | `T` | teleport (targets set later with [`GridBuilder::set_kind`]) |
    /// | `#`, space | no cell |
    pub fn from_ascii(rows: &[&str], connectivity: Connectivity) -> Self {
        let mut builder = Self::new(connectivity);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                let (room, kind) = match ch {
                    '.' => (0, CellKind::Room),
                    'a'..='z' => (ch as u32 - 'a' as u32 + 1, CellKind::Room),
                    'D' => (0, CellKind::Door),
                    'E' => (0, CellKind::Exit { attractivity: 1.0 }),
                    'S' => (
                        0,
                        CellKind::Save {
                            exit_potential: None,
                        },
                    ),
                    'T' => (0, CellKind::Teleport { targets: vec![] }),
                    _ => continue,
                };
                builder.add_cell(x as i32, y as i32, 0, room, kind);
            }
        }
        builder
    }

    pub fn add_cell(&mut self, x: i32, y: i32, floor: u32, room: u32, kind: CellKind) -> CellId {
        let id = CellId(self.cells.len() as u32);
        self.cells.push(Cell::new(id, x, y, floor, room, kind));
        id
    }

    pub fn cell_at(&self, x: i32, y: i32, floor: u32) -> Option<CellId> {
        self.cells
            .iter()
            .find(|c| c.x == x && c.y == y && c.floor == floor)
            .map(|c| c.id)
    }

    pub fn set_kind(&mut self, id: CellId, kind: CellKind) -> Result<()> {
        let cell = self
            .cells
            .get_mut(id.index())
            .ok_or(EvacError::UnknownCell(id))?;
        cell.kind = kind;
        Ok(())
    }

    pub fn set_speed_factor(&mut self, id: CellId, speed_factor: f64) -> Result<()> {
        let cell = self
            .cells
            .get_mut(id.index())
            .ok_or(EvacError::UnknownCell(id))?;
        cell.speed_factor = speed_factor;
        Ok(())
    }

    /// Add a two-way link that lattice adjacency would not create
    /// (stairs between floors, for instance). `direction` is the
    /// heading when walking from `a` to `b`.
    pub fn link(&mut self, a: CellId, b: CellId, direction: Direction8) -> &mut Self {
        self.links.push((a, b, direction));
        self
    }

    pub fn build(self) -> Result<CellGrid> {
        let mut by_position = HashMap::with_capacity(self.cells.len());
        let mut rooms: BTreeMap<(u32, u32), Vec<CellId>> = BTreeMap::new();
        for cell in &self.cells {
            if by_position.insert((cell.x, cell.y, cell.floor), cell.id).is_some() {
                return Err(EvacError::InvalidConfig(format!(
                    "two cells at ({}, {}) on floor {}",
                    cell.x, cell.y, cell.floor
                )));
            }
            rooms.entry((cell.floor, cell.room)).or_default().push(cell.id);
        }

        let directions: &[Direction8] = match self.connectivity {
            Connectivity::Four => &Direction8::ORTHOGONAL,
            Connectivity::Eight => &Direction8::ALL,
        };

        let mut adjacency: Vec<Vec<Neighbour>> = vec![Vec::new(); self.cells.len()];
        for cell in &self.cells {
            for &direction in directions {
                let (dx, dy) = direction.offset();
                let Some(&other) = by_position.get(&(cell.x + dx, cell.y + dy, cell.floor)) else {
                    continue;
                };
                let neighbour = &self.cells[other.index()];
                if cell.room == neighbour.room || is_connector(cell) || is_connector(neighbour) {
                    adjacency[cell.id.index()].push(Neighbour {
                        cell: other,
                        direction,
                    });
                }
            }
        }

        for (a, b, direction) in self.links {
            if a.index() >= self.cells.len() {
                return Err(EvacError::UnknownCell(a));
            }
            if b.index() >= self.cells.len() {
                return Err(EvacError::UnknownCell(b));
            }
            adjacency[a.index()].push(Neighbour { cell: b, direction });
            adjacency[b.index()].push(Neighbour {
                cell: a,
                direction: direction.opposite(),
            });
        }

        Ok(CellGrid {
            cells: self.cells,
            adjacency,
            by_position,
            rooms,
        })
    }
}

/// Cells that join rooms: everything except plain room cells.
fn is_connector(cell: &Cell) -> bool {
    !matches!(cell.kind, CellKind::Room)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor() -> CellGrid {
        GridBuilder::from_ascii(&["#####", "#...E", "#####"], Connectivity::Eight)
            .build()
            .unwrap()
    }

    #[test]
    fn parses_ascii_plan() {
        let grid = corridor();
        assert_eq!(grid.len(), 4);
        let exit = grid.cell_at(4, 1, 0).unwrap();
        assert!(grid.cell(exit).unwrap().is_exit());
        assert_eq!(grid.exits(), vec![exit]);
    }

    #[test]
    fn corridor_neighbours() {
        let grid = corridor();
        let middle = grid.cell_at(2, 1, 0).unwrap();
        let n = grid.neighbours(middle);
        assert_eq!(n.len(), 2);
        assert!(n.iter().any(|n| n.direction == Direction8::East));
        assert!(n.iter().any(|n| n.direction == Direction8::West));
    }

    #[test]
    fn four_connectivity_skips_diagonals() {
        let rows = ["...", "...", "..."];
        let eight = GridBuilder::from_ascii(&rows, Connectivity::Eight)
            .build()
            .unwrap();
        let four = GridBuilder::from_ascii(&rows, Connectivity::Four)
            .build()
            .unwrap();
        let centre = eight.cell_at(1, 1, 0).unwrap();
        assert_eq!(eight.neighbours(centre).len(), 8);
        assert_eq!(four.neighbours(centre).len(), 4);
    }

    #[test]
    fn rooms_only_join_through_doors() {
        // Room a and room b touch along a wall but share only the door.
        let grid = GridBuilder::from_ascii(&["aab", "aDb", "aab"], Connectivity::Eight)
            .build()
            .unwrap();
        let a = grid.cell_at(1, 0, 0).unwrap();
        let b = grid.cell_at(2, 0, 0).unwrap();
        let door = grid.cell_at(1, 1, 0).unwrap();
        assert!(!grid.neighbours(a).iter().any(|n| n.cell == b));
        assert!(grid.neighbours(a).iter().any(|n| n.cell == door));
        assert!(grid.neighbours(door).iter().any(|n| n.cell == b));
        assert_eq!(grid.cells_in_room(0, 1).len(), 5);
        assert_eq!(grid.cells_in_room(0, 2).len(), 3);
    }

    #[test]
    fn distances() {
        let grid = GridBuilder::from_ascii(&["..", ".."], Connectivity::Eight)
            .build()
            .unwrap();
        let origin = grid.cell_at(0, 0, 0).unwrap();
        let east = grid.cell_at(1, 0, 0).unwrap();
        let diagonal = grid.cell_at(1, 1, 0).unwrap();
        assert!((grid.distance(origin, east, 0.4).unwrap() - 0.4).abs() < 1e-12);
        assert!(
            (grid.distance(origin, diagonal, 0.4).unwrap() - 0.4 * 2f64.sqrt()).abs() < 1e-12
        );
    }

    #[test]
    fn explicit_link_across_floors() {
        let mut builder = GridBuilder::new(Connectivity::Eight);
        let lower = builder.add_cell(3, 3, 0, 0, CellKind::Room);
        let upper = builder.add_cell(3, 3, 1, 0, CellKind::Room);
        builder.link(lower, upper, Direction8::North);
        let grid = builder.build().unwrap();
        assert_eq!(
            grid.direction(lower, upper).unwrap(),
            Some(Direction8::North)
        );
        assert_eq!(
            grid.direction(upper, lower).unwrap(),
            Some(Direction8::South)
        );
        assert!((grid.distance(lower, upper, 0.4).unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn duplicate_position_rejected() {
        let mut builder = GridBuilder::new(Connectivity::Four);
        builder.add_cell(0, 0, 0, 0, CellKind::Room);
        builder.add_cell(0, 0, 0, 1, CellKind::Room);
        assert!(matches!(builder.build(), Err(EvacError::InvalidConfig(_))));
    }

    #[test]
    fn free_neighbours_exclude_occupied() {
        let mut grid = corridor();
        let middle = grid.cell_at(2, 1, 0).unwrap();
        let west = grid.cell_at(1, 1, 0).unwrap();
        grid.set_occupant(west, Some(IndividualId(0))).unwrap();
        let free = grid.free_neighbours(middle);
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].direction, Direction8::East);
    }
}
