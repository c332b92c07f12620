//! Static and dynamic potential fields.
//!
//! A static potential is a distance-like integer cost per cell leading to
//! a group of exit cells. The dynamic potential is a sparse congestion
//! trace: a cell that is absent from the map has potential zero, and an
//! entry is deleted as soon as it drops back to zero.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cell::CellId;
use crate::error::{EvacError, Result};
use crate::grid::CellGrid;

/// Integer cost of an orthogonal step in computed potentials.
pub const ORTHOGONAL_COST: u32 = 10;
/// Integer cost of a diagonal step in computed potentials.
pub const DIAGONAL_COST: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PotentialId(pub u32);

impl PotentialId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PotentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticPotential {
    pub id: PotentialId,
    pub name: String,
    costs: HashMap<CellId, u32>,
    distances: HashMap<CellId, f64>,
    attractivity: f64,
    exit_cells: BTreeSet<CellId>,
}

impl StaticPotential {
    pub fn new(id: PotentialId, attractivity: f64) -> Self {
        Self {
            id,
            name: format!("potential {}", id.0),
            costs: HashMap::new(),
            distances: HashMap::new(),
            attractivity,
            exit_cells: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Flood the grid from `exits` with Dijkstra.
    ///
    /// Costs are [`ORTHOGONAL_COST`] / [`DIAGONAL_COST`] per step; the
    /// continuous distance in metres is tracked along the same path.
    pub fn from_exits(
        grid: &CellGrid,
        id: PotentialId,
        exits: &[CellId],
        attractivity: f64,
        cell_size: f64,
    ) -> Result<Self> {
        let mut potential = Self::new(id, attractivity);
        let mut frontier = BinaryHeap::new();
        for &exit in exits {
            grid.cell(exit)?;
            potential.exit_cells.insert(exit);
            potential.costs.insert(exit, 0);
            potential.distances.insert(exit, 0.0);
            frontier.push(Reverse((0u32, exit)));
        }

        while let Some(Reverse((cost, current))) = frontier.pop() {
            if potential.costs.get(&current).is_some_and(|&c| c < cost) {
                continue;
            }
            let base_distance = potential.distances.get(&current).copied().unwrap_or(0.0);
            for n in grid.neighbours(current) {
                let (step, metres) = if n.direction.is_diagonal() {
                    (DIAGONAL_COST, std::f64::consts::SQRT_2 * cell_size)
                } else {
                    (ORTHOGONAL_COST, cell_size)
                };
                let next = cost + step;
                if potential.costs.get(&n.cell).map_or(true, |&c| next < c) {
                    potential.costs.insert(n.cell, next);
                    potential.distances.insert(n.cell, base_distance + metres);
                    frontier.push(Reverse((next, n.cell)));
                }
            }
        }

        Ok(potential)
    }

    pub fn set_cost(&mut self, cell: CellId, cost: u32) {
        self.costs.insert(cell, cost);
    }

    pub fn set_distance(&mut self, cell: CellId, distance: f64) {
        self.distances.insert(cell, distance);
    }

    pub fn add_exit_cell(&mut self, cell: CellId) {
        self.exit_cells.insert(cell);
    }

    /// Integer cost at `cell`; `None` means the exits are unreachable from it.
    pub fn cost(&self, cell: CellId) -> Option<u32> {
        self.costs.get(&cell).copied()
    }

    pub fn distance(&self, cell: CellId) -> Option<f64> {
        self.distances.get(&cell).copied()
    }

    /// Continuous distance when known, integer cost otherwise.
    pub fn distance_or_cost(&self, cell: CellId) -> Option<f64> {
        self.distance(cell)
            .or_else(|| self.cost(cell).map(|c| c as f64))
    }

    pub fn reaches(&self, cell: CellId) -> bool {
        self.costs.contains_key(&cell)
    }

    pub fn attractivity(&self) -> f64 {
        self.attractivity
    }

    pub fn exit_cells(&self) -> &BTreeSet<CellId> {
        &self.exit_cells
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}

/// Combine several potentials into one.
///
/// Cell-wise minimum of cost and distance, mean attractivity, union of
/// exit cells. The result does not depend on input order. An empty input
/// is rejected.
pub fn merge_potentials(id: PotentialId, potentials: &[&StaticPotential]) -> Result<StaticPotential> {
    if potentials.is_empty() {
        return Err(EvacError::EmptyPotentialMerge);
    }

    let attractivity =
        potentials.iter().map(|p| p.attractivity).sum::<f64>() / potentials.len() as f64;
    let mut merged = StaticPotential::new(id, attractivity).with_name("merged potential");

    for potential in potentials {
        for (&cell, &cost) in &potential.costs {
            merged
                .costs
                .entry(cell)
                .and_modify(|c| *c = (*c).min(cost))
                .or_insert(cost);
        }
        for (&cell, &distance) in &potential.distances {
            merged
                .distances
                .entry(cell)
                .and_modify(|d| *d = d.min(distance))
                .or_insert(distance);
        }
        merged.exit_cells.extend(potential.exit_cells.iter().copied());
    }

    Ok(merged)
}

/// Sparse congestion field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicPotential {
    values: BTreeMap<CellId, u32>,
}

impl DynamicPotential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cell: CellId) -> u32 {
        self.values.get(&cell).copied().unwrap_or(0)
    }

    pub fn contains(&self, cell: CellId) -> bool {
        self.values.contains_key(&cell)
    }

    pub fn increase(&mut self, cell: CellId) {
        *self.values.entry(cell).or_insert(0) += 1;
    }

    /// Lower the potential by one, deleting the entry when it reaches zero.
    pub fn decrease(&mut self, cell: CellId) -> Result<()> {
        match self.values.get_mut(&cell) {
            Some(value) if *value > 1 => {
                *value -= 1;
                Ok(())
            }
            Some(_) => {
                self.values.remove(&cell);
                Ok(())
            }
            None => Err(EvacError::NegativeDynamicPotential(cell)),
        }
    }

    /// Mapped cells in ascending order, detached from the map.
    pub fn snapshot(&self) -> Vec<CellId> {
        self.values.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.values.values().map(|&v| v as u64).sum()
    }
}

/// All potentials of a run: the static fields and the shared dynamic one.
#[derive(Debug, Clone)]
pub struct PotentialManager {
    statics: Vec<StaticPotential>,
    merged: Option<StaticPotential>,
    pub(crate) dynamic: DynamicPotential,
}

impl PotentialManager {
    /// `statics[i].id` must equal `PotentialId(i)`.
    pub fn new(statics: Vec<StaticPotential>) -> Result<Self> {
        for (index, potential) in statics.iter().enumerate() {
            if potential.id.index() != index {
                return Err(EvacError::InvalidConfig(format!(
                    "potential at position {} has id {}",
                    index, potential.id
                )));
            }
        }
        let merged = if statics.is_empty() {
            None
        } else {
            let refs: Vec<&StaticPotential> = statics.iter().collect();
            Some(merge_potentials(PotentialId(statics.len() as u32), &refs)?)
        };
        Ok(Self {
            statics,
            merged,
            dynamic: DynamicPotential::new(),
        })
    }

    pub fn static_potential(&self, id: PotentialId) -> Result<&StaticPotential> {
        self.statics
            .get(id.index())
            .ok_or(EvacError::UnknownPotential(id))
    }

    pub fn statics(&self) -> &[StaticPotential] {
        &self.statics
    }

    /// Union of every static potential, for global orderings.
    pub fn merged(&self) -> Option<&StaticPotential> {
        self.merged.as_ref()
    }

    pub fn dynamic(&self) -> &DynamicPotential {
        &self.dynamic
    }

    /// Static potentials that reach `cell`, in id order.
    pub fn reachable_from(&self, cell: CellId) -> Vec<&StaticPotential> {
        self.statics.iter().filter(|p| p.reaches(cell)).collect()
    }

    /// Exit cell → potential leading to it.
    ///
    /// With `strict`, an exit claimed by two potentials is an error;
    /// otherwise the lower potential id wins.
    pub fn exit_mapping(&self, strict: bool) -> Result<HashMap<CellId, PotentialId>> {
        let mut mapping = HashMap::new();
        for potential in &self.statics {
            for &exit in &potential.exit_cells {
                match mapping.get(&exit) {
                    Some(&first) if strict => {
                        return Err(EvacError::DuplicateExitMapping {
                            exit,
                            first,
                            second: potential.id,
                        });
                    }
                    Some(_) => {}
                    None => {
                        mapping.insert(exit, potential.id);
                    }
                }
            }
        }
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Connectivity, GridBuilder};

    fn potential(id: u32, attractivity: f64, costs: &[(u32, u32)]) -> StaticPotential {
        let mut p = StaticPotential::new(PotentialId(id), attractivity);
        for &(cell, cost) in costs {
            p.set_cost(CellId(cell), cost);
        }
        p
    }

    #[test]
    fn dynamic_increase_then_decrease_leaves_no_entry() {
        let mut dynamic = DynamicPotential::new();
        let cell = CellId(7);
        dynamic.increase(cell);
        assert_eq!(dynamic.get(cell), 1);
        dynamic.decrease(cell).unwrap();
        assert!(!dynamic.contains(cell));
        assert!(dynamic.is_empty());
    }

    #[test]
    fn dynamic_decrease_absent_is_error() {
        let mut dynamic = DynamicPotential::new();
        assert!(matches!(
            dynamic.decrease(CellId(1)),
            Err(EvacError::NegativeDynamicPotential(CellId(1)))
        ));
    }

    #[test]
    fn merge_takes_min_cost_and_mean_attractivity() {
        let mut a = potential(0, 10.0, &[(0, 5), (1, 8)]);
        a.add_exit_cell(CellId(9));
        let mut b = potential(1, 30.0, &[(1, 3), (2, 4)]);
        b.add_exit_cell(CellId(8));

        let merged = merge_potentials(PotentialId(5), &[&a, &b]).unwrap();
        assert_eq!(merged.cost(CellId(0)), Some(5));
        assert_eq!(merged.cost(CellId(1)), Some(3));
        assert_eq!(merged.cost(CellId(2)), Some(4));
        assert!((merged.attractivity() - 20.0).abs() < 1e-12);
        assert_eq!(merged.exit_cells().len(), 2);
    }

    #[test]
    fn merge_rejects_empty_input() {
        assert!(matches!(
            merge_potentials(PotentialId(0), &[]),
            Err(EvacError::EmptyPotentialMerge)
        ));
    }

    #[test]
    fn flood_from_exit() {
        let grid = GridBuilder::from_ascii(&["E..", "...", "..#"], Connectivity::Eight)
            .build()
            .unwrap();
        let exit = grid.cell_at(0, 0, 0).unwrap();
        let p = StaticPotential::from_exits(&grid, PotentialId(0), &[exit], 1.0, 0.4).unwrap();
        assert_eq!(p.cost(exit), Some(0));
        assert_eq!(p.cost(grid.cell_at(1, 0, 0).unwrap()), Some(10));
        assert_eq!(p.cost(grid.cell_at(1, 1, 0).unwrap()), Some(14));
        assert_eq!(p.cost(grid.cell_at(2, 1, 0).unwrap()), Some(24));
        let far = p.distance(grid.cell_at(1, 2, 0).unwrap()).unwrap();
        assert!((far - (0.4 + 0.4 * 2f64.sqrt())).abs() < 1e-9);
    }

    #[test]
    fn unreachable_cells_have_no_cost() {
        let grid = GridBuilder::from_ascii(&["E.#.."], Connectivity::Eight)
            .build()
            .unwrap();
        let exit = grid.cell_at(0, 0, 0).unwrap();
        let p = StaticPotential::from_exits(&grid, PotentialId(0), &[exit], 1.0, 0.4).unwrap();
        assert!(p.reaches(grid.cell_at(1, 0, 0).unwrap()));
        assert!(!p.reaches(grid.cell_at(3, 0, 0).unwrap()));
    }

    #[test]
    fn strict_exit_mapping_rejects_shared_exit() {
        let mut a = potential(0, 1.0, &[]);
        a.add_exit_cell(CellId(3));
        let mut b = potential(1, 1.0, &[]);
        b.add_exit_cell(CellId(3));
        let manager = PotentialManager::new(vec![a, b]).unwrap();
        assert!(matches!(
            manager.exit_mapping(true),
            Err(EvacError::DuplicateExitMapping { .. })
        ));
        let lenient = manager.exit_mapping(false).unwrap();
        assert_eq!(lenient[&CellId(3)], PotentialId(0));
    }

    #[test]
    fn manager_rejects_misnumbered_potentials() {
        let p = potential(3, 1.0, &[]);
        assert!(PotentialManager::new(vec![p]).is_err());
    }
}
