//! Canonical snapshot of a run in progress.
//!
//! [`EvacuationState`] owns the grid, the potentials and every
//! individual's property record. Reads are free; changes that touch more
//! than one collection go through
//! [`EvacuationStateController`](crate::controller::EvacuationStateController).

use std::collections::HashSet;

use crate::cell::CellId;
use crate::error::{EvacError, Result};
use crate::grid::CellGrid;
use crate::individual::{Individual, IndividualId, IndividualProperty, IndividualStatus};
use crate::parameters::ParameterSet;
use crate::potential::{PotentialManager, StaticPotential};

#[derive(Debug, Clone)]
pub struct EvacuationState {
    pub(crate) grid: CellGrid,
    pub(crate) potentials: PotentialManager,
    individuals: Vec<Individual>,
    pub(crate) properties: Vec<IndividualProperty>,
    pub(crate) remaining: Vec<IndividualId>,
    pub(crate) dead: Vec<IndividualId>,
    pub(crate) evacuated: Vec<IndividualId>,
    pub(crate) pending_removal: Vec<IndividualId>,
    pub(crate) time_step: u64,
    pub(crate) needed_time: u64,
    pub(crate) not_safe: usize,
    pub(crate) teleport_used: HashSet<CellId>,
}

impl EvacuationState {
    /// Place every individual on its start cell.
    ///
    /// Individual ids must be `0..n` in order; two individuals on one
    /// cell is an error.
    pub fn new(
        mut grid: CellGrid,
        potentials: PotentialManager,
        placements: Vec<(Individual, CellId)>,
        params: &dyn ParameterSet,
    ) -> Result<Self> {
        let mut individuals = Vec::with_capacity(placements.len());
        let mut properties = Vec::with_capacity(placements.len());
        let mut remaining = Vec::with_capacity(placements.len());

        for (index, (individual, cell)) in placements.into_iter().enumerate() {
            if individual.id.index() != index {
                return Err(EvacError::InvalidConfig(format!(
                    "individual at position {} has id {}",
                    index, individual.id
                )));
            }
            if let Some(occupant) = grid.occupant(cell)? {
                return Err(EvacError::CellOccupied { cell, occupant });
            }
            grid.set_occupant(cell, Some(individual.id))?;
            properties.push(IndividualProperty::new(cell, params.initial_speed(&individual)));
            remaining.push(individual.id);
            individuals.push(individual);
        }

        let not_safe = individuals.len();
        Ok(Self {
            grid,
            potentials,
            individuals,
            properties,
            remaining,
            dead: Vec::new(),
            evacuated: Vec::new(),
            pending_removal: Vec::new(),
            time_step: 0,
            needed_time: 0,
            not_safe,
            teleport_used: HashSet::new(),
        })
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn potentials(&self) -> &PotentialManager {
        &self.potentials
    }

    /// The initial roster, in insertion order.
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn individual(&self, id: IndividualId) -> Result<&Individual> {
        self.individuals
            .get(id.index())
            .ok_or(EvacError::UnknownIndividual(id))
    }

    pub fn property_for(&self, id: IndividualId) -> Result<&IndividualProperty> {
        self.properties
            .get(id.index())
            .ok_or(EvacError::UnknownIndividual(id))
    }

    /// Direct access to the freely mutable attributes (timing, panic,
    /// direction...). Membership and safety stay controller-only.
    pub fn property_mut(&mut self, id: IndividualId) -> Result<&mut IndividualProperty> {
        self.properties
            .get_mut(id.index())
            .ok_or(EvacError::UnknownIndividual(id))
    }

    pub fn remaining(&self) -> &[IndividualId] {
        &self.remaining
    }

    pub fn dead(&self) -> &[IndividualId] {
        &self.dead
    }

    /// Evacuated individuals in evacuation order.
    pub fn evacuated(&self) -> &[IndividualId] {
        &self.evacuated
    }

    pub fn pending_removal(&self) -> &[IndividualId] {
        &self.pending_removal
    }

    pub fn is_remaining(&self, id: IndividualId) -> bool {
        self.properties
            .get(id.index())
            .is_some_and(|p| p.status == IndividualStatus::Remaining)
    }

    pub fn time_step(&self) -> u64 {
        self.time_step
    }

    /// Simulation clock in steps, the unit of `step_end_time`.
    pub fn current_time(&self) -> f64 {
        self.time_step as f64
    }

    /// Latest step at which a committed move completes.
    pub fn needed_time(&self) -> u64 {
        self.needed_time
    }

    /// Remaining individuals that are not safe yet.
    pub fn not_safe_count(&self) -> usize {
        self.not_safe
    }

    pub fn initial_count(&self) -> usize {
        self.individuals.len()
    }

    /// Evacuated plus remaining-and-safe.
    pub fn safe_count(&self) -> usize {
        self.evacuated.len()
            + self
                .remaining
                .iter()
                .filter(|id| self.properties[id.index()].safe)
                .count()
    }

    pub fn teleport_used(&self, cell: CellId) -> bool {
        self.teleport_used.contains(&cell)
    }

    /// The static potential assigned to `id`, if any.
    pub fn assigned_potential(&self, id: IndividualId) -> Result<Option<&StaticPotential>> {
        match self.property_for(id)?.static_potential {
            Some(pid) => Ok(Some(self.potentials.static_potential(pid)?)),
            None => Ok(None),
        }
    }

    /// Advance the clock by one step and forget this step's teleports.
    pub(crate) fn advance_time(&mut self) {
        self.time_step += 1;
        self.teleport_used.clear();
    }

    pub(crate) fn record_step_end(&mut self, step_end_time: f64) {
        let end = step_end_time.ceil().max(0.0) as u64;
        self.needed_time = self.needed_time.max(end);
    }

    /// Every broken bookkeeping rule, as text. Empty for a consistent state.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let remaining: HashSet<_> = self.remaining.iter().copied().collect();
        let dead: HashSet<_> = self.dead.iter().copied().collect();
        let evacuated: HashSet<_> = self.evacuated.iter().copied().collect();

        for individual in &self.individuals {
            let id = individual.id;
            let memberships = [&remaining, &dead, &evacuated]
                .iter()
                .filter(|set| set.contains(&id))
                .count();
            if memberships != 1 {
                violations.push(format!("individual {id} is in {memberships} populations"));
            }

            let property = &self.properties[id.index()];
            if property.is_dead() != dead.contains(&id) {
                violations.push(format!("individual {id} death cause disagrees with status"));
            }
            let expected = if dead.contains(&id) {
                IndividualStatus::Dead
            } else if evacuated.contains(&id) {
                IndividualStatus::Evacuated
            } else {
                IndividualStatus::Remaining
            };
            if property.status != expected {
                violations.push(format!("individual {id} status is {:?}", property.status));
            }

            match property.cell {
                Some(cell) if property.status == IndividualStatus::Remaining => {
                    if self.grid.occupant(cell).ok().flatten() != Some(id) {
                        violations.push(format!("individual {id} is not the occupant of {cell}"));
                    }
                }
                Some(cell) => {
                    violations.push(format!("individual {id} left the run but still holds {cell}"));
                }
                None if property.status == IndividualStatus::Remaining => {
                    violations.push(format!("remaining individual {id} has no cell"));
                }
                None => {}
            }
        }

        let unsafe_remaining = self
            .remaining
            .iter()
            .filter(|id| !self.properties[id.index()].safe)
            .count();
        if unsafe_remaining != self.not_safe {
            violations.push(format!(
                "not-safe counter is {} but {} remaining individuals are unsafe",
                self.not_safe, unsafe_remaining
            ));
        }

        for cell in self.grid.cells() {
            if let Some(occupant) = cell.occupant() {
                let holds = self
                    .properties
                    .get(occupant.index())
                    .is_some_and(|p| p.cell == Some(cell.id));
                if !holds {
                    violations.push(format!("cell {} names {occupant} as occupant", cell.id));
                }
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Connectivity, GridBuilder};
    use crate::parameters::{DefaultParameterSet, ParameterConfig};

    fn state(positions: &[(i32, i32)]) -> Result<EvacuationState> {
        let grid = GridBuilder::from_ascii(&["....E"], Connectivity::Eight).build()?;
        let placements = positions
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                let cell = grid.cell_at(x, y, 0).unwrap();
                (Individual::new(IndividualId(i as u32)), cell)
            })
            .collect();
        let params = DefaultParameterSet::new(ParameterConfig::default(), 2.0);
        EvacuationState::new(grid, PotentialManager::new(vec![])?, placements, &params)
    }

    #[test]
    fn places_individuals() {
        let state = state(&[(0, 0), (2, 0)]).unwrap();
        assert_eq!(state.remaining().len(), 2);
        assert_eq!(state.not_safe_count(), 2);
        let cell = state.property_for(IndividualId(1)).unwrap().cell.unwrap();
        assert_eq!(state.grid().occupant(cell).unwrap(), Some(IndividualId(1)));
        assert!(state.invariant_violations().is_empty());
    }

    #[test]
    fn rejects_shared_start_cell() {
        assert!(matches!(
            state(&[(1, 0), (1, 0)]),
            Err(EvacError::CellOccupied { .. })
        ));
    }

    #[test]
    fn unknown_individual_is_error() {
        let state = state(&[(0, 0)]).unwrap();
        assert!(matches!(
            state.property_for(IndividualId(5)),
            Err(EvacError::UnknownIndividual(IndividualId(5)))
        ));
    }

    #[test]
    fn needed_time_rounds_up() {
        let mut state = state(&[]).unwrap();
        state.record_step_end(3.2);
        state.record_step_end(2.0);
        assert_eq!(state.needed_time(), 4);
    }
}
