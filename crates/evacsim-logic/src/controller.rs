//! The only mutator of cross-collection invariants.
//!
//! Death, safety, deferred removal, relocation and the dynamic potential
//! all change several pieces of [`EvacuationState`] at once. Each method
//! here applies one such change completely or fails before touching
//! anything.

use std::collections::HashSet;

use log::trace;

use crate::cell::CellId;
use crate::error::{EvacError, Result};
use crate::individual::{DeathCause, IndividualId, IndividualStatus};
use crate::state::EvacuationState;

pub struct EvacuationStateController<'a> {
    state: &'a mut EvacuationState,
}

impl<'a> EvacuationStateController<'a> {
    pub fn new(state: &'a mut EvacuationState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &EvacuationState {
        &*self.state
    }

    fn ensure_remaining(&self, id: IndividualId) -> Result<()> {
        match self.state.property_for(id)?.status {
            IndividualStatus::Remaining => Ok(()),
            IndividualStatus::Dead => Err(EvacError::AlreadyDead(id)),
            IndividualStatus::Evacuated => Err(EvacError::NotRemaining(id)),
        }
    }

    fn vacate(&mut self, id: IndividualId) -> Result<Option<CellId>> {
        let cell = self.state.property_mut(id)?.cell.take();
        if let Some(cell) = cell {
            self.state.grid.set_occupant(cell, None)?;
        }
        Ok(cell)
    }

    /// Kill a remaining individual. Calling this twice is an error.
    ///
    /// Returns the cell the individual was removed from.
    pub fn die(&mut self, id: IndividualId, cause: DeathCause) -> Result<Option<CellId>> {
        self.ensure_remaining(id)?;

        let was_safe = {
            let property = self.state.property_mut(id)?;
            property.death_cause = Some(cause);
            property.status = IndividualStatus::Dead;
            property.marked_for_removal = false;
            property.safe
        };
        if !was_safe {
            self.state.not_safe -= 1;
        }
        self.state.remaining.retain(|&r| r != id);
        self.state.pending_removal.retain(|&r| r != id);
        self.state.dead.push(id);
        let cell = self.vacate(id)?;
        trace!("individual {id} died ({cause})");
        Ok(cell)
    }

    /// Mark as safe. Returns `false` if the individual already was.
    pub fn set_safe(&mut self, id: IndividualId) -> Result<bool> {
        self.ensure_remaining(id)?;
        let property = self.state.property_mut(id)?;
        if property.safe {
            return Ok(false);
        }
        property.safe = true;
        self.state.not_safe -= 1;
        Ok(true)
    }

    /// Raise the alarm for one individual. Returns `false` if already alarmed.
    pub fn alarm(&mut self, id: IndividualId) -> Result<bool> {
        self.ensure_remaining(id)?;
        let property = self.state.property_mut(id)?;
        if property.alarmed {
            return Ok(false);
        }
        property.alarmed = true;
        Ok(true)
    }

    /// Queue an individual for evacuation at the end of the step.
    pub fn mark_for_removal(&mut self, id: IndividualId) -> Result<()> {
        self.ensure_remaining(id)?;
        let property = self.state.property_mut(id)?;
        if !property.marked_for_removal {
            property.marked_for_removal = true;
            self.state.pending_removal.push(id);
        }
        Ok(())
    }

    /// Evacuate exactly the queued individuals, in queue order.
    pub fn remove_marked(&mut self) -> Result<Vec<IndividualId>> {
        if self.state.pending_removal.is_empty() {
            return Ok(Vec::new());
        }

        let pending = std::mem::take(&mut self.state.pending_removal);
        for &id in &pending {
            self.set_safe(id)?;
            let property = self.state.property_mut(id)?;
            property.status = IndividualStatus::Evacuated;
            property.marked_for_removal = false;
            self.vacate(id)?;
            self.state.evacuated.push(id);
        }

        let removed: HashSet<IndividualId> = pending.iter().copied().collect();
        self.state.remaining.retain(|id| !removed.contains(id));
        trace!("evacuated {} individuals", pending.len());
        Ok(pending)
    }

    fn occupant_of(&self, cell: CellId) -> Result<IndividualId> {
        self.state
            .grid
            .occupant(cell)?
            .ok_or(EvacError::CellEmpty(cell))
    }

    fn relocate(&mut self, id: IndividualId, to: CellId) -> Result<()> {
        self.state.grid.set_occupant(to, Some(id))?;
        self.state.property_mut(id)?.cell = Some(to);
        Ok(())
    }

    /// Move the occupant of `from` onto the free cell `to`, raising the
    /// dynamic potential of `to`.
    pub fn move_individual(&mut self, from: CellId, to: CellId) -> Result<IndividualId> {
        let id = self.occupant_of(from)?;
        if let Some(occupant) = self.state.grid.occupant(to)? {
            return Err(EvacError::CellOccupied { cell: to, occupant });
        }
        self.ensure_remaining(id)?;

        self.state.grid.set_occupant(from, None)?;
        self.relocate(id, to)?;
        self.increase_dynamic_potential(to)?;
        Ok(id)
    }

    /// Exchange the occupants of two cells, raising the dynamic potential
    /// of both cells once.
    pub fn swap(&mut self, a: CellId, b: CellId) -> Result<(IndividualId, IndividualId)> {
        if a == b {
            return Err(EvacError::SwapSameCell(a));
        }
        let first = self.occupant_of(a)?;
        let second = self.occupant_of(b)?;
        self.ensure_remaining(first)?;
        self.ensure_remaining(second)?;

        self.relocate(first, b)?;
        self.relocate(second, a)?;
        self.increase_dynamic_potential(a)?;
        self.increase_dynamic_potential(b)?;
        Ok((first, second))
    }

    /// Relocate without leaving a crowd trace, and remember `to` as used
    /// for the rest of the step.
    pub fn teleport(&mut self, from: CellId, to: CellId) -> Result<IndividualId> {
        let id = self.occupant_of(from)?;
        if let Some(occupant) = self.state.grid.occupant(to)? {
            return Err(EvacError::CellOccupied { cell: to, occupant });
        }
        self.ensure_remaining(id)?;

        self.state.grid.set_occupant(from, None)?;
        self.relocate(id, to)?;
        self.state.teleport_used.insert(to);
        Ok(id)
    }

    pub fn increase_dynamic_potential(&mut self, cell: CellId) -> Result<()> {
        self.state.grid.cell(cell)?;
        self.state.potentials.dynamic.increase(cell);
        Ok(())
    }

    pub fn decrease_dynamic_potential(&mut self, cell: CellId) -> Result<()> {
        self.state.grid.cell(cell)?;
        self.state.potentials.dynamic.decrease(cell)
    }
}
