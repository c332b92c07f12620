//! Spreading and fading of the dynamic potential between steps.

use rand::{Rng, RngCore};

use crate::controller::EvacuationStateController;
use crate::error::Result;

/// One diffusion/decay pass over a snapshot of the mapped cells.
///
/// Per cell: draw diffusion and, if drawn, lower the cell; draw decay
/// and, if drawn while the cell is still positive, lower it again; the
/// diffused unit then lands on a random neighbour unless the decay just
/// emptied the cell.
pub fn diffuse_and_decay(
    controller: &mut EvacuationStateController<'_>,
    diffusion: f64,
    decay: f64,
    rng: &mut dyn RngCore,
) -> Result<()> {
    let cells = controller.state().potentials().dynamic().snapshot();

    for cell in cells {
        let diffused = rng.gen::<f64>() < diffusion;
        if diffused && controller.state().potentials().dynamic().get(cell) > 0 {
            controller.decrease_dynamic_potential(cell)?;
        }

        let decayed = rng.gen::<f64>() < decay;
        if decayed && controller.state().potentials().dynamic().get(cell) > 0 {
            controller.decrease_dynamic_potential(cell)?;
        }

        let emptied_by_decay = decayed && controller.state().potentials().dynamic().get(cell) == 0;
        if diffused && !emptied_by_decay {
            let neighbours = controller.state().grid().neighbours(cell);
            if !neighbours.is_empty() {
                let target = neighbours[rng.gen_range(0..neighbours.len())].cell;
                controller.increase_dynamic_potential(target)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellId;
    use crate::grid::{Connectivity, GridBuilder};
    use crate::parameters::{DefaultParameterSet, ParameterConfig};
    use crate::potential::PotentialManager;
    use crate::state::EvacuationState;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state() -> EvacuationState {
        let grid = GridBuilder::from_ascii(&["..."], Connectivity::Four)
            .build()
            .unwrap();
        let params = DefaultParameterSet::new(ParameterConfig::default(), 2.0);
        EvacuationState::new(grid, PotentialManager::new(vec![]).unwrap(), vec![], &params)
            .unwrap()
    }

    #[test]
    fn full_diffusion_moves_the_unit() {
        let mut state = state();
        let mut ctl = EvacuationStateController::new(&mut state);
        ctl.increase_dynamic_potential(CellId(0)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        diffuse_and_decay(&mut ctl, 1.0, 0.0, &mut rng).unwrap();
        // Cell 0 has a single neighbour.
        assert_eq!(state.potentials().dynamic().get(CellId(0)), 0);
        assert_eq!(state.potentials().dynamic().get(CellId(1)), 1);
        assert_eq!(state.potentials().dynamic().total(), 1);
    }

    #[test]
    fn full_decay_clears_everything() {
        let mut state = state();
        let mut ctl = EvacuationStateController::new(&mut state);
        ctl.increase_dynamic_potential(CellId(0)).unwrap();
        ctl.increase_dynamic_potential(CellId(2)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        diffuse_and_decay(&mut ctl, 0.0, 1.0, &mut rng).unwrap();
        assert!(state.potentials().dynamic().is_empty());
    }

    #[test]
    fn decay_emptying_the_source_suppresses_spread() {
        let mut state = state();
        let mut ctl = EvacuationStateController::new(&mut state);
        for _ in 0..2 {
            ctl.increase_dynamic_potential(CellId(0)).unwrap();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        diffuse_and_decay(&mut ctl, 1.0, 1.0, &mut rng).unwrap();
        assert!(state.potentials().dynamic().is_empty());
    }

    #[test]
    fn nothing_drawn_changes_nothing() {
        let mut state = state();
        let mut ctl = EvacuationStateController::new(&mut state);
        ctl.increase_dynamic_potential(CellId(1)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        diffuse_and_decay(&mut ctl, 0.0, 0.0, &mut rng).unwrap();
        assert_eq!(state.potentials().dynamic().get(CellId(1)), 1);
        assert_eq!(state.potentials().dynamic().len(), 1);
    }
}
