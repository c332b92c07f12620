//! Per-step processing order of the remaining individuals.

use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::individual::IndividualId;
use crate::state::EvacuationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOrder {
    /// Order in which individuals were added to the run.
    #[default]
    Insertion,
    /// Closest to an exit first.
    FrontToBack,
    /// Farthest from an exit first.
    BackToFront,
    /// Fresh uniform shuffle every step.
    Random,
}

/// Remaining individuals in the order they are processed this step.
pub fn ordered_individuals(
    state: &EvacuationState,
    order: CellOrder,
    rng: &mut dyn RngCore,
) -> Vec<IndividualId> {
    let mut ids = state.remaining().to_vec();
    match order {
        CellOrder::Insertion => {}
        CellOrder::FrontToBack => {
            ids.sort_by(|a, b| exit_distance(state, *a).total_cmp(&exit_distance(state, *b)));
        }
        CellOrder::BackToFront => {
            ids.sort_by(|a, b| exit_distance(state, *b).total_cmp(&exit_distance(state, *a)));
        }
        CellOrder::Random => ids.shuffle(rng),
    }
    ids
}

/// Distance to the assigned exit, or to the nearest one when nothing is
/// assigned yet. Unknown distances sort last.
fn exit_distance(state: &EvacuationState, id: IndividualId) -> f64 {
    let Ok(property) = state.property_for(id) else {
        return f64::INFINITY;
    };
    let Some(cell) = property.cell else {
        return f64::INFINITY;
    };
    let assigned = property
        .static_potential
        .and_then(|pid| state.potentials().static_potential(pid).ok());
    assigned
        .or_else(|| state.potentials().merged())
        .and_then(|p| p.distance_or_cost(cell))
        .unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Connectivity, GridBuilder};
    use crate::individual::Individual;
    use crate::parameters::{DefaultParameterSet, ParameterConfig};
    use crate::potential::{PotentialId, PotentialManager, StaticPotential};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state() -> EvacuationState {
        let grid = GridBuilder::from_ascii(&["E...."], Connectivity::Eight)
            .build()
            .unwrap();
        let exit = grid.cell_at(0, 0, 0).unwrap();
        let potential =
            StaticPotential::from_exits(&grid, PotentialId(0), &[exit], 1.0, 0.4).unwrap();
        // Insertion order: middle, far, near.
        let placements = [2, 4, 1]
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                (
                    Individual::new(IndividualId(i as u32)),
                    grid.cell_at(x, 0, 0).unwrap(),
                )
            })
            .collect();
        let params = DefaultParameterSet::new(ParameterConfig::default(), 2.0);
        EvacuationState::new(
            grid,
            PotentialManager::new(vec![potential]).unwrap(),
            placements,
            &params,
        )
        .unwrap()
    }

    #[test]
    fn distance_orders() {
        let state = state();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let ids = |order| -> Vec<u32> {
            ordered_individuals(&state, order, &mut ChaCha8Rng::seed_from_u64(1))
                .into_iter()
                .map(|id| id.0)
                .collect()
        };
        assert_eq!(ids(CellOrder::Insertion), vec![0, 1, 2]);
        assert_eq!(ids(CellOrder::FrontToBack), vec![2, 0, 1]);
        assert_eq!(ids(CellOrder::BackToFront), vec![1, 0, 2]);

        let mut shuffled = ordered_individuals(&state, CellOrder::Random, &mut rng);
        shuffled.sort();
        assert_eq!(shuffled, vec![IndividualId(0), IndividualId(1), IndividualId(2)]);
    }

    #[test]
    fn random_order_is_seeded() {
        let state = state();
        let a = ordered_individuals(&state, CellOrder::Random, &mut ChaCha8Rng::seed_from_u64(9));
        let b = ordered_individuals(&state, CellOrder::Random, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
