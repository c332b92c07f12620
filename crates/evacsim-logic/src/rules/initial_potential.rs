//! Initial exit assignment.
//!
//! Runs once per individual during initialisation. Every strategy only
//! considers static potentials that reach the individual's cell; with
//! none reachable the individual dies with
//! [`DeathCause::ExitUnreachable`].

use log::{trace, warn};

use super::{EvacuationRule, RuleContext};
use crate::action::Action;
use crate::cell::CellId;
use crate::error::Result;
use crate::individual::DeathCause;
use crate::potential::{PotentialId, StaticPotential};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialStrategy {
    /// Lowest cost at the start cell.
    ShortestPath,
    /// Highest attractivity; ties go to the nearer exit.
    Attractivity,
    /// The less familiar, the wider the window of exits considered.
    Familiarity,
    /// The exit the individual was assigned, else the nearest one.
    ExitMapping,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitialPotentialRule {
    strategy: InitialStrategy,
}

impl InitialPotentialRule {
    pub fn new(strategy: InitialStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> InitialStrategy {
        self.strategy
    }
}

/// Reachable potentials sorted by cost at `cell`, ties by id.
fn by_cost<'p>(potentials: Vec<&'p StaticPotential>, cell: CellId) -> Vec<&'p StaticPotential> {
    let mut sorted = potentials;
    sorted.sort_by_key(|p| (p.cost(cell).unwrap_or(u32::MAX), p.id));
    sorted
}

/// Number of nearest exits an individual with this familiarity weighs up.
pub fn familiarity_window(familiarity: f64, count: usize) -> usize {
    let n = ((1.0 - familiarity) * count as f64).round();
    (n.max(1.0) as usize).min(count.max(1))
}

/// Pick from the cost-sorted list: the most attractive of the first
/// `window` entries, the earlier entry on equal attractivity.
pub fn choose_in_window(sorted: &[&StaticPotential], window: usize) -> Option<PotentialId> {
    let mut best: Option<&StaticPotential> = None;
    for candidate in sorted.iter().take(window) {
        if best.map_or(true, |b| candidate.attractivity() > b.attractivity()) {
            best = Some(candidate);
        }
    }
    best.map(|p| p.id)
}

impl EvacuationRule for InitialPotentialRule {
    fn name(&self) -> &'static str {
        match self.strategy {
            InitialStrategy::ShortestPath => "initial_potential_shortest_path",
            InitialStrategy::Attractivity => "initial_potential_attractivity",
            InitialStrategy::Familiarity => "initial_potential_familiarity",
            InitialStrategy::ExitMapping => "initial_potential_exit_mapping",
        }
    }

    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool {
        ctx.occupant(cell)
            .and_then(|id| ctx.state.property_for(id).ok())
            .is_some_and(|p| p.static_potential.is_none())
    }

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        let Some(id) = ctx.occupant(cell) else {
            return Ok(None);
        };

        let sorted = by_cost(ctx.state.potentials().reachable_from(cell), cell);
        if sorted.is_empty() {
            warn!("individual {id} at {cell} cannot reach any exit");
            ctx.controller().die(id, DeathCause::ExitUnreachable)?;
            return Ok(Some(Action::Die {
                individual: id,
                cell: Some(cell),
                cause: DeathCause::ExitUnreachable,
            }));
        }

        let shortest = sorted[0].id;
        let chosen = match self.strategy {
            InitialStrategy::ShortestPath => shortest,
            InitialStrategy::Attractivity => {
                choose_in_window(&sorted, sorted.len()).unwrap_or(shortest)
            }
            InitialStrategy::Familiarity => {
                let familiarity = ctx.state.individual(id)?.familiarity;
                let window = familiarity_window(familiarity, sorted.len());
                choose_in_window(&sorted, window).unwrap_or(shortest)
            }
            InitialStrategy::ExitMapping => ctx
                .assignments
                .individual_exits
                .get(&id)
                .and_then(|exit| ctx.assignments.exit_mapping.get(exit))
                .copied()
                .filter(|pid| sorted.iter().any(|p| p.id == *pid))
                .unwrap_or(shortest),
        };

        ctx.state.property_mut(id)?.static_potential = Some(chosen);
        trace!("individual {id} assigned {chosen} by {}", self.name());
        Ok(Some(Action::PotentialAssigned {
            individual: id,
            potential: chosen,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::individual::IndividualId;
    use crate::rules::testing::Fixture;
    use crate::rules::Rule;

    fn potential(id: u32, cost: u32, attractivity: f64) -> StaticPotential {
        let mut p = StaticPotential::new(PotentialId(id), attractivity);
        p.set_cost(CellId(0), cost);
        p
    }

    #[test]
    fn window_is_clamped() {
        assert_eq!(familiarity_window(1.0, 3), 1);
        assert_eq!(familiarity_window(0.0, 3), 3);
        assert_eq!(familiarity_window(0.5, 3), 2);
        assert_eq!(familiarity_window(0.9, 3), 1);
        assert_eq!(familiarity_window(0.5, 1), 1);
    }

    #[test]
    fn window_choice_by_attractivity() {
        let near = potential(0, 1, 10.0);
        let mid = potential(1, 2, 50.0);
        let far = potential(2, 3, 100.0);
        let sorted = by_cost(vec![&far, &near, &mid], CellId(0));
        assert_eq!(choose_in_window(&sorted, 1), Some(PotentialId(0)));
        assert_eq!(choose_in_window(&sorted, 2), Some(PotentialId(1)));
        assert_eq!(choose_in_window(&sorted, 3), Some(PotentialId(2)));
    }

    #[test]
    fn equal_attractivity_keeps_the_nearer() {
        let near = potential(4, 1, 10.0);
        let far = potential(1, 9, 10.0);
        let sorted = by_cost(vec![&far, &near], CellId(0));
        assert_eq!(choose_in_window(&sorted, 2), Some(PotentialId(4)));
    }

    #[test]
    fn shortest_path_picks_nearer_exit() {
        // Exit 0 on the left is 3 cells away, exit 1 on the right 1 cell.
        let mut f = Fixture::new(&["E...E"], &[(3, 0)]);
        let rule = Rule::from_name("initial_potential_shortest_path").unwrap();
        let action = f.run(&rule, 3, 0).unwrap();
        assert_eq!(
            action,
            Action::PotentialAssigned {
                individual: IndividualId(0),
                potential: PotentialId(1),
            }
        );
    }

    #[test]
    fn unreachable_exit_kills() {
        let mut f = Fixture::new(&["E.#.."], &[(4, 0)]);
        let rule = Rule::from_name("initial_potential_familiarity").unwrap();
        let action = f.run(&rule, 4, 0).unwrap();
        assert!(matches!(
            action,
            Action::Die {
                cause: DeathCause::ExitUnreachable,
                ..
            }
        ));
        let property = f.state.property_for(IndividualId(0)).unwrap();
        assert_eq!(property.death_cause(), Some(DeathCause::ExitUnreachable));
        assert!(f.state.remaining().is_empty());
    }

    #[test]
    fn exit_mapping_uses_assignment() {
        let mut f = Fixture::new(&["E...E"], &[(3, 0)]);
        let left = f.cell(0, 0);
        f.assignments.individual_exits.insert(IndividualId(0), left);
        let rule = Rule::from_name("initial_potential_exit_mapping").unwrap();
        f.run(&rule, 3, 0).unwrap();
        assert_eq!(
            f.state.property_for(IndividualId(0)).unwrap().static_potential,
            Some(PotentialId(0))
        );
    }

    #[test]
    fn exit_mapping_without_assignment_is_shortest_path() {
        let mut f = Fixture::new(&["E...E"], &[(1, 0)]);
        let rule = Rule::from_name("initial_potential_exit_mapping").unwrap();
        f.run(&rule, 1, 0).unwrap();
        assert_eq!(
            f.state.property_for(IndividualId(0)).unwrap().static_potential,
            Some(PotentialId(0))
        );
    }
}
