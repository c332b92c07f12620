use log::trace;

use super::{EvacuationRule, RuleContext};
use crate::action::Action;
use crate::cell::CellId;
use crate::error::Result;

/// Individuals on a safe area or exit cell become safe. A safe area with
/// its own exit potential hands that potential to the individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveRule;

impl EvacuationRule for SaveRule {
    fn name(&self) -> &'static str {
        "save"
    }

    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool {
        let on_safe_ground = ctx
            .state
            .grid()
            .cell(cell)
            .is_ok_and(|c| c.is_safe() || c.is_exit());
        on_safe_ground
            && ctx
                .occupant(cell)
                .and_then(|id| ctx.state.property_for(id).ok())
                .is_some_and(|p| !p.is_safe())
    }

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        let Some(id) = ctx.occupant(cell) else {
            return Ok(None);
        };
        ctx.controller().set_safe(id)?;

        if let Some(exit_potential) = ctx.state.grid().cell(cell)?.exit_potential() {
            ctx.state.potentials().static_potential(exit_potential)?;
            ctx.state.property_mut(id)?.static_potential = Some(exit_potential);
        }
        trace!("individual {id} is safe at {cell}");
        Ok(Some(Action::Save {
            individual: id,
            cell,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellKind;
    use crate::grid::{Connectivity, GridBuilder};
    use crate::individual::{Individual, IndividualId};
    use crate::potential::PotentialId;
    use crate::rules::testing::Fixture;
    use crate::rules::Rule;

    #[test]
    fn safe_area_assigns_exit_potential() {
        let mut builder = GridBuilder::from_ascii(&["E..S."], Connectivity::Eight);
        let save = builder.cell_at(3, 0, 0).unwrap();
        builder
            .set_kind(
                save,
                CellKind::Save {
                    exit_potential: Some(PotentialId(0)),
                },
            )
            .unwrap();
        let grid = builder.build().unwrap();
        let mut f = Fixture::with_grid(grid, &[(3, 0), (4, 0)], |i| Individual::new(IndividualId(i)));
        let rule = Rule::from_name("save").unwrap();

        assert_eq!(
            f.run(&rule, 3, 0),
            Some(Action::Save {
                individual: IndividualId(0),
                cell: save,
            })
        );
        let p = f.state.property_for(IndividualId(0)).unwrap();
        assert!(p.is_safe());
        assert_eq!(p.static_potential, Some(PotentialId(0)));
        assert_eq!(f.state.not_safe_count(), 1);

        // Already safe, and a plain room cell never saves.
        assert_eq!(f.run(&rule, 3, 0), None);
        assert_eq!(f.run(&rule, 4, 0), None);
    }

    #[test]
    fn exit_cell_saves() {
        let mut f = Fixture::new(&["E.."], &[(0, 0)]);
        let rule = Rule::from_name("save").unwrap();
        assert!(f.run(&rule, 0, 0).is_some());
        assert_eq!(f.state.not_safe_count(), 0);
    }
}
