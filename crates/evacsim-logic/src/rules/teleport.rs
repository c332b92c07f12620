use log::{trace, warn};

use super::{EvacuationRule, RuleContext};
use crate::action::Action;
use crate::cell::CellId;
use crate::error::Result;

/// Instant relocation from a teleport cell to the first of its targets
/// that is free and has not received anyone this step.
///
/// A failed teleport sets the individual's `teleport_failed` flag; the
/// loop continues with the next rule so the individual can still walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeleportRule;

impl EvacuationRule for TeleportRule {
    fn name(&self) -> &'static str {
        "teleport"
    }

    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool {
        let has_targets = ctx
            .state
            .grid()
            .cell(cell)
            .ok()
            .and_then(|c| c.teleport_targets())
            .is_some_and(|t| !t.is_empty());
        if !has_targets {
            return false;
        }
        let time = ctx.current_time();
        ctx.occupant(cell)
            .and_then(|id| ctx.state.property_for(id).ok())
            .is_some_and(|p| p.alarmed && !p.is_marked_for_removal() && !p.is_busy_at(time))
    }

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        let Some(id) = ctx.occupant(cell) else {
            return Ok(None);
        };
        let target = ctx
            .state
            .grid()
            .cell(cell)?
            .teleport_targets()
            .unwrap_or(&[])
            .iter()
            .copied()
            .find(|&t| ctx.state.grid().is_free(t) && !ctx.state.teleport_used(t));

        match target {
            Some(to) => {
                ctx.controller().teleport(cell, to)?;
                ctx.state.property_mut(id)?.teleport_failed = false;
                trace!("individual {id} teleported {cell} -> {to}");
                Ok(Some(Action::Teleport {
                    individual: id,
                    from: cell,
                    to,
                }))
            }
            None => {
                ctx.state.property_mut(id)?.teleport_failed = true;
                warn!("teleport of individual {id} at {cell} failed: all targets taken");
                Ok(Some(Action::TeleportFailed {
                    individual: id,
                    cell,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellKind;
    use crate::grid::{CellGrid, Connectivity, GridBuilder};
    use crate::individual::{Individual, IndividualId};
    use crate::rules::testing::Fixture;
    use crate::rules::Rule;

    /// Two teleport cells on the left, both sending to the single target
    /// at the far right.
    fn grid() -> CellGrid {
        let mut builder = GridBuilder::from_ascii(&["T...E", "T...."], Connectivity::Eight);
        let target = builder.cell_at(3, 0, 0).unwrap();
        for y in 0..2 {
            let t = builder.cell_at(0, y, 0).unwrap();
            builder
                .set_kind(
                    t,
                    CellKind::Teleport {
                        targets: vec![target],
                    },
                )
                .unwrap();
        }
        builder.build().unwrap()
    }

    fn fixture() -> Fixture {
        let mut f = Fixture::with_grid(grid(), &[(0, 0), (0, 1)], |i| {
            Individual::new(IndividualId(i))
        });
        for id in 0..2 {
            f.state.property_mut(IndividualId(id)).unwrap().alarmed = true;
        }
        f
    }

    #[test]
    fn second_teleport_to_same_target_fails() {
        let mut f = fixture();
        let rule = Rule::from_name("teleport").unwrap();
        let target = f.cell(3, 0);

        let first = f.run(&rule, 0, 0).unwrap();
        assert!(matches!(first, Action::Teleport { to, .. } if to == target));
        assert!(f.state.potentials().dynamic().is_empty());

        let second = f.run(&rule, 0, 1).unwrap();
        assert!(matches!(second, Action::TeleportFailed { .. }));
        let p = f.state.property_for(IndividualId(1)).unwrap();
        assert!(p.teleport_failed);
        assert_eq!(p.cell, Some(f.cell(0, 1)));
    }

    #[test]
    fn used_target_frees_up_next_step() {
        let mut f = fixture();
        let rule = Rule::from_name("teleport").unwrap();
        f.run(&rule, 0, 0).unwrap();
        // Clear the target cell, then forget this step's teleports.
        let target = f.cell(3, 0);
        let beside = f.cell(2, 0);
        f.ctx().controller().move_individual(target, beside).unwrap();
        assert!(matches!(
            f.run(&rule, 0, 1),
            Some(Action::TeleportFailed { .. })
        ));
        f.state.advance_time();
        assert!(matches!(f.run(&rule, 0, 1), Some(Action::Teleport { .. })));
    }

    #[test]
    fn not_alarmed_stays_put() {
        let mut f = fixture();
        f.state.property_mut(IndividualId(0)).unwrap().alarmed = false;
        let rule = Rule::from_name("teleport").unwrap();
        assert_eq!(f.run(&rule, 0, 0), None);
    }
}
