use log::trace;

use super::{EvacuationRule, RuleContext};
use crate::action::Action;
use crate::cell::CellId;
use crate::error::Result;

/// Queues individuals standing on an exit for removal at the end of the
/// step, once their move onto the exit has completed
/// (`step_end_time <= current_time`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvacuateRule;

impl EvacuationRule for EvacuateRule {
    fn name(&self) -> &'static str {
        "evacuate"
    }

    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool {
        if !ctx.state.grid().cell(cell).is_ok_and(|c| c.is_exit()) {
            return false;
        }
        let time = ctx.current_time();
        ctx.occupant(cell)
            .and_then(|id| ctx.state.property_for(id).ok())
            .is_some_and(|p| !p.is_marked_for_removal() && p.step_end_time <= time)
    }

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        let Some(id) = ctx.occupant(cell) else {
            return Ok(None);
        };
        ctx.controller().mark_for_removal(id)?;
        trace!("individual {id} leaves through {cell}");
        Ok(Some(Action::Exit {
            individual: id,
            cell,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::individual::IndividualId;
    use crate::rules::testing::Fixture;
    use crate::rules::Rule;

    fn on_exit(step_end_offset: f64) -> (Fixture, Option<Action>) {
        let mut f = Fixture::new(&["..E"], &[(2, 0)]);
        f.state.time_step = 10;
        f.state.property_mut(IndividualId(0)).unwrap().step_end_time = 10.0 + step_end_offset;
        let rule = Rule::from_name("evacuate").unwrap();
        let action = f.run(&rule, 2, 0);
        (f, action)
    }

    #[test]
    fn completed_arrival_is_queued() {
        let (f, action) = on_exit(0.0);
        assert!(matches!(action, Some(Action::Exit { .. })));
        assert_eq!(f.state.pending_removal(), &[IndividualId(0)]);
        // Still on the grid until the step ends.
        assert_eq!(f.state.remaining(), &[IndividualId(0)]);
    }

    #[test]
    fn arrival_in_progress_waits() {
        let (f, action) = on_exit(0.5);
        assert_eq!(action, None);
        assert!(f.state.pending_removal().is_empty());
    }

    #[test]
    fn marked_once() {
        let (mut f, _) = on_exit(-2.0);
        let rule = Rule::from_name("evacuate").unwrap();
        assert_eq!(f.run(&rule, 2, 0), None);
        assert_eq!(f.state.pending_removal().len(), 1);
    }
}
