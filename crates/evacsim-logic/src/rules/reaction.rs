//! Alarm reaction rules.

use log::trace;

use super::{EvacuationRule, RuleContext};
use crate::action::Action;
use crate::cell::CellId;
use crate::error::Result;
use crate::individual::IndividualId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionScope {
    /// Only the individual itself becomes alarmed.
    OnePerson,
    /// The first occupant to react alarms everyone in its room.
    AllPersonsInRoom,
    /// An individual reacts early as soon as anyone in its room is alarmed.
    CompleteRoom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionRule {
    scope: ReactionScope,
}

impl ReactionRule {
    pub fn new(scope: ReactionScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> ReactionScope {
        self.scope
    }
}

fn reaction_due(ctx: &RuleContext<'_>, id: IndividualId) -> Result<bool> {
    let individual = ctx.state.individual(id)?;
    let threshold = individual.reaction_time * ctx.steps_per_second();
    Ok(threshold <= ctx.current_time())
}

/// Remaining occupants of the room `cell` belongs to, alarmed or not.
fn room_occupants(ctx: &RuleContext<'_>, cell: CellId) -> Result<Vec<IndividualId>> {
    let c = ctx.state.grid().cell(cell)?;
    Ok(ctx
        .state
        .grid()
        .cells_in_room(c.floor, c.room)
        .iter()
        .filter_map(|&member| ctx.occupant(member))
        .collect())
}

impl EvacuationRule for ReactionRule {
    fn name(&self) -> &'static str {
        match self.scope {
            ReactionScope::OnePerson => "reaction_one_person",
            ReactionScope::AllPersonsInRoom => "reaction_all_in_room",
            ReactionScope::CompleteRoom => "reaction_complete_room",
        }
    }

    fn executable_on(&self, cell: CellId, ctx: &RuleContext<'_>) -> bool {
        ctx.occupant(cell)
            .and_then(|id| ctx.state.property_for(id).ok())
            .is_some_and(|p| !p.alarmed)
    }

    fn on_execute(&self, cell: CellId, ctx: &mut RuleContext<'_>) -> Result<Option<Action>> {
        let Some(id) = ctx.occupant(cell) else {
            return Ok(None);
        };

        match self.scope {
            ReactionScope::OnePerson => {
                if !reaction_due(ctx, id)? {
                    return Ok(None);
                }
                ctx.controller().alarm(id)?;
                trace!("individual {id} reacted");
                Ok(Some(Action::Alarm { individual: id }))
            }
            ReactionScope::AllPersonsInRoom => {
                if !reaction_due(ctx, id)? {
                    return Ok(None);
                }
                let room = ctx.state.grid().cell(cell)?.room;
                let mut alarmed = Vec::new();
                for other in room_occupants(ctx, cell)? {
                    if ctx.controller().alarm(other)? {
                        alarmed.push(other);
                    }
                }
                trace!("individual {id} alarmed room {room} ({} people)", alarmed.len());
                Ok(Some(Action::AlarmRoom {
                    room,
                    individuals: alarmed,
                }))
            }
            ReactionScope::CompleteRoom => {
                let room_alarmed = room_occupants(ctx, cell)?
                    .into_iter()
                    .any(|other| other != id && ctx.state.properties[other.index()].alarmed);
                if !room_alarmed && !reaction_due(ctx, id)? {
                    return Ok(None);
                }
                ctx.controller().alarm(id)?;
                Ok(Some(Action::Alarm { individual: id }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Connectivity, GridBuilder};
    use crate::individual::Individual;
    use crate::rules::testing::Fixture;
    use crate::rules::Rule;

    fn room_fixture() -> Fixture {
        // Room a on the left, room b on the right, joined by a door.
        let grid = GridBuilder::from_ascii(&["aaDbbE"], Connectivity::Eight)
            .build()
            .unwrap();
        Fixture::with_grid(grid, &[(0, 0), (1, 0), (3, 0)], |i| {
            // Individual 0 reacts at once, the others after 10 s.
            let reaction = if i == 0 { 0.0 } else { 10.0 };
            Individual::new(IndividualId(i)).with_reaction_time(reaction)
        })
    }

    fn alarmed(f: &Fixture, id: u32) -> bool {
        f.state.property_for(IndividualId(id)).unwrap().alarmed
    }

    #[test]
    fn one_person_waits_for_reaction_time() {
        let mut f = room_fixture();
        let rule = Rule::from_name("reaction_one_person").unwrap();
        assert_eq!(
            f.run(&rule, 0, 0),
            Some(Action::Alarm {
                individual: IndividualId(0)
            })
        );
        assert_eq!(f.run(&rule, 1, 0), None);
        assert!(!alarmed(&f, 1));
        // Already alarmed: rule no longer applies.
        assert_eq!(f.run(&rule, 0, 0), None);
    }

    #[test]
    fn reaction_time_scales_with_steps_per_second() {
        let mut f = room_fixture();
        let rule = Rule::from_name("reaction_one_person").unwrap();
        // 10 s at 5.25 steps/s is step 52.5.
        f.state.time_step = 52;
        assert_eq!(f.run(&rule, 1, 0), None);
        f.state.time_step = 53;
        assert!(f.run(&rule, 1, 0).is_some());
    }

    #[test]
    fn all_in_room_alarms_room_mates_only() {
        let mut f = room_fixture();
        let rule = Rule::from_name("reaction_all_in_room").unwrap();
        let action = f.run(&rule, 0, 0).unwrap();
        assert_eq!(
            action,
            Action::AlarmRoom {
                room: 1,
                individuals: vec![IndividualId(0), IndividualId(1)],
            }
        );
        assert!(alarmed(&f, 1));
        assert!(!alarmed(&f, 2));
    }

    #[test]
    fn all_in_room_lists_only_newly_alarmed() {
        let mut f = room_fixture();
        f.state.property_mut(IndividualId(1)).unwrap().alarmed = true;
        let rule = Rule::from_name("reaction_all_in_room").unwrap();
        assert_eq!(
            f.run(&rule, 0, 0),
            Some(Action::AlarmRoom {
                room: 1,
                individuals: vec![IndividualId(0)],
            })
        );
    }

    #[test]
    fn complete_room_follows_alarmed_neighbour() {
        let mut f = room_fixture();
        let rule = Rule::from_name("reaction_complete_room").unwrap();
        assert_eq!(f.run(&rule, 1, 0), None);
        f.run(&rule, 0, 0).unwrap();
        assert!(f.run(&rule, 1, 0).is_some());
        assert!(alarmed(&f, 1));
        // Room b has nobody alarmed.
        assert_eq!(f.run(&rule, 3, 0), None);
    }
}
