//! Ordered rule collections.
//!
//! A [`RuleSet`] owns every rule of a run once and lists which of them
//! run during initialisation (primary) and which run every step (loop),
//! each in registration order.
//!
//! | Set | Primary | Loop |
//! |-----|---------|------|
//! | `default` | familiarity | one-person reaction, save, evacuate, teleport, probabilistic change, waiting movement |
//! | `shortest_path` | shortest path | one-person reaction, save, evacuate, simple movement |
//! | `swap` | shortest path | one-person reaction, save, evacuate, swap movement |
//! | `attractivity` | attractivity | room reaction, save, evacuate, teleport, blocked change, most-probable movement |
//! | `exit_mapping` | exit mapping | complete-room reaction, save, evacuate, teleport, simple movement |

use serde::{Deserialize, Serialize};

use crate::error::{EvacError, Result};
use crate::rules::{MovementRule, Rule};

/// Rule names for a custom set, as written in a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSetNames {
    pub primary: Vec<String>,
    pub loop_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
    primary: Vec<usize>,
    loop_rules: Vec<usize>,
}

impl RuleSet {
    pub const NAMES: [&'static str; 5] = [
        "default",
        "shortest_path",
        "swap",
        "attractivity",
        "exit_mapping",
    ];

    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    pub fn by_name(name: &str) -> Result<Self> {
        let (primary, loop_rules): (Vec<&str>, Vec<&str>) = match name {
            "default" => (
                vec!["initial_potential_familiarity"],
                vec![
                    "reaction_one_person",
                    "save",
                    "evacuate",
                    "teleport",
                    "potential_change_probabilistic",
                    "movement_waiting",
                ],
            ),
            "shortest_path" => (
                vec!["initial_potential_shortest_path"],
                vec!["reaction_one_person", "save", "evacuate", "movement_simple"],
            ),
            "swap" => (
                vec!["initial_potential_shortest_path"],
                vec!["reaction_one_person", "save", "evacuate", "movement_swap"],
            ),
            "attractivity" => (
                vec!["initial_potential_attractivity"],
                vec![
                    "reaction_all_in_room",
                    "save",
                    "evacuate",
                    "teleport",
                    "potential_change_blocked",
                    "movement_most_probable",
                ],
            ),
            "exit_mapping" => (
                vec!["initial_potential_exit_mapping"],
                vec![
                    "reaction_complete_room",
                    "save",
                    "evacuate",
                    "teleport",
                    "movement_simple",
                ],
            ),
            other => return Err(EvacError::UnknownRuleSet(other.to_string())),
        };
        Self::from_names(&primary, &loop_rules)
    }

    /// Build a set from rule names. A name listed in both parts is
    /// registered once.
    pub fn from_names<S: AsRef<str>>(primary: &[S], loop_rules: &[S]) -> Result<Self> {
        let mut builder = Self::builder();
        for name in primary {
            builder = builder.primary(Rule::from_name(name.as_ref())?);
        }
        for name in loop_rules {
            builder = builder.looping(Rule::from_name(name.as_ref())?);
        }
        Ok(builder.build())
    }

    pub fn from_config(names: &RuleSetNames) -> Result<Self> {
        Self::from_names(&names.primary, &names.loop_rules)
    }

    /// Every registered rule, once each.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn primary(&self) -> impl Iterator<Item = &Rule> {
        self.primary.iter().map(|&i| &self.rules[i])
    }

    pub fn loop_rules(&self) -> impl Iterator<Item = &Rule> {
        self.loop_rules.iter().map(|&i| &self.rules[i])
    }

    /// Position and rule of the first movement rule in the loop part.
    pub fn movement(&self) -> Option<(usize, &MovementRule)> {
        self.loop_rules()
            .enumerate()
            .find_map(|(pos, rule)| rule.as_movement().map(|m| (pos, m)))
    }
}

#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    rules: Vec<Rule>,
    primary: Vec<usize>,
    loop_rules: Vec<usize>,
}

impl RuleSetBuilder {
    fn register(&mut self, rule: Rule) -> usize {
        match self.rules.iter().position(|r| *r == rule) {
            Some(index) => index,
            None => {
                self.rules.push(rule);
                self.rules.len() - 1
            }
        }
    }

    pub fn primary(mut self, rule: Rule) -> Self {
        let index = self.register(rule);
        self.primary.push(index);
        self
    }

    pub fn looping(mut self, rule: Rule) -> Self {
        let index = self.register(rule);
        self.loop_rules.push(index);
        self
    }

    /// Register a rule that belongs to neither part.
    pub fn register_only(mut self, rule: Rule) -> Self {
        self.register(rule);
        self
    }

    pub fn build(self) -> RuleSet {
        RuleSet {
            rules: self.rules,
            primary: self.primary,
            loop_rules: self.loop_rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::EvacuationRule;

    fn names<'a>(rules: impl Iterator<Item = &'a Rule>) -> Vec<&'static str> {
        rules.map(|r| r.name()).collect()
    }

    #[test]
    fn every_named_set_builds() {
        for name in RuleSet::NAMES {
            let set = RuleSet::by_name(name).unwrap();
            assert_eq!(set.primary().count(), 1, "{name}");
            assert!(set.movement().is_some(), "{name}");
        }
    }

    #[test]
    fn evacuate_runs_before_movement() {
        for name in RuleSet::NAMES {
            let set = RuleSet::by_name(name).unwrap();
            let order = names(set.loop_rules());
            let evacuate = order.iter().position(|n| *n == "evacuate").unwrap();
            let (movement, _) = set.movement().unwrap();
            assert!(evacuate < movement, "{name}");
        }
    }

    #[test]
    fn unknown_set_is_error() {
        assert!(matches!(
            RuleSet::by_name("fastest"),
            Err(EvacError::UnknownRuleSet(_))
        ));
    }

    #[test]
    fn shared_rule_registered_once() {
        let set = RuleSet::from_names(&["save", "reaction_one_person"], &["reaction_one_person", "save"])
            .unwrap();
        assert_eq!(set.rules().len(), 2);
        assert_eq!(names(set.primary()), vec!["save", "reaction_one_person"]);
        assert_eq!(names(set.loop_rules()), vec!["reaction_one_person", "save"]);
    }

    #[test]
    fn unknown_rule_name_fails_at_setup() {
        let names = RuleSetNames {
            primary: vec!["initial_potential_shortest_path".into()],
            loop_rules: vec!["movement_sideways".into()],
        };
        assert!(matches!(
            RuleSet::from_config(&names),
            Err(EvacError::UnknownRule(_))
        ));
    }

    #[test]
    fn register_only_is_in_neither_part() {
        let set = RuleSet::builder()
            .register_only(Rule::from_name("teleport").unwrap())
            .build();
        assert_eq!(set.rules().len(), 1);
        assert_eq!(set.primary().count(), 0);
        assert_eq!(set.loop_rules().count(), 0);
    }
}
