//! Run configuration.
//!
//! Every field has a default so a scenario file only needs to name what
//! it changes:
//!
//! ```
//! use evacsim_logic::config::SimulationConfig;
//!
//! let config: SimulationConfig =
//!     serde_json::from_str(r#"{ "seed": 7, "order": "random" }"#).unwrap();
//! assert_eq!(config.seed, 7);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{EvacError, Result};
use crate::order::CellOrder;
use crate::parameters::ParameterConfig;
use crate::ruleset::{RuleSet, RuleSetNames};

/// How movement decisions are committed within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// Each individual moves as soon as it has chosen a target.
    #[default]
    Direct,
    /// Targets are staged first, then resolved with swaps.
    Swap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub steps_per_second: f64,
    /// Edge length of a cell in metres.
    pub cell_size: f64,
    /// Fastest walking speed anyone can reach, m/s.
    pub absolute_max_speed: f64,
    /// Hard time limit of a run.
    pub max_time_seconds: f64,
    /// Per-step probability that a crowd trace spreads to a neighbour.
    pub diffusion: f64,
    /// Per-step probability that a crowd trace fades.
    pub decay: f64,
    pub order: CellOrder,
    pub strategy: SchedulingStrategy,
    /// Registered rule set name, see [`RuleSet::by_name`](crate::ruleset::RuleSet::by_name).
    pub rule_set: String,
    /// Explicit rule lists; replaces `rule_set` when present.
    pub custom_rule_set: Option<RuleSetNames>,
    pub seed: u64,
    /// Reject exit cells that belong to more than one potential.
    pub strict_exit_mapping: bool,
    pub potential_change_interval_seconds: f64,
    pub parameters: ParameterConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps_per_second: 5.25,
            cell_size: 0.4,
            absolute_max_speed: 2.1,
            max_time_seconds: 600.0,
            diffusion: 0.1,
            decay: 0.05,
            order: CellOrder::Insertion,
            strategy: SchedulingStrategy::Direct,
            rule_set: "default".to_string(),
            custom_rule_set: None,
            seed: 42,
            strict_exit_mapping: false,
            potential_change_interval_seconds: 1.0,
            parameters: ParameterConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The configured rule set. Unknown names fail here, before any step.
    pub fn build_rule_set(&self) -> Result<RuleSet> {
        match &self.custom_rule_set {
            Some(names) => RuleSet::from_config(names),
            None => RuleSet::by_name(&self.rule_set),
        }
    }

    /// Hard step limit derived from the time limit.
    pub fn max_steps(&self) -> u64 {
        (self.max_time_seconds * self.steps_per_second).ceil().max(0.0) as u64
    }

    /// Steps between two potential-change evaluations, at least one.
    pub fn potential_change_interval_steps(&self) -> u64 {
        ((self.potential_change_interval_seconds * self.steps_per_second).round() as u64).max(1)
    }

    /// Human-readable problems, empty when the configuration is usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let positives = [
            ("steps_per_second", self.steps_per_second),
            ("cell_size", self.cell_size),
            ("absolute_max_speed", self.absolute_max_speed),
            ("max_time_seconds", self.max_time_seconds),
            (
                "potential_change_interval_seconds",
                self.potential_change_interval_seconds,
            ),
        ];
        for (name, value) in positives {
            if !(value.is_finite() && value > 0.0) {
                problems.push(format!("{name} must be positive, got {value}"));
            }
        }

        for (name, value) in [("diffusion", self.diffusion), ("decay", self.decay)] {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("{name} must be within [0, 1], got {value}"));
            }
        }

        if self.rule_set.trim().is_empty() {
            problems.push("rule_set must not be empty".to_string());
        }

        problems.extend(self.parameters.problems());
        problems
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(EvacError::InvalidConfig(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_steps(), 3150);
        assert_eq!(config.potential_change_interval_steps(), 5);
    }

    #[test]
    fn rejects_bad_values() {
        let config = SimulationConfig {
            steps_per_second: 0.0,
            decay: 1.5,
            ..Default::default()
        };
        let problems = config.problems();
        assert_eq!(problems.len(), 2);
        assert!(matches!(config.validate(), Err(EvacError::InvalidConfig(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            SimulationConfig::from_json(r#"{ "strategy": "swap", "parameters": { "static_weight": 5.0 } }"#)
                .unwrap();
        assert_eq!(config.strategy, SchedulingStrategy::Swap);
        assert_eq!(config.parameters.static_weight, 5.0);
        assert_eq!(config.parameters.dynamic_weight, 0.3);
        assert_eq!(config.cell_size, 0.4);
    }

    #[test]
    fn rule_set_by_name_or_list() {
        assert!(SimulationConfig::default().build_rule_set().is_ok());
        let unknown = SimulationConfig {
            rule_set: "nope".into(),
            ..Default::default()
        };
        assert!(matches!(
            unknown.build_rule_set(),
            Err(EvacError::UnknownRuleSet(_))
        ));
        let custom = SimulationConfig {
            rule_set: "nope".into(),
            custom_rule_set: Some(RuleSetNames {
                primary: vec!["initial_potential_shortest_path".into()],
                loop_rules: vec!["evacuate".into(), "movement_simple".into()],
            }),
            ..Default::default()
        };
        assert_eq!(custom.build_rule_set().unwrap().rules().len(), 3);
    }

    #[test]
    fn interval_never_zero() {
        let config = SimulationConfig {
            potential_change_interval_seconds: 0.01,
            ..Default::default()
        };
        assert_eq!(config.potential_change_interval_steps(), 1);
    }
}
