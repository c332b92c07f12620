//! Human-behaviour model consumed by the rules.
//!
//! Rules never hard-code how attractive a cell is or how fast someone
//! walks; they ask a [`ParameterSet`]. [`DefaultParameterSet`] is the
//! stock model, tuned through [`ParameterConfig`].

use serde::{Deserialize, Serialize};

use crate::cell::CellId;
use crate::individual::{Individual, IndividualProperty};
use crate::potential::{DynamicPotential, StaticPotential, ORTHOGONAL_COST};

/// Weights and rates of the default behaviour model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterConfig {
    /// Pull towards lower static potential.
    pub static_weight: f64,
    /// Pull towards cells other people walked through recently.
    pub dynamic_weight: f64,
    /// How much panic dampens the static pull (0 = not at all).
    pub panic_weight: f64,
    /// Base chance per step of standing still for no reason.
    pub idle_probability: f64,
    /// Base chance per evaluation of wanting a different exit.
    pub change_potential_probability: f64,
    /// Occupied-neighbour share above which panic grows.
    pub panic_crowding_threshold: f64,
    pub panic_increase: f64,
    pub panic_decrease: f64,
    pub exhaustion_increase: f64,
    pub exhaustion_recovery: f64,
    /// Fraction of speed lost at full exhaustion.
    pub exhaustion_weight: f64,
    /// Fraction of speed gained at full panic.
    pub panic_speed_weight: f64,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            static_weight: 3.0,
            dynamic_weight: 0.3,
            panic_weight: 0.5,
            idle_probability: 0.05,
            change_potential_probability: 0.2,
            panic_crowding_threshold: 0.5,
            panic_increase: 0.05,
            panic_decrease: 0.02,
            exhaustion_increase: 0.002,
            exhaustion_recovery: 0.004,
            exhaustion_weight: 0.5,
            panic_speed_weight: 0.3,
        }
    }
}

impl ParameterConfig {
    /// Human-readable problems, empty when the configuration is usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let probabilities = [
            ("idle_probability", self.idle_probability),
            ("change_potential_probability", self.change_potential_probability),
            ("panic_crowding_threshold", self.panic_crowding_threshold),
            ("panic_weight", self.panic_weight),
            ("exhaustion_weight", self.exhaustion_weight),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        let rates = [
            ("panic_increase", self.panic_increase),
            ("panic_decrease", self.panic_decrease),
            ("exhaustion_increase", self.exhaustion_increase),
            ("exhaustion_recovery", self.exhaustion_recovery),
            ("panic_speed_weight", self.panic_speed_weight),
        ];
        for (name, value) in rates {
            if value.is_nan() || value < 0.0 {
                problems.push(format!("{name} must not be negative, got {value}"));
            }
        }
        if !self.static_weight.is_finite() || !self.dynamic_weight.is_finite() {
            problems.push("potential weights must be finite".to_string());
        }
        problems
    }
}

/// Strategy functions of the human-behaviour model.
pub trait ParameterSet {
    /// Log-weight of stepping from `origin` onto `target`.
    ///
    /// `None` when `target` is not reachable under `potential`, in which
    /// case it is never a movement candidate.
    fn effective_potential(
        &self,
        property: &IndividualProperty,
        potential: &StaticPotential,
        origin: CellId,
        target: CellId,
        dynamic: &DynamicPotential,
    ) -> Option<f64>;

    /// Probability of standing idle this step.
    fn idle_threshold(&self, property: &IndividualProperty) -> f64;

    /// Probability of wanting to change the assigned exit.
    fn change_potential_threshold(&self, property: &IndividualProperty) -> f64;

    /// New panic level given the share of occupied neighbour cells.
    fn update_panic(&self, property: &IndividualProperty, occupied_share: f64) -> f64;

    /// New exhaustion level after a step in which the individual did or
    /// did not move.
    fn update_exhaustion(&self, property: &IndividualProperty, moved: bool) -> f64;

    /// Current walking speed in m/s.
    fn update_preferred_speed(&self, individual: &Individual, property: &IndividualProperty)
        -> f64;

    /// Walking speed at the start of the run.
    fn initial_speed(&self, individual: &Individual) -> f64;
}

#[derive(Debug, Clone)]
pub struct DefaultParameterSet {
    config: ParameterConfig,
    absolute_max_speed: f64,
}

impl DefaultParameterSet {
    pub fn new(config: ParameterConfig, absolute_max_speed: f64) -> Self {
        Self {
            config,
            absolute_max_speed,
        }
    }

    pub fn config(&self) -> &ParameterConfig {
        &self.config
    }
}

impl ParameterSet for DefaultParameterSet {
    fn effective_potential(
        &self,
        property: &IndividualProperty,
        potential: &StaticPotential,
        origin: CellId,
        target: CellId,
        dynamic: &DynamicPotential,
    ) -> Option<f64> {
        let target_cost = potential.cost(target)?;
        let origin_cost = potential.cost(origin).unwrap_or(target_cost);
        let gain = (origin_cost as f64 - target_cost as f64) / ORTHOGONAL_COST as f64;
        let panic = property.panic;
        let static_part = (1.0 - panic * self.config.panic_weight) * self.config.static_weight * gain;
        let dynamic_part = self.config.dynamic_weight * (1.0 + panic) * dynamic.get(target) as f64;
        Some(static_part + dynamic_part)
    }

    fn idle_threshold(&self, property: &IndividualProperty) -> f64 {
        self.config.idle_probability * (1.0 - property.panic)
    }

    fn change_potential_threshold(&self, property: &IndividualProperty) -> f64 {
        (self.config.change_potential_probability * (0.5 + property.panic)).clamp(0.0, 1.0)
    }

    fn update_panic(&self, property: &IndividualProperty, occupied_share: f64) -> f64 {
        let panic = if occupied_share > self.config.panic_crowding_threshold {
            property.panic + self.config.panic_increase
        } else {
            property.panic - self.config.panic_decrease
        };
        panic.clamp(0.0, 1.0)
    }

    fn update_exhaustion(&self, property: &IndividualProperty, moved: bool) -> f64 {
        let exhaustion = if moved {
            property.exhaustion + self.config.exhaustion_increase
        } else {
            property.exhaustion - self.config.exhaustion_recovery
        };
        exhaustion.clamp(0.0, 1.0)
    }

    fn update_preferred_speed(
        &self,
        individual: &Individual,
        property: &IndividualProperty,
    ) -> f64 {
        let base = individual.relative_speed * self.absolute_max_speed;
        let speed = base
            * (1.0 - self.config.exhaustion_weight * property.exhaustion)
            * (1.0 + self.config.panic_speed_weight * property.panic);
        speed.min(self.absolute_max_speed)
    }

    fn initial_speed(&self, individual: &Individual) -> f64 {
        (individual.relative_speed * self.absolute_max_speed).min(self.absolute_max_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::individual::IndividualId;
    use crate::potential::PotentialId;

    fn params() -> DefaultParameterSet {
        DefaultParameterSet::new(ParameterConfig::default(), 2.0)
    }

    fn property() -> IndividualProperty {
        IndividualProperty::new(CellId(0), 1.0)
    }

    #[test]
    fn effective_potential_prefers_lower_cost() {
        let mut p = StaticPotential::new(PotentialId(0), 1.0);
        p.set_cost(CellId(0), 20);
        p.set_cost(CellId(1), 10);
        p.set_cost(CellId(2), 30);
        let dynamic = DynamicPotential::new();
        let prop = property();
        let params = params();
        let forward = params
            .effective_potential(&prop, &p, CellId(0), CellId(1), &dynamic)
            .unwrap();
        let stay = params
            .effective_potential(&prop, &p, CellId(0), CellId(0), &dynamic)
            .unwrap();
        let back = params
            .effective_potential(&prop, &p, CellId(0), CellId(2), &dynamic)
            .unwrap();
        assert!(forward > stay && stay > back);
        assert_eq!(stay, 0.0);
        assert!(params
            .effective_potential(&prop, &p, CellId(0), CellId(9), &dynamic)
            .is_none());
    }

    #[test]
    fn dynamic_potential_attracts() {
        let mut p = StaticPotential::new(PotentialId(0), 1.0);
        p.set_cost(CellId(0), 10);
        p.set_cost(CellId(1), 10);
        let mut dynamic = DynamicPotential::new();
        dynamic.increase(CellId(1));
        let prop = property();
        let value = params()
            .effective_potential(&prop, &p, CellId(0), CellId(1), &dynamic)
            .unwrap();
        assert!((value - 0.3).abs() < 1e-12);
    }

    #[test]
    fn panic_saturates() {
        let params = params();
        let mut prop = property();
        prop.panic = 0.98;
        assert_eq!(params.update_panic(&prop, 1.0), 1.0);
        prop.panic = 0.01;
        assert_eq!(params.update_panic(&prop, 0.0), 0.0);
    }

    #[test]
    fn speed_is_capped() {
        let params = params();
        let individual = Individual::new(IndividualId(0)).with_relative_speed(1.0);
        let mut prop = property();
        prop.panic = 1.0;
        assert_eq!(params.update_preferred_speed(&individual, &prop), 2.0);
        prop.panic = 0.0;
        prop.exhaustion = 1.0;
        assert!((params.update_preferred_speed(&individual, &prop) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ParameterConfig::default().problems().is_empty());
        let bad = ParameterConfig {
            idle_probability: 1.5,
            ..Default::default()
        };
        assert_eq!(bad.problems().len(), 1);
    }
}
