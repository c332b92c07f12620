//! JSON scenario files.
//!
//! A scenario is a single-floor ASCII plan plus the population, the exit
//! groups and a [`SimulationConfig`]:
//!
//! ```
//! use evacsim_logic::scenario::Scenario;
//!
//! let scenario = Scenario::from_json(r#"{
//!     "name": "corridor",
//!     "layout": ["....E"],
//!     "individuals": [{ "x": 0, "y": 0 }]
//! }"#).unwrap();
//! let problem = scenario.build().unwrap();
//! assert_eq!(problem.individuals.len(), 1);
//! assert_eq!(problem.potentials.len(), 1);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::algorithm::EvacuationProblem;
use crate::cell::{CellId, CellKind, Stairs};
use crate::config::SimulationConfig;
use crate::direction::Direction8;
use crate::error::{EvacError, Result};
use crate::grid::{Connectivity, GridBuilder};
use crate::individual::{Individual, IndividualId};
use crate::potential::{PotentialId, StaticPotential};

/// Lattice coordinates `[x, y]` on the plan.
pub type Position = [i32; 2];

fn default_attractivity() -> f64 {
    1.0
}

/// Exit cells that share one static potential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub cells: Vec<Position>,
    #[serde(default = "default_attractivity")]
    pub attractivity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualSpec {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub familiarity: Option<f64>,
    /// Seconds.
    #[serde(default)]
    pub reaction_time: Option<f64>,
    #[serde(default)]
    pub relative_speed: Option<f64>,
    /// Index into `exits` of the exit this individual was told to use.
    #[serde(default)]
    pub exit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleportSpec {
    pub from: Position,
    pub to: Vec<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StairSpec {
    pub cell: Position,
    pub up: Direction8,
    pub up_factor: f64,
    pub down_factor: f64,
}

/// A cell that slows (or speeds up) everyone entering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedSpec {
    pub cell: Position,
    pub factor: f64,
}

/// A safe-area cell that hands out the potential of an exit group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveSpec {
    pub cell: Position,
    pub exit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub layout: Vec<String>,
    #[serde(default)]
    pub connectivity: Connectivity,
    /// Exit groups. Empty means one group per `E` cell.
    #[serde(default)]
    pub exits: Vec<ExitSpec>,
    pub individuals: Vec<IndividualSpec>,
    #[serde(default)]
    pub teleports: Vec<TeleportSpec>,
    #[serde(default)]
    pub stairs: Vec<StairSpec>,
    #[serde(default)]
    pub saves: Vec<SaveSpec>,
    #[serde(default)]
    pub speed_factors: Vec<SpeedSpec>,
    #[serde(default)]
    pub config: SimulationConfig,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Turn the description into a runnable problem.
    pub fn build(&self) -> Result<EvacuationProblem> {
        self.config.validate()?;

        let rows: Vec<&str> = self.layout.iter().map(String::as_str).collect();
        let mut builder = GridBuilder::from_ascii(&rows, self.connectivity);
        let locate = |builder: &GridBuilder, [x, y]: Position| -> Result<CellId> {
            builder.cell_at(x, y, 0).ok_or_else(|| {
                EvacError::InvalidConfig(format!("{}: no cell at ({x}, {y})", self.name))
            })
        };

        let exit_groups: Vec<(String, Vec<CellId>, f64)> = if self.exits.is_empty() {
            let mut groups = Vec::new();
            for (y, row) in rows.iter().enumerate() {
                for (x, ch) in row.chars().enumerate() {
                    if ch == 'E' {
                        let cell = locate(&builder, [x as i32, y as i32])?;
                        groups.push((format!("exit ({x}, {y})"), vec![cell], 1.0));
                    }
                }
            }
            groups
        } else {
            let mut groups = Vec::with_capacity(self.exits.len());
            for (index, spec) in self.exits.iter().enumerate() {
                if spec.cells.is_empty() {
                    return Err(EvacError::InvalidConfig(format!(
                        "{}: exit group {index} has no cells",
                        self.name
                    )));
                }
                let cells = spec
                    .cells
                    .iter()
                    .map(|&p| locate(&builder, p))
                    .collect::<Result<Vec<_>>>()?;
                let name = spec.name.clone().unwrap_or_else(|| format!("exit {index}"));
                groups.push((name, cells, spec.attractivity));
            }
            groups
        };

        for (_, cells, attractivity) in &exit_groups {
            for &cell in cells {
                builder.set_kind(
                    cell,
                    CellKind::Exit {
                        attractivity: *attractivity,
                    },
                )?;
            }
        }

        for teleport in &self.teleports {
            let from = locate(&builder, teleport.from)?;
            let targets = teleport
                .to
                .iter()
                .map(|&p| locate(&builder, p))
                .collect::<Result<Vec<_>>>()?;
            builder.set_kind(from, CellKind::Teleport { targets })?;
        }

        for stairs in &self.stairs {
            let cell = locate(&builder, stairs.cell)?;
            builder.set_kind(
                cell,
                CellKind::Stairs(Stairs {
                    up: stairs.up,
                    up_factor: stairs.up_factor,
                    down_factor: stairs.down_factor,
                }),
            )?;
        }

        for speed in &self.speed_factors {
            let cell = locate(&builder, speed.cell)?;
            if !(speed.factor.is_finite() && speed.factor > 0.0) {
                return Err(EvacError::InvalidConfig(format!(
                    "{}: speed factor {} at ({}, {}) must be positive",
                    self.name, speed.factor, speed.cell[0], speed.cell[1]
                )));
            }
            builder.set_speed_factor(cell, speed.factor)?;
        }

        for save in &self.saves {
            let cell = locate(&builder, save.cell)?;
            if save.exit >= exit_groups.len() {
                return Err(EvacError::InvalidConfig(format!(
                    "{}: safe area refers to unknown exit {}",
                    self.name, save.exit
                )));
            }
            builder.set_kind(
                cell,
                CellKind::Save {
                    exit_potential: Some(PotentialId(save.exit as u32)),
                },
            )?;
        }

        let mut placements = Vec::with_capacity(self.individuals.len());
        let mut individual_exits = HashMap::new();
        for (index, spec) in self.individuals.iter().enumerate() {
            let id = IndividualId(index as u32);
            let cell = locate(&builder, [spec.x, spec.y])?;
            let individual = spec.to_individual(id, &self.name)?;
            if let Some(exit) = spec.exit {
                let (_, cells, _) = exit_groups.get(exit).ok_or_else(|| {
                    EvacError::InvalidConfig(format!(
                        "{}: individual {index} refers to unknown exit {exit}",
                        self.name
                    ))
                })?;
                individual_exits.insert(id, cells[0]);
            }
            placements.push((individual, cell));
        }

        let grid = builder.build()?;
        let potentials = exit_groups
            .into_iter()
            .enumerate()
            .map(|(index, (name, cells, attractivity))| {
                StaticPotential::from_exits(
                    &grid,
                    PotentialId(index as u32),
                    &cells,
                    attractivity,
                    self.config.cell_size,
                )
                .map(|p| p.with_name(name))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(EvacuationProblem {
            grid,
            potentials,
            individuals: placements,
            individual_exits,
            config: self.config.clone(),
        })
    }
}

impl IndividualSpec {
    fn to_individual(&self, id: IndividualId, scenario: &str) -> Result<Individual> {
        let mut individual = Individual::new(id);
        if let Some(age) = self.age {
            individual = individual.with_age(age);
        }
        if let Some(familiarity) = self.familiarity {
            if !(0.0..=1.0).contains(&familiarity) {
                return Err(EvacError::InvalidConfig(format!(
                    "{scenario}: familiarity of individual {id} must be within [0, 1]"
                )));
            }
            individual = individual.with_familiarity(familiarity);
        }
        if let Some(reaction_time) = self.reaction_time {
            if reaction_time.is_nan() || reaction_time < 0.0 {
                return Err(EvacError::InvalidConfig(format!(
                    "{scenario}: reaction time of individual {id} must not be negative"
                )));
            }
            individual = individual.with_reaction_time(reaction_time);
        }
        if let Some(relative_speed) = self.relative_speed {
            if !(relative_speed.is_finite() && relative_speed > 0.0) {
                return Err(EvacError::InvalidSpeed {
                    individual: id,
                    speed: relative_speed,
                });
            }
            individual = individual.with_relative_speed(relative_speed);
        }
        Ok(individual)
    }
}
