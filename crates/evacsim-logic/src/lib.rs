//! Rule-based cellular automaton for pedestrian evacuation.
//!
//! This crate contains the whole simulation core: the cell grid, static
//! and dynamic potentials, the per-cell rules and the step scheduler.
//! Everything is plain data plus an injected random source, so a run is
//! reproducible from its seed and every piece is unit-testable. There is
//! no rendering and no file handling beyond JSON scenarios and the
//! binary outcome format.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`action`] | Tagged records of what a rule did, for statistics |
//! | [`algorithm`] | Scheduler: initialisation, steps, swap pass, termination |
//! | [`cell`] | Cells and their capabilities (exit, safe area, stairs, teleport) |
//! | [`config`] | Run configuration with defaults and validation |
//! | [`controller`] | The only mutator of cross-collection state invariants |
//! | [`diffusion`] | Spreading and decay of the dynamic potential |
//! | [`direction`] | Eight compass directions and the sway delay |
//! | [`error`] | Fatal error enum and `Result` alias |
//! | [`grid`] | Cell graph, neighbourhoods, occupancy, ASCII plans |
//! | [`individual`] | Fixed attributes and mutable per-run properties |
//! | [`order`] | Per-step processing order of individuals |
//! | [`parameters`] | Human-behaviour model: effective potential, panic, speed |
//! | [`persistence`] | Binary run outcomes with a format version |
//! | [`potential`] | Static exit potentials, merging, the dynamic potential |
//! | [`rules`] | Reaction, exit choice, movement, save, evacuate, teleport |
//! | [`ruleset`] | Primary and loop rule lists, named sets |
//! | [`scenario`] | JSON scenario files |
//! | [`state`] | Canonical snapshot of a run in progress |
//! | [`stats`] | Statistics sinks |

pub mod action;
pub mod algorithm;
pub mod cell;
pub mod config;
pub mod controller;
pub mod diffusion;
pub mod direction;
pub mod error;
pub mod grid;
pub mod individual;
pub mod order;
pub mod parameters;
pub mod persistence;
pub mod potential;
pub mod rules;
pub mod ruleset;
pub mod scenario;
pub mod state;
pub mod stats;

pub use algorithm::{EvacuationCellularAutomaton, EvacuationProblem};
pub use error::{EvacError, Result};
