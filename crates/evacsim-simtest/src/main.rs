//! Evacuation Headless Simulation Harness
//!
//! Validates the cellular automaton against the shipped scenarios and a
//! handful of fixed behavioural checks. Runs entirely in-process, no
//! viewer and no project files.
//!
//! Usage:
//!   cargo run -p evacsim-simtest
//!   cargo run -p evacsim-simtest -- --verbose
//!   cargo run -p evacsim-simtest -- --scenario data/two_exits.json --save outcome.bin

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::Parser;
use evacsim_logic::action::Action;
use evacsim_logic::algorithm::EvacuationCellularAutomaton;
use evacsim_logic::cell::CellId;
use evacsim_logic::config::SimulationConfig;
use evacsim_logic::grid::{Connectivity, GridBuilder};
use evacsim_logic::individual::{DeathCause, Individual, IndividualId, IndividualStatus};
use evacsim_logic::parameters::DefaultParameterSet;
use evacsim_logic::persistence::{load_outcome, save_outcome, RunOutcome};
use evacsim_logic::potential::{PotentialId, PotentialManager, StaticPotential};
use evacsim_logic::rules::{EvacuationRule, ExitAssignments, Rule, RuleContext};
use evacsim_logic::ruleset::RuleSet;
use evacsim_logic::scenario::Scenario;
use evacsim_logic::state::EvacuationState;
use evacsim_logic::stats::{ActionLog, NullSink};
use evacsim_logic::EvacError;
use log::{error, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

// ── Scenarios (same JSON the integration tests use) ─────────────────────
const SCENARIOS: [(&str, &str); 4] = [
    ("corridor", include_str!("../../../data/corridor.json")),
    ("two_exits", include_str!("../../../data/two_exits.json")),
    ("bottleneck_swap", include_str!("../../../data/bottleneck_swap.json")),
    ("teleport_stairs", include_str!("../../../data/teleport_stairs.json")),
];

/// Headless evacuation harness
#[derive(Parser, Debug)]
#[command(name = "evacsim-simtest")]
#[command(about = "Run evacuation scenarios and validate the simulation core")]
struct Args {
    /// Print every check, not only failures
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Run a single scenario file instead of the built-in suite
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Override the scenario's random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the outcome of `--scenario` to this file
    #[arg(long)]
    save: Option<PathBuf>,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Some(path) = &args.scenario {
        if let Err(e) = run_scenario_file(path, &args) {
            error!("{}: {}", path.display(), e);
            std::process::exit(2);
        }
        return;
    }

    println!("=== Evacuation Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Scenario files parse and build
    results.extend(validate_scenario_files(args.verbose));

    // 2. Full runs end in a terminal state
    results.extend(validate_runs(args.verbose));

    // 3. Same seed, same run
    results.extend(validate_determinism(args.verbose));

    // 4. Rule registry and named sets
    results.extend(validate_rule_registry(args.verbose));

    // 5. Exit choice by familiarity
    results.extend(validate_familiarity(args.verbose));

    // 6. Outcome persistence
    results.extend(validate_persistence(args.verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || args.verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn run_scenario_file(path: &Path, args: &Args) -> Result<(), EvacError> {
    let json = std::fs::read_to_string(path)?;
    let mut scenario = Scenario::from_json(&json)?;
    if let Some(seed) = args.seed {
        scenario.config.seed = seed;
    }

    let mut ca = EvacuationCellularAutomaton::new(scenario.build()?)?;
    let mut log = ActionLog::new();
    let outcome = ca.run(&mut log)?;

    println!("=== {} ===", scenario.name);
    println!("  steps:       {}", outcome.steps);
    println!(
        "  needed time: {} steps ({:.1} s)",
        outcome.needed_time,
        outcome.needed_time as f64 / ca.config().steps_per_second
    );
    println!("  evacuated:   {}", outcome.evacuated_count());
    println!(
        "  dead:        {} ({} unreachable, {} out of time)",
        outcome.dead_count(),
        outcome.deaths_by(DeathCause::ExitUnreachable),
        outcome.deaths_by(DeathCause::NotEnoughTime)
    );
    println!(
        "  moves:       {}, swaps: {}, teleports: {}",
        log.count_where(|a| matches!(a, Action::Move { .. })),
        log.count_where(|a| matches!(a, Action::Swap { .. })),
        log.count_where(|a| matches!(a, Action::Teleport { .. }))
    );
    if args.verbose {
        for individual in &outcome.individuals {
            println!(
                "    {}: {:?}{}",
                individual.id,
                individual.status,
                individual
                    .death_cause
                    .map(|c| format!(" ({c})"))
                    .unwrap_or_default()
            );
        }
    }

    if let Some(save) = &args.save {
        save_outcome(BufWriter::new(File::create(save)?), &outcome)?;
        info!("outcome written to {}", save.display());
    }
    Ok(())
}

fn run_json(json: &str, seed: Option<u64>) -> Result<(EvacuationCellularAutomaton, RunOutcome, ActionLog), EvacError> {
    let mut problem = Scenario::from_json(json)?.build()?;
    if let Some(seed) = seed {
        problem.config.seed = seed;
    }
    let mut ca = EvacuationCellularAutomaton::new(problem)?;
    let mut log = ActionLog::new();
    let outcome = ca.run(&mut log)?;
    Ok((ca, outcome, log))
}

// ── 1. Scenario Files ───────────────────────────────────────────────────

fn validate_scenario_files(verbose: bool) -> Vec<TestResult> {
    println!("--- Scenario Files ---");
    let mut results = Vec::new();

    for (name, json) in SCENARIOS {
        let built = Scenario::from_json(json).and_then(|s| s.build());
        match built {
            Ok(problem) => {
                if verbose {
                    println!(
                        "  {}: {} cells, {} individuals, {} exits",
                        name,
                        problem.grid.len(),
                        problem.individuals.len(),
                        problem.potentials.len()
                    );
                }
                let reached = problem
                    .individuals
                    .iter()
                    .filter(|(_, cell)| problem.potentials.iter().any(|p| p.reaches(*cell)))
                    .count();
                results.push(TestResult {
                    name: format!("{}_builds", name),
                    passed: !problem.individuals.is_empty() && !problem.potentials.is_empty(),
                    detail: format!(
                        "{} individuals, {} potentials",
                        problem.individuals.len(),
                        problem.potentials.len()
                    ),
                });
                results.push(TestResult {
                    name: format!("{}_exits_reachable", name),
                    passed: reached == problem.individuals.len(),
                    detail: format!("{}/{} start cells reach an exit", reached, problem.individuals.len()),
                });
            }
            Err(e) => results.push(TestResult {
                name: format!("{}_builds", name),
                passed: false,
                detail: format!("scenario error: {}", e),
            }),
        }
    }

    results
}

// ── 2. Full Runs ────────────────────────────────────────────────────────

fn validate_runs(verbose: bool) -> Vec<TestResult> {
    println!("--- Full Runs ---");
    let mut results = Vec::new();

    for (name, json) in SCENARIOS {
        let (ca, outcome, log) = match run_json(json, None) {
            Ok(run) => run,
            Err(e) => {
                results.push(TestResult {
                    name: format!("{}_runs", name),
                    passed: false,
                    detail: format!("run aborted: {}", e),
                });
                continue;
            }
        };

        if verbose {
            println!(
                "  {}: {} steps, {} evacuated, {} dead, {} actions",
                name,
                outcome.steps,
                outcome.evacuated_count(),
                outcome.dead_count(),
                log.len()
            );
        }

        results.push(TestResult {
            name: format!("{}_terminal", name),
            passed: outcome.remaining_count() == 0,
            detail: format!("{} still remaining", outcome.remaining_count()),
        });

        let violations = ca.state().invariant_violations();
        results.push(TestResult {
            name: format!("{}_invariants", name),
            passed: violations.is_empty(),
            detail: if violations.is_empty() {
                "bookkeeping consistent".into()
            } else {
                violations.join("; ")
            },
        });

        let cause_mismatch = outcome
            .individuals
            .iter()
            .filter(|i| (i.status == IndividualStatus::Dead) != i.death_cause.is_some())
            .count();
        results.push(TestResult {
            name: format!("{}_death_causes", name),
            passed: cause_mismatch == 0,
            detail: format!("{} individuals with inconsistent death cause", cause_mismatch),
        });

        results.push(TestResult {
            name: format!("{}_within_limit", name),
            passed: outcome.steps <= ca.config().max_steps(),
            detail: format!("{} of {} steps", outcome.steps, ca.config().max_steps()),
        });

        let exits = log.count_where(|a| matches!(a, Action::Exit { .. }));
        results.push(TestResult {
            name: format!("{}_exit_records", name),
            passed: exits == outcome.evacuated_count(),
            detail: format!("{} exit records, {} evacuated", exits, outcome.evacuated_count()),
        });
    }

    results
}

// ── 3. Determinism ──────────────────────────────────────────────────────

fn validate_determinism(_verbose: bool) -> Vec<TestResult> {
    println!("--- Determinism ---");
    let mut results = Vec::new();

    for (name, json) in SCENARIOS {
        for seed in [1u64, 17, 4242] {
            let first = run_json(json, Some(seed));
            let second = run_json(json, Some(seed));
            let (passed, detail) = match (first, second) {
                (Ok((_, a, log_a)), Ok((_, b, log_b))) => (
                    a == b && log_a == log_b,
                    format!("{} actions, {} steps", log_a.len(), a.steps),
                ),
                (Err(e), _) | (_, Err(e)) => (false, format!("run aborted: {}", e)),
            };
            results.push(TestResult {
                name: format!("{}_seed_{}_repeatable", name, seed),
                passed,
                detail,
            });
        }
    }

    results
}

// ── 4. Rule Registry ────────────────────────────────────────────────────

fn validate_rule_registry(verbose: bool) -> Vec<TestResult> {
    println!("--- Rule Registry ---");
    let mut results = Vec::new();

    let unresolved: Vec<&str> = Rule::NAMES
        .iter()
        .copied()
        .filter(|name| Rule::from_name(name).map(|r| r.name() != *name).unwrap_or(true))
        .collect();
    results.push(TestResult {
        name: "rule_names_resolve".into(),
        passed: unresolved.is_empty(),
        detail: if unresolved.is_empty() {
            format!("{} rules registered", Rule::NAMES.len())
        } else {
            format!("unresolved: {}", unresolved.join(", "))
        },
    });

    for name in RuleSet::NAMES {
        match RuleSet::by_name(name) {
            Ok(set) => {
                if verbose {
                    let loop_names: Vec<&str> = set.loop_rules().map(|r| r.name()).collect();
                    println!("  {}: {}", name, loop_names.join(" → "));
                }
                let evacuate = set.loop_rules().position(|r| r.name() == "evacuate");
                let movement = set.movement().map(|(pos, _)| pos);
                results.push(TestResult {
                    name: format!("rule_set_{}", name),
                    passed: matches!((evacuate, movement), (Some(e), Some(m)) if e < m),
                    detail: "evacuate runs before movement".into(),
                });
            }
            Err(e) => results.push(TestResult {
                name: format!("rule_set_{}", name),
                passed: false,
                detail: e.to_string(),
            }),
        }
    }

    results.push(TestResult {
        name: "unknown_rule_set_rejected".into(),
        passed: matches!(RuleSet::by_name("stampede"), Err(EvacError::UnknownRuleSet(_))),
        detail: "unknown names fail at setup".into(),
    });

    results
}

// ── 5. Familiarity ──────────────────────────────────────────────────────

/// Three potentials at distance 1, 2, 3 with attractivity 10, 50, 100.
fn familiarity_choice(familiarity: f64) -> Result<Option<PotentialId>, EvacError> {
    let grid = GridBuilder::from_ascii(&["..."], Connectivity::Eight).build()?;
    let start = CellId(0);
    let potentials = [(10, 10.0), (20, 50.0), (30, 100.0)]
        .into_iter()
        .enumerate()
        .map(|(i, (cost, attractivity))| {
            let mut p = StaticPotential::new(PotentialId(i as u32), attractivity);
            p.set_cost(start, cost);
            p
        })
        .collect();

    let config = SimulationConfig::default();
    let params = DefaultParameterSet::new(config.parameters.clone(), config.absolute_max_speed);
    let individual = Individual::new(IndividualId(0)).with_familiarity(familiarity);
    let mut state = EvacuationState::new(
        grid,
        PotentialManager::new(potentials)?,
        vec![(individual, start)],
        &params,
    )?;

    let assignments = ExitAssignments::default();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut sink = NullSink;
    let mut ctx = RuleContext::new(&mut state, &params, &config, &assignments, &mut rng, &mut sink);
    Rule::from_name("initial_potential_familiarity")?.execute(start, &mut ctx)?;
    Ok(state.property_for(IndividualId(0))?.static_potential)
}

fn validate_familiarity(verbose: bool) -> Vec<TestResult> {
    println!("--- Familiarity ---");
    let mut results = Vec::new();

    for (familiarity, expected) in [(1.0, 0u32), (0.5, 1), (0.0, 2)] {
        let chosen = familiarity_choice(familiarity);
        if verbose {
            println!("  familiarity {:.1} → {:?}", familiarity, chosen);
        }
        let (passed, detail) = match chosen {
            Ok(Some(p)) => (
                p == PotentialId(expected),
                format!("chose {}, expected P{}", p, expected),
            ),
            Ok(None) => (false, "no potential assigned".to_string()),
            Err(e) => (false, e.to_string()),
        };
        results.push(TestResult {
            name: format!("familiarity_{:.1}", familiarity),
            passed,
            detail,
        });
    }

    results
}

// ── 6. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(_verbose: bool) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut results = Vec::new();

    let outcome = match run_json(SCENARIOS[0].1, None) {
        Ok((_, outcome, _)) => outcome,
        Err(e) => {
            results.push(TestResult {
                name: "outcome_roundtrip".into(),
                passed: false,
                detail: format!("run aborted: {}", e),
            });
            return results;
        }
    };

    let mut buffer = Vec::new();
    let roundtrip = save_outcome(&mut buffer, &outcome).and_then(|_| load_outcome(&buffer[..]));
    results.push(TestResult {
        name: "outcome_roundtrip".into(),
        passed: roundtrip.as_ref().is_ok_and(|loaded| *loaded == outcome),
        detail: format!("{} bytes", buffer.len()),
    });

    results
}
