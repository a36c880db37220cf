//! Tensegrity simulator CLI
//!
//! Run graph-energy scenarios, batches of seeds and governance comparisons.

use clap::Parser;
use tensegrity_sim::{
    RunExport, RunSummary, Scenario, ScenarioId, ScenarioResult, ScenarioRunner, SimResult,
    Simulation,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Deterministic simulator for graph-energy software dynamics
#[derive(Parser, Debug)]
#[command(name = "tensegrity-sim")]
#[command(
    about = "Simulate how a software system's energy evolves under its developers",
    long_about = None
)]
struct Args {
    /// Master seed for determinism
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (baseline, hub_stress, demand_surge, governed_baseline, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Load the scenario from a JSON file instead of the catalogue
    #[arg(long)]
    scenario_file: Option<String>,

    /// Override the scenario's step count
    #[arg(short = 'n', long)]
    steps: Option<u64>,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: u64,

    /// Worker threads for multi-seed batches
    #[arg(short, long, default_value = "1")]
    workers: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the full step log of a single scenario run to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Run each scenario with and without governance and compare
    #[arg(long)]
    compare_governance: bool,
}

fn load_scenarios(args: &Args) -> SimResult<Vec<Scenario>> {
    if let Some(path) = &args.scenario_file {
        return Ok(vec![Scenario::from_file(path)?]);
    }
    if args.scenario == "all" {
        return Ok(ScenarioId::all().iter().map(ScenarioId::build).collect());
    }
    Ok(vec![args.scenario.parse::<ScenarioId>()?.build()])
}

/// One-line rendering of the hubs and high-risk nodes at the end of a run.
fn hotspots(summary: &RunSummary) -> String {
    let hubs: Vec<String> = summary
        .top_hubs
        .iter()
        .map(|(node, e)| format!("{}={:.4}", node, e))
        .collect();
    let risky: Vec<String> = summary.high_risk_nodes.iter().map(ToString::to_string).collect();
    format!(
        "hubs [{}], high risk [{}]",
        hubs.join(", "),
        if risky.is_empty() { "none".to_string() } else { risky.join(", ") }
    )
}

fn runner_for(args: &Args, seed: u64) -> ScenarioRunner {
    let runner = ScenarioRunner::new(seed);
    match args.steps {
        Some(n) => runner.with_steps(n),
        None => runner,
    }
}

fn export(args: &Args, scenario: &Scenario, path: &str) -> SimResult<bool> {
    let mut scenario = scenario.clone().with_seed(args.seed);
    if let Some(n) = args.steps {
        scenario = scenario.with_steps(n);
    }
    let mut sim = Simulation::from_scenario(&scenario)?;
    sim.run()?;
    let export = RunExport::new(&scenario.name, scenario.seed, scenario.n_steps, sim.into_log());
    export.write_to_file(path)?;
    info!("Exported {} steps to {}", export.log.len(), path);
    info!("  {}", hotspots(&export.log.summary));

    let mut checker = tensegrity_sim::InvariantChecker::new();
    let passed = checker.check_log(&export.log);
    if let Some(reason) = checker.first_failure() {
        error!("✗ {} FAILED: {}", scenario.name, reason);
    }
    Ok(passed)
}

fn compare(args: &Args, scenarios: &[Scenario]) -> SimResult<bool> {
    let mut all_passed = true;
    let mut rows = Vec::new();
    for scenario in scenarios {
        let comparison = runner_for(args, args.seed).compare_governance(scenario)?;
        all_passed &= comparison.governed.passed && comparison.ungoverned.passed;
        if args.json {
            rows.push(serde_json::json!({
                "scenario": scenario.name,
                "seed": args.seed,
                "governed": comparison.governed.summary,
                "ungoverned": comparison.ungoverned.summary,
            }));
        } else {
            info!(
                "{}: max H {:.4} -> {:.4} ({:+.4}), incidents {} -> {}",
                scenario.name,
                comparison.ungoverned.summary.max_h,
                comparison.governed.summary.max_h,
                -comparison.max_h_reduction(),
                comparison.ungoverned.summary.total_incidents,
                comparison.governed.summary.total_incidents
            );
        }
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Ok(all_passed)
}

fn run_all(args: &Args, scenarios: &[Scenario]) -> SimResult<bool> {
    let seeds: Vec<u64> = (0..args.seeds.max(1)).map(|i| args.seed.wrapping_add(i)).collect();
    let runner = runner_for(args, args.seed);

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for scenario in scenarios {
        for result in runner.run_batch(scenario, &seeds, args.workers)? {
            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED  max H={:.4} final H={:.4} incidents={}",
                        result.scenario,
                        result.seed,
                        result.summary.max_h,
                        result.summary.final_h,
                        result.summary.total_incidents
                    );
                    info!("  {}", hotspots(&result.summary));
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        result.scenario,
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario,
                    "seed": r.seed,
                    "passed": r.passed,
                    "failure_reason": r.failure_reason,
                    "summary": r.summary,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if failed.is_empty() {
        info!("✅ All {} scenario runs passed!", total);
    } else {
        error!("❌ {}/{} scenario runs failed!", failed.len(), total);
    }
    Ok(failed.is_empty())
}

fn run(args: &Args) -> SimResult<bool> {
    let scenarios = load_scenarios(args)?;

    if let Some(path) = &args.export {
        if scenarios.len() != 1 {
            return Err(tensegrity_sim::SimError::scenario(
                "--export only supports a single scenario, not 'all'",
            ));
        }
        return export(args, &scenarios[0], path);
    }
    if args.compare_governance {
        return compare(args, &scenarios);
    }
    run_all(args, &scenarios)
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Tensegrity Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
