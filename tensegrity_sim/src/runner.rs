//! Scenario runner - executes scenarios and checks their invariants.

use crate::error::{SimError, SimResult};
use crate::exporter::{RunLog, RunSummary};
use crate::governance::{HubReplacement, RuleSpec};
use crate::invariants::InvariantChecker;
use crate::scenarios::Scenario;
use crate::simulation::Simulation;

use rayon::prelude::*;
use tracing::{info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether every step passed the invariant checks
    pub passed: bool,

    /// First violated invariant, if any
    pub failure_reason: Option<String>,

    pub summary: RunSummary,

    pub log: RunLog,
}

/// Governed vs. ungoverned outcome of one scenario and seed.
#[derive(Debug, Clone)]
pub struct GovernanceComparison {
    pub governed: ScenarioResult,
    pub ungoverned: ScenarioResult,
}

impl GovernanceComparison {
    /// Reduction of peak H achieved by governance (positive is better).
    pub fn max_h_reduction(&self) -> f64 {
        self.ungoverned.summary.max_h - self.governed.summary.max_h
    }

    /// Incidents avoided by governance (negative when governance made it worse).
    pub fn incidents_avoided(&self) -> i64 {
        self.ungoverned.summary.total_incidents as i64
            - self.governed.summary.total_incidents as i64
    }
}

/// Rule set used when comparing a scenario that ships without governance.
pub fn default_comparison_rules() -> Vec<RuleSpec> {
    vec![RuleSpec::HubProtection { threshold: 0.0, replacement: HubReplacement::Refactor }]
}

/// Runs scenarios with a fixed seed.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Step count override
    n_steps: Option<u64>,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self { seed, n_steps: None }
    }

    /// Overrides the scenario's step count.
    pub fn with_steps(mut self, n_steps: u64) -> Self {
        self.n_steps = Some(n_steps);
        self
    }

    fn prepare(&self, scenario: &Scenario) -> Scenario {
        let prepared = scenario.clone().with_seed(self.seed);
        match self.n_steps {
            Some(n) => prepared.with_steps(n),
            None => prepared,
        }
    }

    /// Runs a scenario to completion and validates every step.
    pub fn run(&self, scenario: &Scenario) -> SimResult<ScenarioResult> {
        let scenario = self.prepare(scenario);
        let mut sim = Simulation::from_scenario(&scenario)?;
        sim.run()?;
        let log = sim.into_log();

        let mut checker = InvariantChecker::new();
        let passed = checker.check_log(&log);
        if !passed {
            warn!(
                "Scenario '{}' seed {} violated {} invariant(s)",
                scenario.name,
                self.seed,
                checker.violations().len()
            );
        }

        Ok(ScenarioResult {
            scenario: scenario.name.clone(),
            seed: self.seed,
            passed,
            failure_reason: checker.first_failure(),
            summary: log.summary.clone(),
            log,
        })
    }

    /// Runs one scenario for many seeds on `workers` threads.
    ///
    /// Runs share nothing; results come back in seed order regardless of
    /// which worker finished first.
    pub fn run_batch(
        &self,
        scenario: &Scenario,
        seeds: &[u64],
        workers: usize,
    ) -> SimResult<Vec<ScenarioResult>> {
        let workers = workers.max(1);
        info!("Batch '{}': {} seeds on {} worker(s)", scenario.name, seeds.len(), workers);

        let run_seed = |seed: &u64| {
            let runner = Self { seed: *seed, n_steps: self.n_steps };
            runner.run(scenario)
        };

        if workers == 1 {
            return seeds.iter().map(run_seed).collect();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SimError::scenario(format!("cannot start worker pool: {}", e)))?;
        pool.install(|| seeds.par_iter().map(run_seed).collect())
    }

    /// Runs the scenario with and without its governance rules.
    ///
    /// A scenario without rules is compared against
    /// [`default_comparison_rules`].
    pub fn compare_governance(&self, scenario: &Scenario) -> SimResult<GovernanceComparison> {
        let governed = if scenario.governance.is_empty() {
            scenario.clone().with_governance(default_comparison_rules())
        } else {
            scenario.clone()
        };
        let ungoverned = scenario.clone().without_governance();

        let comparison = GovernanceComparison {
            governed: self.run(&governed)?,
            ungoverned: self.run(&ungoverned)?,
        };
        info!(
            "Governance on '{}' (seed {}): max H {:.4} -> {:.4}, incidents {} -> {}",
            scenario.name,
            self.seed,
            comparison.ungoverned.summary.max_h,
            comparison.governed.summary.max_h,
            comparison.ungoverned.summary.total_incidents,
            comparison.governed.summary.total_incidents
        );
        Ok(comparison)
    }
}
