//! Per-step invariant checks over run logs.

use crate::exporter::{RunLog, StepRecord};

/// Tolerance for floating-point sign checks.
const EPS: f64 = 1e-12;

/// A broken invariant at a given step.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub step: u64,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {}: {}", self.step, self.message)
    }
}

/// Validates the physical invariants of every step record:
/// fields in `[0, 1]`, `V_struct ≥ 0`, `T ≥ 0`, `T = 0` at step 0 and finite
/// energies.
#[derive(Debug, Clone, Default)]
pub struct InvariantChecker {
    violations: Vec<Violation>,
}

impl InvariantChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks one record, remembering any violations.
    pub fn check(&mut self, record: &StepRecord) -> bool {
        let before = self.violations.len();
        let step = record.step;

        for (name, value) in [
            ("H", record.h),
            ("T", record.t),
            ("V", record.v),
            ("V_struct", record.v_struct),
            ("V_bus", record.v_bus),
            ("L", record.lagrangian),
        ] {
            if !value.is_finite() {
                self.push(step, format!("{} is not finite ({})", name, value));
            }
        }
        if record.v_struct < -EPS {
            self.push(step, format!("V_struct negative ({})", record.v_struct));
        }
        if record.t < -EPS {
            self.push(step, format!("T negative ({})", record.t));
        }
        if step == 0 && record.t != 0.0 {
            self.push(step, format!("T must be 0 at step 0, got {}", record.t));
        }

        for (id, node) in &record.per_node {
            for (field, value) in [
                ("health", node.health),
                ("complexity", node.complexity),
                ("risk", node.risk),
                ("demand", node.demand),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    self.push(step, format!("{}.{} out of [0,1] ({})", id, field, value));
                }
            }
        }

        self.violations.len() == before
    }

    /// Checks every record of a log.
    pub fn check_log(&mut self, log: &RunLog) -> bool {
        log.records.iter().fold(true, |ok, r| self.check(r) && ok)
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// First violation, formatted.
    pub fn first_failure(&self) -> Option<String> {
        self.violations.first().map(Violation::to_string)
    }

    fn push(&mut self, step: u64, message: String) {
        self.violations.push(Violation { step, message });
    }
}
