//! Stochastic incident sampling.
//!
//! Each step every node fails with probability `risk·demand` (unit time
//! step). Incidents are observational: they do not mutate fields. The history
//! is kept so governance can budget against recent failures.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tensegrity_core::{clamp_unit, FieldStore, GraphModel, NodeId};
use tracing::debug;

/// Per-step failure probability of a node.
pub fn incident_probability(risk: f64, demand: f64) -> f64 {
    clamp_unit(risk * demand)
}

/// A sampled production incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub step: u64,
    pub node: NodeId,

    /// Risk of the node when it failed
    pub severity: f64,

    /// Demand of the node when it failed
    pub impact: f64,
}

/// Incident sampler with its own RNG stream.
#[derive(Debug)]
pub struct IncidentModel {
    rng: ChaCha8Rng,
    enabled: bool,
    history: Vec<Incident>,
}

impl IncidentModel {
    pub fn new(rng: ChaCha8Rng, enabled: bool) -> Self {
        Self { rng, enabled, history: Vec::new() }
    }

    /// Samples incidents for `step`.
    ///
    /// One uniform draw is consumed per node even when sampling is disabled
    /// or the probability is zero, so the stream stays aligned across runs
    /// that differ only in governance.
    pub fn sample(&mut self, step: u64, graph: &GraphModel, fields: &FieldStore) -> Vec<Incident> {
        let mut sampled = Vec::new();
        for idx in 0..fields.len() {
            let draw: f64 = self.rng.gen();
            if !self.enabled {
                continue;
            }
            let node = fields.node(idx);
            if draw < incident_probability(node.risk, node.demand) {
                sampled.push(Incident {
                    step,
                    node: graph.node_id(idx).clone(),
                    severity: node.risk,
                    impact: node.demand,
                });
            }
        }
        if !sampled.is_empty() {
            debug!("step {}: {} incident(s)", step, sampled.len());
        }
        self.history.extend(sampled.iter().cloned());
        sampled
    }

    pub fn history(&self) -> &[Incident] {
        &self.history
    }

    pub fn total(&self) -> usize {
        self.history.len()
    }

    /// Number of incidents recorded at or after `step`.
    pub fn count_since(&self, step: u64) -> usize {
        self.history.iter().rev().take_while(|i| i.step >= step).count()
    }
}
