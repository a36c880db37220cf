//! Energy bookkeeping for the graph-field model.
//!
//! Implements the Hamiltonian `H = T + V` where:
//! - `V_struct = ½·badᵗ·L·bad` (Dirichlet energy of badness over the graph)
//! - `V_bus = Σ demand·(λ1(1 - health) + λ2·complexity)`
//! - `T = ½·Σ m_i (bad_i - bad_prev_i)²`
//!
//! All functions are pure: they read a graph, a field store and the previous
//! badness snapshot, and never mutate them.

use crate::error::{CoreError, CoreResult};
use crate::fields::FieldStore;
use crate::graph::{GraphModel, NodeId};
use crate::params::MassModel;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Structural potential `½ Σ_edges w_ij (bad_i - bad_j)²`.
///
/// Identical to `½·badᵗ·L·bad`, evaluated edge-wise so the result is exactly
/// zero for an edgeless graph or uniform badness and never negative.
pub fn compute_structural_potential(graph: &GraphModel, bad: &[f64]) -> f64 {
    let mut v = 0.0;
    for i in 0..graph.node_count() {
        for (j, w) in graph.neighbor_weights(i) {
            if j > i {
                let diff = bad[i] - bad[j];
                v += w * diff * diff;
            }
        }
    }
    0.5 * v
}

/// Quadratic-form evaluation `½·badᵗ·L·bad` straight from the Laplacian.
pub fn laplacian_quadratic_form(laplacian: &DMatrix<f64>, bad: &DVector<f64>) -> f64 {
    0.5 * bad.dot(&(laplacian * bad))
}

/// Business potential `Σ demand[i]·(λ1(1 - health[i]) + λ2·complexity[i])`.
pub fn compute_business_potential(fields: &FieldStore) -> f64 {
    let params = fields.params();
    (0..fields.len())
        .map(|i| {
            let n = fields.node(i);
            n.demand
                * (params.lambda_health * (1.0 - n.health)
                    + params.lambda_complexity * n.complexity)
        })
        .sum()
}

/// Node masses for the kinetic term.
pub fn node_masses(fields: &FieldStore) -> Vec<f64> {
    match fields.params().mass {
        MassModel::Demand => (0..fields.len()).map(|i| fields.node(i).demand).collect(),
        MassModel::Uniform => vec![1.0; fields.len()],
    }
}

/// Kinetic energy `½·Σ m_i (bad_i - bad_prev_i)²`.
///
/// Without a previous snapshot (first step) the result is `0`. Nodes that
/// did not exist in the snapshot contribute nothing.
pub fn compute_kinetic_energy(bad: &[f64], bad_prev: Option<&[f64]>, mass: &[f64]) -> f64 {
    let Some(prev) = bad_prev else {
        return 0.0;
    };
    0.5 * bad
        .iter()
        .zip(prev)
        .zip(mass)
        .map(|((b, p), m)| m * (b - p) * (b - p))
        .sum::<f64>()
}

/// Local Dirichlet energy `½·Σ_{j∈N(i)} w_ij (bad_i - bad_j)²`.
///
/// High values at hubs are the early-warning signal watched by governance.
pub fn compute_local_energy(graph: &GraphModel, bad: &[f64], idx: usize) -> f64 {
    0.5 * graph
        .neighbor_weights(idx)
        .map(|(j, w)| {
            let diff = bad[idx] - bad[j];
            w * diff * diff
        })
        .sum::<f64>()
}

/// `H = T + V`.
pub fn compute_hamiltonian(kinetic: f64, potential: f64) -> f64 {
    kinetic + potential
}

/// `L = T - V`. Diagnostic only; may be negative.
pub fn compute_lagrangian(kinetic: f64, potential: f64) -> f64 {
    kinetic - potential
}

/// Energy diagnostics of one state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Structural potential
    pub v_struct: f64,

    /// Business potential
    pub v_bus: f64,

    /// Total potential `V_struct + V_bus`
    pub v: f64,

    /// Kinetic energy
    pub t: f64,

    /// Hamiltonian (aggregate system stress)
    pub h: f64,

    /// Lagrangian
    pub lagrangian: f64,

    /// Local energy per node, indexed like the graph
    pub e_local: Vec<f64>,
}

impl Diagnostics {
    /// Computes every diagnostic from the current graph, fields and the
    /// previous badness snapshot.
    pub fn compute(
        graph: &GraphModel,
        fields: &FieldStore,
        bad_prev: Option<&[f64]>,
    ) -> CoreResult<Self> {
        if graph.node_count() != fields.len() {
            return Err(CoreError::DimensionMismatch {
                graph: graph.node_count(),
                fields: fields.len(),
            });
        }
        let bad = fields.badness();
        let v_struct = compute_structural_potential(graph, bad);
        let v_bus = compute_business_potential(fields);
        let v = v_struct + v_bus;
        let t = compute_kinetic_energy(bad, bad_prev, &node_masses(fields));
        let e_local = (0..graph.node_count())
            .map(|i| compute_local_energy(graph, bad, i))
            .collect();

        Ok(Self {
            v_struct,
            v_bus,
            v,
            t,
            h: compute_hamiltonian(t, v),
            lagrangian: compute_lagrangian(t, v),
            e_local,
        })
    }

    /// Local energy of a node, `0` for nodes added after this snapshot.
    pub fn local_energy(&self, idx: usize) -> f64 {
        self.e_local.get(idx).copied().unwrap_or(0.0)
    }

    /// The `n` nodes with the highest local energy, highest first.
    pub fn top_local_energy(&self, graph: &GraphModel, n: usize) -> Vec<(NodeId, f64)> {
        let mut ranked: Vec<(usize, f64)> = self.e_local.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(n)
            .map(|(i, e)| (graph.node_id(i).clone(), e))
            .collect()
    }
}
