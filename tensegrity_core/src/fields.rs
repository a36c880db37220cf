//! Per-node scalar fields and the derived badness and flow fields.
//!
//! Primitive fields (`health`, `complexity`, `risk`, `demand`) live in
//! `[0, 1]`; every write goes through [`clamp_unit`]. Derived fields are
//! recomputed on demand:
//!
//! ```text
//! bad[i]  = α(1 - health[i]) + β·complexity[i] + γ·risk[i]
//! grad[i] = Σ_j w_ij (bad[i] - bad[j])          = (L·bad)[i]
//! flow[i] = (κx·demand[i], -κy·grad[i])
//! ```

use crate::error::{CoreError, CoreResult};
use crate::graph::GraphModel;
use crate::params::EngineParams;
use nalgebra::{DVector, Vector2};
use serde::{Deserialize, Serialize};

/// Badness above which a node counts as high risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Clamps a value into `[0, 1]`, mapping NaN to `0`.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Primitive per-node field selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Health,
    Complexity,
    Risk,
    Demand,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Health, Field::Complexity, Field::Risk, Field::Demand];
}

/// Primitive field values of one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFields {
    pub health: f64,
    pub complexity: f64,
    pub risk: f64,
    pub demand: f64,
}

impl Default for NodeFields {
    fn default() -> Self {
        Self {
            health: 1.0,
            complexity: 0.0,
            risk: 0.0,
            demand: 0.0,
        }
    }
}

impl NodeFields {
    pub fn new(health: f64, complexity: f64, risk: f64, demand: f64) -> Self {
        Self { health, complexity, risk, demand }.clamped()
    }

    /// Returns a copy with every field clamped into `[0, 1]`.
    pub fn clamped(self) -> Self {
        Self {
            health: clamp_unit(self.health),
            complexity: clamp_unit(self.complexity),
            risk: clamp_unit(self.risk),
            demand: clamp_unit(self.demand),
        }
    }

    pub fn get(&self, field: Field) -> f64 {
        match field {
            Field::Health => self.health,
            Field::Complexity => self.complexity,
            Field::Risk => self.risk,
            Field::Demand => self.demand,
        }
    }

    fn slot(&mut self, field: Field) -> &mut f64 {
        match field {
            Field::Health => &mut self.health,
            Field::Complexity => &mut self.complexity,
            Field::Risk => &mut self.risk,
            Field::Demand => &mut self.demand,
        }
    }

    /// Badness of this node under the given weights.
    pub fn badness(&self, params: &EngineParams) -> f64 {
        params.alpha * (1.0 - self.health)
            + params.beta * self.complexity
            + params.gamma * self.risk
    }
}

/// Field storage indexed by graph node index.
#[derive(Debug, Clone)]
pub struct FieldStore {
    params: EngineParams,
    values: Vec<NodeFields>,
    bad: Vec<f64>,
    grad: Vec<f64>,
    flow: Vec<Vector2<f64>>,
}

impl FieldStore {
    /// Creates an empty store.
    pub fn new(params: EngineParams) -> Self {
        Self {
            params: params.sanitized(),
            values: Vec::new(),
            bad: Vec::new(),
            grad: Vec::new(),
            flow: Vec::new(),
        }
    }

    /// Creates a store from initial values (clamped) and computes badness.
    pub fn from_values(params: EngineParams, values: Vec<NodeFields>) -> Self {
        let mut store = Self::new(params);
        for v in values {
            store.push_node(v);
        }
        store
    }

    /// Appends a node. Its badness is computed immediately; its gradient and
    /// flow stay zero until the next [`FieldStore::recompute_flow`].
    pub fn push_node(&mut self, initial: NodeFields) -> usize {
        let v = initial.clamped();
        self.bad.push(v.badness(&self.params));
        self.values.push(v);
        self.grad.push(0.0);
        self.flow.push(Vector2::zeros());
        self.values.len() - 1
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn node(&self, idx: usize) -> &NodeFields {
        &self.values[idx]
    }

    pub fn get(&self, field: Field, idx: usize) -> f64 {
        self.values[idx].get(field)
    }

    /// Writes a field value, clamped into `[0, 1]`.
    pub fn set(&mut self, field: Field, idx: usize, value: f64) {
        *self.values[idx].slot(field) = clamp_unit(value);
    }

    /// Adds `delta` to a field and clamps the result.
    pub fn add(&mut self, field: Field, idx: usize, delta: f64) {
        let current = self.get(field, idx);
        self.set(field, idx, current + delta);
    }

    /// Recomputes `bad` from the primitive fields.
    pub fn recompute_badness(&mut self) {
        let params = self.params;
        for (bad, v) in self.bad.iter_mut().zip(&self.values) {
            *bad = v.badness(&params);
        }
    }

    /// Recomputes the badness gradient `L·bad` and the flow field.
    pub fn recompute_flow(&mut self, graph: &GraphModel) -> CoreResult<()> {
        if graph.node_count() != self.len() {
            return Err(CoreError::DimensionMismatch {
                graph: graph.node_count(),
                fields: self.len(),
            });
        }
        let grad = graph.laplacian() * self.badness_vector();
        for (i, v) in self.values.iter().enumerate() {
            self.grad[i] = grad[i];
            self.flow[i] = Vector2::new(
                self.params.flow_business * v.demand,
                -self.params.flow_stability * grad[i],
            );
        }
        Ok(())
    }

    /// Recomputes badness, then gradient and flow.
    pub fn recompute_derived(&mut self, graph: &GraphModel) -> CoreResult<()> {
        self.recompute_badness();
        self.recompute_flow(graph)
    }

    pub fn badness(&self) -> &[f64] {
        &self.bad
    }

    pub fn bad(&self, idx: usize) -> f64 {
        self.bad[idx]
    }

    /// Indices of nodes with badness above `threshold`, in index order.
    pub fn high_risk(&self, threshold: f64) -> Vec<usize> {
        self.bad
            .iter()
            .enumerate()
            .filter(|(_, b)| **b > threshold)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn badness_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.bad)
    }

    /// Copy of the badness vector, kept as `bad_prev` for the next step.
    pub fn snapshot_badness(&self) -> Vec<f64> {
        self.bad.clone()
    }

    pub fn gradient(&self, idx: usize) -> f64 {
        self.grad[idx]
    }

    pub fn flow(&self, idx: usize) -> Vector2<f64> {
        self.flow[idx]
    }

    /// Iterates over every field value of every node.
    pub fn all_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .flat_map(|v| Field::ALL.into_iter().map(move |f| v.get(f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use approx::assert_relative_eq;

    fn path_setup() -> (GraphModel, FieldStore) {
        let graph = GraphModel::with_edges(
            ["A", "B", "C"],
            &[Edge::new("A", "B", 0.5), Edge::new("B", "C", 0.5)],
        )
        .unwrap();
        let fields = FieldStore::from_values(
            EngineParams::default(),
            vec![
                NodeFields::new(0.9, 0.0, 0.0, 0.0),
                NodeFields::new(0.5, 0.0, 0.0, 0.0),
                NodeFields::new(0.9, 0.0, 0.0, 0.0),
            ],
        );
        (graph, fields)
    }

    #[test]
    fn test_badness_of_path_example() {
        let (_, fields) = path_setup();
        assert_relative_eq!(fields.bad(0), 0.04, epsilon = 1e-12);
        assert_relative_eq!(fields.bad(1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(fields.bad(2), 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_high_risk() {
        let (_, mut fields) = path_setup();
        assert!(fields.high_risk(HIGH_RISK_THRESHOLD).is_empty());
        assert_eq!(fields.high_risk(0.1), vec![1]);

        fields.set(Field::Health, 2, 0.0);
        fields.set(Field::Complexity, 2, 1.0);
        fields.set(Field::Risk, 2, 1.0);
        fields.recompute_badness();
        assert_eq!(fields.high_risk(HIGH_RISK_THRESHOLD), vec![2]);
    }

    #[test]
    fn test_writes_are_clamped() {
        let (_, mut fields) = path_setup();
        fields.add(Field::Health, 0, 0.5);
        assert_eq!(fields.get(Field::Health, 0), 1.0);

        fields.add(Field::Risk, 1, -2.0);
        assert_eq!(fields.get(Field::Risk, 1), 0.0);

        fields.set(Field::Demand, 2, f64::NAN);
        assert_eq!(fields.get(Field::Demand, 2), 0.0);

        let clamped = NodeFields::new(1.4, -0.2, 0.5, 7.0);
        assert_eq!(clamped, NodeFields::new(1.0, 0.0, 0.5, 1.0));
    }

    #[test]
    fn test_gradient_and_flow() {
        let (graph, mut fields) = path_setup();
        fields.set(Field::Demand, 1, 0.5);
        fields.recompute_derived(&graph).unwrap();

        // grad[B] = 0.5·(0.2-0.04) + 0.5·(0.2-0.04)
        assert_relative_eq!(fields.gradient(1), 0.16, epsilon = 1e-12);
        assert_relative_eq!(fields.gradient(0), -0.08, epsilon = 1e-12);

        let flow_b = fields.flow(1);
        assert_relative_eq!(flow_b.x, 0.3, epsilon = 1e-12);
        assert_relative_eq!(flow_b.y, -0.064, epsilon = 1e-12);
        assert!(fields.flow(0).y > 0.0);
    }

    #[test]
    fn test_recompute_flow_checks_dimensions() {
        let (mut graph, mut fields) = path_setup();
        graph.add_node("D").unwrap();
        assert!(matches!(
            fields.recompute_flow(&graph),
            Err(CoreError::DimensionMismatch { graph: 4, fields: 3 })
        ));
        fields.push_node(NodeFields::default());
        assert!(fields.recompute_flow(&graph).is_ok());
    }
}
