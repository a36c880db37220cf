//! Weighted dependency graph and its Laplacian.
//!
//! Nodes are software modules, undirected edges are couplings with a weight
//! in `(0, 1]`. The dense Laplacian `L = D - A` is cached and rebuilt lazily
//! after any structural mutation.

use crate::error::{CoreError, CoreResult};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};

/// Identifier of a module in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Creates a node identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An undirected weighted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub a: NodeId,
    pub b: NodeId,
    pub weight: f64,
}

impl Edge {
    pub fn new(a: impl Into<NodeId>, b: impl Into<NodeId>, weight: f64) -> Self {
        Self { a: a.into(), b: b.into(), weight }
    }
}

/// Weighted undirected graph over [`NodeId`]s.
///
/// Node indices are stable: a node's index is its insertion position, and
/// every per-node vector in the workspace uses the same ordering.
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    /// Nodes in insertion order
    nodes: Vec<NodeId>,

    /// Reverse lookup from identifier to index
    index: HashMap<NodeId, usize>,

    /// Per-node neighbor weights, ordered by neighbor index
    adjacency: Vec<BTreeMap<usize, f64>>,

    /// Cached dense Laplacian, cleared on structural change
    laplacian: OnceCell<DMatrix<f64>>,
}

impl GraphModel {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from a node list and an edge list.
    ///
    /// Construction is strict: an edge that is a self-loop, references an
    /// unknown node, or carries a weight outside `(0, 1]` is rejected.
    pub fn with_edges<I, N>(nodes: I, edges: &[Edge]) -> CoreResult<Self>
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in edges {
            if !(edge.weight.is_finite() && edge.weight > 0.0 && edge.weight <= 1.0) {
                return Err(CoreError::InvalidWeight {
                    a: edge.a.to_string(),
                    b: edge.b.to_string(),
                    weight: edge.weight,
                });
            }
            graph.add_edge(edge.a.as_str(), edge.b.as_str(), edge.weight)?;
        }
        Ok(graph)
    }

    /// Adds a node and returns its index.
    pub fn add_node(&mut self, id: impl Into<NodeId>) -> CoreResult<usize> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(CoreError::DuplicateNode(id.0));
        }
        let idx = self.nodes.len();
        self.index.insert(id.clone(), idx);
        self.nodes.push(id);
        self.adjacency.push(BTreeMap::new());
        self.invalidate();
        Ok(idx)
    }

    /// Inserts or updates an edge.
    ///
    /// Weights above `1.0` are capped; non-finite or non-positive weights and
    /// self-loops are rejected.
    pub fn add_edge(&mut self, a: &str, b: &str, weight: f64) -> CoreResult<()> {
        let (ia, ib) = (self.index_of(a)?, self.index_of(b)?);
        if ia == ib {
            return Err(CoreError::SelfLoop(a.to_string()));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(CoreError::InvalidWeight {
                a: a.to_string(),
                b: b.to_string(),
                weight,
            });
        }
        self.set_weight(ia, ib, weight.min(1.0));
        Ok(())
    }

    /// Removes an edge if present. Returns whether an edge was removed.
    pub fn remove_edge(&mut self, a: &str, b: &str) -> CoreResult<bool> {
        let (ia, ib) = (self.index_of(a)?, self.index_of(b)?);
        let removed = self.adjacency[ia].remove(&ib).is_some();
        self.adjacency[ib].remove(&ia);
        if removed {
            self.invalidate();
        }
        Ok(removed)
    }

    /// Multiplies the weight of every edge touching `id` by `factor`,
    /// capped at `1.0`. Returns the number of edges rescaled.
    pub fn scale_edges_touching(&mut self, id: &str, factor: f64) -> CoreResult<usize> {
        let i = self.index_of(id)?;
        let touching: Vec<(usize, f64)> = self.adjacency[i].iter().map(|(&j, &w)| (j, w)).collect();
        for &(j, w) in &touching {
            let scaled = (w * factor).clamp(f64::MIN_POSITIVE, 1.0);
            self.set_weight(i, j, scaled);
        }
        Ok(touching.len())
    }

    /// Returns the identifiers of the neighbors of `id`.
    pub fn neighbors(&self, id: &str) -> CoreResult<Vec<&NodeId>> {
        let i = self.index_of(id)?;
        Ok(self.adjacency[i].keys().map(|&j| &self.nodes[j]).collect())
    }

    /// Returns every edge incident to `id`, with `id` as the `a` endpoint.
    pub fn edges_touching(&self, id: &str) -> CoreResult<Vec<Edge>> {
        let i = self.index_of(id)?;
        Ok(self.adjacency[i]
            .iter()
            .map(|(&j, &w)| Edge {
                a: self.nodes[i].clone(),
                b: self.nodes[j].clone(),
                weight: w,
            })
            .collect())
    }

    /// Returns all edges, each listed once with the lower index first.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(self.edge_count());
        for (i, row) in self.adjacency.iter().enumerate() {
            for (&j, &w) in row.range(i + 1..) {
                edges.push(Edge {
                    a: self.nodes[i].clone(),
                    b: self.nodes[j].clone(),
                    weight: w,
                });
            }
        }
        edges
    }

    /// Neighbor indices and weights of the node at `idx`.
    pub fn neighbor_weights(&self, idx: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.adjacency[idx].iter().map(|(&j, &w)| (j, w))
    }

    /// Weight of the edge between `a` and `b`, if any.
    pub fn weight(&self, a: &str, b: &str) -> Option<f64> {
        let (ia, ib) = (self.index.get(a)?, self.index.get(b)?);
        self.adjacency[*ia].get(ib).copied()
    }

    /// Number of neighbors of `id`.
    pub fn degree(&self, id: &str) -> CoreResult<usize> {
        Ok(self.adjacency[self.index_of(id)?].len())
    }

    /// Sum of the weights of the edges incident to `id`.
    pub fn weighted_degree(&self, id: &str) -> CoreResult<f64> {
        Ok(self.adjacency[self.index_of(id)?].values().sum())
    }

    /// Index of a node.
    pub fn index_of(&self, id: &str) -> CoreResult<usize> {
        self.index.get(id).copied().ok_or_else(|| CoreError::not_found(id))
    }

    /// Returns true if the node exists.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Identifier of the node at `idx`.
    pub fn node_id(&self, idx: usize) -> &NodeId {
        &self.nodes[idx]
    }

    /// All nodes in index order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeMap::len).sum::<usize>() / 2
    }

    /// Returns the Laplacian `L = D - A`, rebuilding it if the topology
    /// changed since the last call.
    pub fn laplacian(&self) -> &DMatrix<f64> {
        self.laplacian.get_or_init(|| self.build_laplacian())
    }

    /// Returns true if the cached Laplacian is current.
    pub fn laplacian_is_cached(&self) -> bool {
        self.laplacian.get().is_some()
    }

    fn build_laplacian(&self) -> DMatrix<f64> {
        // Dense is fine for the tens-of-nodes graphs simulated here.
        let n = self.nodes.len();
        let mut l = DMatrix::zeros(n, n);
        for (i, row) in self.adjacency.iter().enumerate() {
            for (&j, &w) in row {
                l[(i, j)] -= w;
                l[(i, i)] += w;
            }
        }
        l
    }

    fn set_weight(&mut self, i: usize, j: usize, w: f64) {
        self.adjacency[i].insert(j, w);
        self.adjacency[j].insert(i, w);
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.laplacian.take();
    }
}
