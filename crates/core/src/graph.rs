//! Minimal directed graph structure used by the graph mechanisms.

use std::collections::BTreeSet;

use ndarray::{Axis, Zip};

use crate::error::{PrivacyError, Result};
use crate::tensor::Matrix;

/// Node identifier.
pub type NodeId = usize;

/// A directed edge `(source, target)`; messages flow from source to target.
pub type Edge = (NodeId, NodeId);

/// A directed multigraph stored as an edge list.
///
/// Undirected graphs store both directions of every edge. Values of this type
/// are never mutated by the privacy transforms; each transform returns a new
/// graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Graph {
    num_nodes: usize,
    edges: Vec<Edge>,
}

impl Graph {
    /// Build a graph from directed edges, validating node ids.
    pub fn new(num_nodes: usize, edges: Vec<Edge>) -> Result<Self> {
        if let Some(&(u, v)) = edges.iter().find(|(u, v)| *u >= num_nodes || *v >= num_nodes) {
            return Err(PrivacyError::config(format!(
                "edge ({u}, {v}) references a node outside 0..{num_nodes}"
            )));
        }
        Ok(Self { num_nodes, edges })
    }

    /// Build a graph from edges already known to reference valid nodes.
    pub(crate) fn from_valid_edges(num_nodes: usize, edges: Vec<Edge>) -> Self {
        debug_assert!(edges.iter().all(|&(u, v)| u < num_nodes && v < num_nodes));
        Self { num_nodes, edges }
    }

    /// Build a symmetric graph from undirected pairs.
    ///
    /// Each pair `(u, v)` with `u != v` is stored in both directions; self-loops
    /// are stored once.
    pub fn from_undirected<I>(num_nodes: usize, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = Edge>,
    {
        let mut edges = Vec::new();
        for (u, v) in pairs {
            edges.push((u, v));
            if u != v {
                edges.push((v, u));
            }
        }
        Self::new(num_nodes, edges)
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of stored directed edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Stored directed edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Sources of the edges pointing at each node, in edge order.
    pub fn in_neighbors(&self) -> Vec<Vec<NodeId>> {
        let mut adj = vec![Vec::new(); self.num_nodes];
        for &(u, v) in &self.edges {
            adj[v].push(u);
        }
        adj
    }

    /// Targets of the edges leaving each node, in edge order.
    pub fn out_neighbors(&self) -> Vec<Vec<NodeId>> {
        let mut adj = vec![Vec::new(); self.num_nodes];
        for &(u, v) in &self.edges {
            adj[u].push(v);
        }
        adj
    }

    /// In-degree of every node.
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut deg = vec![0; self.num_nodes];
        for &(_, v) in &self.edges {
            deg[v] += 1;
        }
        deg
    }

    /// Out-degree of every node.
    pub fn out_degrees(&self) -> Vec<usize> {
        let mut deg = vec![0; self.num_nodes];
        for &(u, _) in &self.edges {
            deg[u] += 1;
        }
        deg
    }

    /// Canonical undirected view: pairs `(u, v)` with `u < v`, self-loops dropped.
    pub fn undirected_edges(&self) -> BTreeSet<Edge> {
        self.edges
            .iter()
            .filter(|(u, v)| u != v)
            .map(|&(u, v)| if u < v { (u, v) } else { (v, u) })
            .collect()
    }

    /// Sum-aggregate node features along edges: `out[v] = sum over u -> v of x[u]`.
    pub fn aggregate(&self, x: &Matrix) -> Result<Matrix> {
        if x.nrows() != self.num_nodes {
            return Err(PrivacyError::config(format!(
                "feature matrix has {} rows but the graph has {} nodes",
                x.nrows(),
                self.num_nodes
            )));
        }
        let mut out = Matrix::zeros(x.raw_dim());
        for &(u, v) in &self.edges {
            let src = x.index_axis(Axis(0), u);
            let mut dst = out.index_axis_mut(Axis(0), v);
            Zip::from(&mut dst).and(&src).for_each(|d, &s| *d += s);
        }
        Ok(out)
    }
}
