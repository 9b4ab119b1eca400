//! Degree bounding for node-level differential privacy.
//!
//! Node-level sensitivity bounds such as `sqrt(max_degree)` only hold once
//! every node has at most `max_degree` neighbors. [`NeighborSampler`] enforces
//! this by subsampling the neighbor lists of high-degree nodes.
//!
//! The sample is drawn once and reused for the whole training run. The privacy
//! accounting charges only the aggregation and training mechanisms, so drawing
//! a fresh sample per epoch would need an extra accounting term.

use rand::seq::index;
use rand::Rng;
use tracing::debug;

use crate::error::{PrivacyError, Result};
use crate::graph::Graph;

/// Which degree the sampler bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DegreeDirection {
    /// Bound the number of edges pointing at each node (aggregation fan-in).
    #[default]
    Incoming,
    /// Bound the number of edges leaving each node.
    Outgoing,
}

/// Uniform neighbor subsampler capping node degrees at `max_degree`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborSampler {
    max_degree: usize,
    direction: DegreeDirection,
}

impl NeighborSampler {
    /// Create a sampler bounding in-degrees at `max_degree`.
    pub fn new(max_degree: usize) -> Result<Self> {
        if max_degree == 0 {
            return Err(PrivacyError::config(
                "max_degree must be positive for degree bounding",
            ));
        }
        Ok(Self {
            max_degree,
            direction: DegreeDirection::Incoming,
        })
    }

    /// Choose which degree to bound.
    pub fn with_direction(mut self, direction: DegreeDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Maximum degree kept per node.
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Degree direction bounded by this sampler.
    pub fn direction(&self) -> DegreeDirection {
        self.direction
    }

    /// Produce a degree-bounded copy of `graph`.
    ///
    /// Nodes whose degree exceeds the bound keep exactly `max_degree` edges
    /// chosen uniformly without replacement. All other nodes keep their edges
    /// unchanged and in the same order.
    pub fn apply<R: Rng + ?Sized>(&self, graph: &Graph, rng: &mut R) -> Graph {
        let edges = graph.edges();
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); graph.num_nodes()];
        for (i, &(u, v)) in edges.iter().enumerate() {
            let node = match self.direction {
                DegreeDirection::Incoming => v,
                DegreeDirection::Outgoing => u,
            };
            groups[node].push(i);
        }

        let mut keep = vec![true; edges.len()];
        let mut truncated = 0usize;
        for group in groups.iter().filter(|g| g.len() > self.max_degree) {
            truncated += 1;
            for &i in group {
                keep[i] = false;
            }
            for pos in index::sample(rng, group.len(), self.max_degree).into_iter() {
                keep[group[pos]] = true;
            }
        }

        let bounded: Vec<_> = edges
            .iter()
            .zip(keep)
            .filter_map(|(&e, k)| k.then_some(e))
            .collect();

        debug!(
            max_degree = self.max_degree,
            truncated_nodes = truncated,
            edges_before = edges.len(),
            edges_after = bounded.len(),
            "bounded node degrees"
        );

        Graph::from_valid_edges(graph.num_nodes(), bounded)
    }
}
