//! Privacy configuration of a training run.

use serde::{Deserialize, Serialize};

use gnn_privacy_core::{PrivacyError, Result};

/// What a neighboring dataset differs by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpLevel {
    /// One edge added or removed.
    #[default]
    Edge,
    /// One node added or removed together with its edges.
    Node,
}

impl DpLevel {
    /// Per-hop ℓ2 sensitivity of a sum aggregation over unit-norm rows.
    ///
    /// One edge moves one row of one aggregate. One node with in-degree
    /// bounded by `max_degree` moves up to `max_degree` rows.
    pub fn aggregation_sensitivity(self, max_degree: usize) -> f64 {
        match self {
            DpLevel::Edge => 1.0,
            DpLevel::Node => (max_degree as f64).sqrt(),
        }
    }
}

/// Where edge-level noise enters a GAP pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perturbation {
    /// Noise on the aggregated features (PMA).
    #[default]
    #[serde(rename = "aggr")]
    Aggregation,
    /// Noise on the graph structure (top-M filter).
    Graph,
}

/// Target δ, fixed or derived from the dataset size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delta {
    /// `10^-digits(data_size)`, or zero when ε is unbounded.
    #[default]
    Auto,
    /// Explicit δ in `[0, 1]`.
    Fixed(f64),
}

impl Delta {
    /// δ for a run on `data_size` records at target `epsilon`.
    pub fn resolve(self, epsilon: f64, data_size: usize) -> f64 {
        match self {
            Delta::Fixed(delta) => delta,
            Delta::Auto if epsilon == f64::INFINITY => 0.0,
            Delta::Auto => auto_delta(data_size),
        }
    }
}

/// `10^-d` where `d` is the number of decimal digits of `data_size`.
///
/// Always below `1 / data_size`.
pub fn auto_delta(data_size: usize) -> f64 {
    let digits = data_size.to_string().len();
    1.0 / 10f64.powi(digits as i32)
}

/// Privacy parameters of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Neighboring relation protected.
    pub dp_level: DpLevel,
    /// Edge-level noise placement for GAP.
    pub perturbation: Perturbation,
    /// Target ε; `+∞` disables noise. Serialized as `null` when unbounded.
    #[serde(with = "unbounded")]
    pub epsilon: f64,
    /// Target δ.
    pub delta: Delta,
    /// Number of aggregation hops.
    pub hops: usize,
    /// In-degree bound applied before node-level aggregation.
    pub max_degree: usize,
    /// Per-example gradient clipping bound.
    pub max_grad_norm: f64,
    /// Expected batch size; zero means full batch (edge level only).
    pub batch_size: usize,
    /// Message-passing layers of a node-level GNN.
    pub layers: usize,
    /// Classifier training epochs.
    pub epochs: usize,
    /// Encoder pre-training epochs.
    pub pre_epochs: usize,
    /// Root seed of the experiment.
    pub seed: u64,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            dp_level: DpLevel::Edge,
            perturbation: Perturbation::Aggregation,
            epsilon: f64::INFINITY,
            delta: Delta::Auto,
            hops: 2,
            max_degree: 10,
            max_grad_norm: 1.0,
            batch_size: 0,
            layers: 1,
            epochs: 100,
            pre_epochs: 100,
            seed: 0,
        }
    }
}

impl PrivacyConfig {
    /// Set the protected neighboring relation.
    pub fn with_dp_level(mut self, dp_level: DpLevel) -> Self {
        self.dp_level = dp_level;
        self
    }

    /// Set the edge-level noise placement.
    pub fn with_perturbation(mut self, perturbation: Perturbation) -> Self {
        self.perturbation = perturbation;
        self
    }

    /// Set the (ε, δ) target.
    pub fn with_budget(mut self, epsilon: f64, delta: Delta) -> Self {
        self.epsilon = epsilon;
        self.delta = delta;
        self
    }

    /// Set the number of aggregation hops.
    pub fn with_hops(mut self, hops: usize) -> Self {
        self.hops = hops;
        self
    }

    /// Set the in-degree bound.
    pub fn with_max_degree(mut self, max_degree: usize) -> Self {
        self.max_degree = max_degree;
        self
    }

    /// Set the clipping bound.
    pub fn with_max_grad_norm(mut self, max_grad_norm: f64) -> Self {
        self.max_grad_norm = max_grad_norm;
        self
    }

    /// Set the expected batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of message-passing layers.
    pub fn with_layers(mut self, layers: usize) -> Self {
        self.layers = layers;
        self
    }

    /// Set pre-training and training epochs.
    pub fn with_epochs(mut self, pre_epochs: usize, epochs: usize) -> Self {
        self.pre_epochs = pre_epochs;
        self.epochs = epochs;
        self
    }

    /// Set the experiment seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the parameters for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.epsilon.is_nan() || self.epsilon < 0.0 {
            return Err(PrivacyError::config(format!(
                "epsilon must be >= 0 or +inf, got {}",
                self.epsilon
            )));
        }
        if let Delta::Fixed(delta) = self.delta {
            if !(0.0..=1.0).contains(&delta) {
                return Err(PrivacyError::config(format!(
                    "delta must be in [0, 1], got {delta}"
                )));
            }
        }
        if !self.max_grad_norm.is_finite() || self.max_grad_norm <= 0.0 {
            return Err(PrivacyError::config("max_grad_norm must be finite and positive"));
        }
        if self.layers == 0 {
            return Err(PrivacyError::config("layers must be at least 1"));
        }
        if self.dp_level == DpLevel::Node {
            if self.perturbation != Perturbation::Aggregation {
                return Err(PrivacyError::config(
                    "graph perturbation only protects edges; use aggregation perturbation",
                ));
            }
            if self.hops > 0 && self.max_degree == 0 {
                return Err(PrivacyError::config(
                    "node-level aggregation needs a positive max_degree",
                ));
            }
            if self.batch_size == 0 {
                return Err(PrivacyError::config(
                    "node-level DP requires Poisson mini-batches (batch_size > 0)",
                ));
            }
        }
        Ok(())
    }

    /// δ this configuration resolves to for `data_size` records.
    pub fn resolved_delta(&self, data_size: usize) -> f64 {
        self.delta.resolve(self.epsilon, data_size)
    }
}

/// `f64` that maps `+∞` to `null` and back.
mod unbounded {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        let finite = value.is_finite().then_some(*value);
        finite.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}
