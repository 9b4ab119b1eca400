//! Privacy plans of the supported private GNN training methods.
//!
//! A [`MethodPlan`] lists the noisy mechanisms a method actually runs, in the
//! order they run, as one composed group sharing a single noise scale.
//! Calibrating the plan yields a [`CalibratedPlan`] from which the training
//! driver takes its calibrated mechanisms.

use serde::{Deserialize, Serialize};
use tracing::info;

use gnn_privacy_accounting::{
    CalibrationRecord, Calibrator, ComposedNoisyMechanism, NoisyMechanism,
};
use gnn_privacy_core::{ExperimentSeed, Graph, NeighborSampler, PrivacyError, Result};
use gnn_privacy_mechanisms::{GnnBasedNoisySgd, Mechanism, NoisySgd, Pma, TopMFilter};

use crate::config::{DpLevel, Perturbation, PrivacyConfig};

/// Supported private training methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrivacyMethod {
    /// GAP under edge-level DP.
    GapEdp,
    /// GAP under node-level DP.
    GapNdp,
    /// GraphSAGE under edge-level DP.
    SageEdp,
    /// GraphSAGE under node-level DP.
    SageNdp,
    /// Graph-free MLP trained with DP-SGD.
    MlpDp,
}

impl PrivacyMethod {
    /// Neighboring relation the method protects.
    pub fn dp_level(self) -> DpLevel {
        match self {
            PrivacyMethod::GapEdp | PrivacyMethod::SageEdp => DpLevel::Edge,
            PrivacyMethod::GapNdp | PrivacyMethod::SageNdp | PrivacyMethod::MlpDp => DpLevel::Node,
        }
    }

    /// Short method name.
    pub fn name(self) -> &'static str {
        match self {
            PrivacyMethod::GapEdp => "gap-edp",
            PrivacyMethod::GapNdp => "gap-ndp",
            PrivacyMethod::SageEdp => "sage-edp",
            PrivacyMethod::SageNdp => "sage-ndp",
            PrivacyMethod::MlpDp => "mlp-dp",
        }
    }
}

/// Dataset sizes a plan depends on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of nodes.
    pub num_nodes: usize,
    /// Number of stored directed edges.
    pub num_edges: usize,
    /// Number of training nodes, the private records of node-level methods.
    pub num_train_nodes: usize,
}

impl GraphStats {
    /// Sizes of `graph` with `num_train_nodes` training nodes.
    pub fn from_graph(graph: &Graph, num_train_nodes: usize) -> Self {
        Self {
            num_nodes: graph.num_nodes(),
            num_edges: graph.num_edges(),
            num_train_nodes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Aggregation,
    EncoderSgd,
    ClassifierSgd,
    GraphFilter,
    GnnSgd,
}

/// Uncalibrated mechanisms of one method on one dataset.
#[derive(Clone, Debug)]
pub struct MethodPlan {
    method: PrivacyMethod,
    config: PrivacyConfig,
    stats: GraphStats,
    roles: Vec<Role>,
    group: ComposedNoisyMechanism<Mechanism>,
}

impl MethodPlan {
    /// Build the plan of `method`.
    ///
    /// The method fixes the DP level; `config.dp_level` is overridden.
    pub fn build(method: PrivacyMethod, config: PrivacyConfig, stats: GraphStats) -> Result<Self> {
        let config = config.with_dp_level(method.dp_level());
        config.validate()?;

        let train_sgd = |epochs: usize| {
            NoisySgd::new(
                stats.num_train_nodes,
                config.batch_size,
                epochs,
                config.max_grad_norm,
            )
        };

        let members: Vec<(Role, Mechanism)> = match method {
            PrivacyMethod::GapEdp => match config.perturbation {
                Perturbation::Aggregation => {
                    vec![(Role::Aggregation, Pma::new(config.hops).into())]
                }
                Perturbation::Graph => vec![(Role::GraphFilter, TopMFilter::new().into())],
            },
            PrivacyMethod::GapNdp => vec![
                (Role::EncoderSgd, train_sgd(config.pre_epochs)?.into()),
                (Role::Aggregation, Pma::new(config.hops).into()),
                (Role::ClassifierSgd, train_sgd(config.epochs)?.into()),
            ],
            PrivacyMethod::SageEdp => vec![(Role::GraphFilter, TopMFilter::new().into())],
            PrivacyMethod::SageNdp => {
                if config.max_degree == 0 {
                    return Err(PrivacyError::config(
                        "node-level GraphSAGE needs a positive max_degree",
                    ));
                }
                let sgd = GnnBasedNoisySgd::new(
                    stats.num_train_nodes,
                    config.batch_size,
                    config.epochs,
                    config.max_grad_norm,
                    config.max_degree,
                )?
                .with_layers(config.layers)?;
                vec![(Role::GnnSgd, sgd.into())]
            }
            PrivacyMethod::MlpDp => vec![(Role::ClassifierSgd, train_sgd(config.epochs)?.into())],
        };

        let (roles, mechanisms): (Vec<Role>, Vec<Mechanism>) = members.into_iter().unzip();
        Ok(Self {
            method,
            config,
            stats,
            roles,
            group: ComposedNoisyMechanism::once(mechanisms),
        })
    }

    /// Method this plan belongs to.
    pub fn method(&self) -> PrivacyMethod {
        self.method
    }

    /// Effective configuration.
    pub fn config(&self) -> &PrivacyConfig {
        &self.config
    }

    /// Composed group that will be calibrated.
    pub fn mechanism(&self) -> &ComposedNoisyMechanism<Mechanism> {
        &self.group
    }

    /// Number of private records δ is derived from.
    ///
    /// Stored edges at edge level, training nodes at node level.
    pub fn data_size(&self) -> usize {
        match self.config.dp_level {
            DpLevel::Edge => self.stats.num_edges,
            DpLevel::Node => self.stats.num_train_nodes,
        }
    }

    /// Resolved δ.
    pub fn delta(&self) -> f64 {
        self.config.resolved_delta(self.data_size())
    }

    /// Calibrate with the default search parameters.
    pub fn calibrate(self) -> Result<CalibratedPlan> {
        self.calibrate_with(&Calibrator::default())
    }

    /// Calibrate the shared noise scale to the configured budget.
    pub fn calibrate_with(mut self, calibrator: &Calibrator) -> Result<CalibratedPlan> {
        let delta = self.delta();
        info!(method = self.method.name(), delta, "resolved delta");

        let record =
            calibrator.calibrate_with_record(&mut self.group, self.config.epsilon, delta)?;
        info!(
            method = self.method.name(),
            noise_scale = record.noise_scale,
            achieved_epsilon = record.achieved_epsilon,
            "calibrated noise scale"
        );

        let mut plan = CalibratedPlan {
            method: self.method,
            config: self.config,
            delta,
            noise_scale: record.noise_scale,
            epsilon: self.group.epsilon_with_orders(delta, calibrator.orders()),
            record,
            pma: None,
            encoder_sgd: None,
            classifier_sgd: None,
            graph_filter: None,
            gnn_sgd: None,
        };
        for (role, mechanism) in self.roles.into_iter().zip(self.group.into_mechanisms()) {
            match (role, mechanism) {
                (Role::Aggregation, Mechanism::Pma(m)) => plan.pma = Some(m),
                (Role::EncoderSgd, Mechanism::NoisySgd(m)) => plan.encoder_sgd = Some(m),
                (Role::ClassifierSgd, Mechanism::NoisySgd(m)) => plan.classifier_sgd = Some(m),
                (Role::GraphFilter, Mechanism::TopMFilter(m)) => plan.graph_filter = Some(m),
                (Role::GnnSgd, Mechanism::GnnNoisySgd(m)) => plan.gnn_sgd = Some(m),
                (role, m) => {
                    return Err(PrivacyError::config(format!(
                        "{} cannot fill role {role:?}",
                        m.name()
                    )))
                }
            }
        }
        if self.method == PrivacyMethod::GapEdp && plan.config.perturbation == Perturbation::Graph {
            // the perturbed graph already carries the privacy guarantee
            plan.pma = Some(Pma::new(plan.config.hops));
        }
        Ok(plan)
    }
}

/// Calibrated mechanisms of one method, ready for training.
#[derive(Clone, Debug)]
pub struct CalibratedPlan {
    method: PrivacyMethod,
    config: PrivacyConfig,
    delta: f64,
    noise_scale: f64,
    epsilon: f64,
    record: CalibrationRecord,
    pma: Option<Pma>,
    encoder_sgd: Option<NoisySgd>,
    classifier_sgd: Option<NoisySgd>,
    graph_filter: Option<TopMFilter>,
    gnn_sgd: Option<GnnBasedNoisySgd>,
}

impl CalibratedPlan {
    /// Method this plan belongs to.
    pub fn method(&self) -> PrivacyMethod {
        self.method
    }

    /// Effective configuration.
    pub fn config(&self) -> &PrivacyConfig {
        &self.config
    }

    /// Resolved δ.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Shared calibrated noise scale.
    pub fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    /// ε of the whole pipeline at the calibrated scale.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Reproducibility record of the calibration.
    pub fn record(&self) -> &CalibrationRecord {
        &self.record
    }

    /// Aggregation perturbation, for GAP methods.
    pub fn pma(&self) -> Option<&Pma> {
        self.pma.as_ref()
    }

    /// Encoder pre-training DP-SGD, for GAP-NDP.
    pub fn encoder_sgd(&self) -> Option<&NoisySgd> {
        self.encoder_sgd.as_ref()
    }

    /// Classifier DP-SGD, for GAP-NDP and MLP-DP.
    pub fn classifier_sgd(&self) -> Option<&NoisySgd> {
        self.classifier_sgd.as_ref()
    }

    /// Graph structure perturbation, for edge-level graph perturbation.
    pub fn graph_filter(&self) -> Option<&TopMFilter> {
        self.graph_filter.as_ref()
    }

    /// Node-level GNN DP-SGD, for SAGE-NDP.
    pub fn gnn_sgd(&self) -> Option<&GnnBasedNoisySgd> {
        self.gnn_sgd.as_ref()
    }

    /// Per-hop sensitivity to pass to [`Pma::apply`].
    pub fn aggregation_sensitivity(&self) -> f64 {
        self.config
            .dp_level
            .aggregation_sensitivity(self.config.max_degree)
    }

    /// Degree bound to apply before aggregation or message passing.
    ///
    /// Only node-level methods that touch the graph bound degrees. Fails
    /// when such a method carries a zero degree bound.
    pub fn neighbor_sampler(&self) -> Result<Option<NeighborSampler>> {
        let uses_graph = match self.method {
            PrivacyMethod::GapNdp => self.config.hops > 0,
            PrivacyMethod::SageNdp => true,
            _ => false,
        };
        if !uses_graph {
            return Ok(None);
        }
        NeighborSampler::new(self.config.max_degree).map(Some)
    }

    /// Root seed of the run.
    pub fn seed(&self) -> ExperimentSeed {
        ExperimentSeed(self.config.seed)
    }
}
