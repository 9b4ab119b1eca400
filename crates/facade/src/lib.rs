//! Differentially private graph neural network training.
//!
//! Facade over the workspace crates: sensitivity-bounding building blocks
//! ([`core`](crate::core)), RDP accounting and calibration ([`accounting`]), the noisy
//! mechanisms ([`mechanisms`]), plus the privacy configuration and the
//! per-method privacy plans that tie them together.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod methods;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use gnn_privacy_accounting as accounting;
pub use gnn_privacy_core as core;
pub use gnn_privacy_mechanisms as mechanisms;

pub use gnn_privacy_accounting::{
    default_orders, rdp_to_epsilon, CalibrationRecord, Calibrator, ComposedNoisyMechanism,
    NoisyMechanism, RdpCurve,
};
pub use config::{auto_delta, Delta, DpLevel, Perturbation, PrivacyConfig};
pub use gnn_privacy_core::{
    Component, DegreeDirection, ExperimentSeed, Graph, Matrix, NeighborSampler, PoissonSampler,
    PrivacyError, Result, Tensor,
};
pub use gnn_privacy_mechanisms::{
    DpOptimizer, GnnBasedNoisySgd, GradSampleModule, Mechanism, NoisySgd, Optimizer,
    PerExampleGradients, Pma, TopMFilter,
};
pub use methods::{CalibratedPlan, GraphStats, MethodPlan, PrivacyMethod};

/// Convenience prelude covering the common private-training building blocks.
pub mod prelude {
    pub use crate::config::{Delta, DpLevel, Perturbation, PrivacyConfig};
    pub use crate::methods::{CalibratedPlan, GraphStats, MethodPlan, PrivacyMethod};
    pub use gnn_privacy_accounting::prelude::*;
    pub use gnn_privacy_core::prelude::*;
    pub use gnn_privacy_mechanisms::prelude::*;
}
