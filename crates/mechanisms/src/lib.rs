//! Calibrated noisy mechanisms for private graph neural network training.
//!
//! - [`Pma`]: Gaussian noise on multi-hop neighborhood aggregates.
//! - [`NoisySgd`] and [`GnnBasedNoisySgd`]: DP-SGD with Poisson sampling,
//!   plus the optimizer and module hooks an external training loop plugs in.
//! - [`TopMFilter`]: edge-level perturbation of the graph structure.
//!
//! All of them implement [`NoisyMechanism`](gnn_privacy_accounting::NoisyMechanism)
//! and can be grouped through the closed [`Mechanism`] variant.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod gnn_sgd;
pub mod mechanism;
pub mod noisy_sgd;
pub mod pma;
pub mod topm;
pub mod training;

pub use gnn_sgd::GnnBasedNoisySgd;
pub use mechanism::Mechanism;
pub use noisy_sgd::NoisySgd;
pub use pma::Pma;
pub use topm::TopMFilter;
pub use training::{DpOptimizer, GradSampleModule, Optimizer, PerExampleGradients};

/// Common imports for building private pipelines.
pub mod prelude {
    pub use crate::{
        DpOptimizer, GnnBasedNoisySgd, GradSampleModule, Mechanism, NoisySgd, Optimizer,
        PerExampleGradients, Pma, TopMFilter,
    };
    pub use gnn_privacy_accounting::NoisyMechanism;
}
