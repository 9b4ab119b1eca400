//! Sensitivity-bounding building blocks for private graph learning.
//!
//! This crate provides the framework-agnostic pieces that make the privacy
//! accounting assumptions hold at runtime: per-example clipping, Gaussian
//! noise, degree bounding, Poisson sampling and seeded random streams.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clipping;
pub mod error;
pub mod graph;
pub mod neighbor_sampler;
pub mod noise;
pub mod sampling;
pub mod seed;
pub mod tensor;

pub use clipping::{clip_and_sum, clip_tensor, ClipReport};
pub use error::{PrivacyError, Result};
pub use graph::{Edge, Graph, NodeId};
pub use neighbor_sampler::{DegreeDirection, NeighborSampler};
pub use noise::{add_gaussian_noise, gaussian_sample};
pub use sampling::{
    fixed_sample, poisson_sample, steps_per_epoch, BatchIndices, Epoch, PoissonSampler,
};
pub use seed::{Component, ExperimentSeed};
pub use tensor::{l2_norm, normalize_rows, sanitize, Matrix, Tensor};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        add_gaussian_noise, clip_and_sum, clip_tensor, fixed_sample, gaussian_sample,
        normalize_rows, poisson_sample, steps_per_epoch, BatchIndices, Component, DegreeDirection,
        ExperimentSeed, Graph, Matrix, NeighborSampler, PoissonSampler,
        PrivacyError, Result, Tensor,
    };
}
