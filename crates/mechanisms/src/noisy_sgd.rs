//! DP-SGD with Poisson sampling on independent examples.

use tracing::warn;

use gnn_privacy_accounting::{clamp_noise_scale, subsampled_gaussian_rdp, NoisyMechanism};
use gnn_privacy_core::{steps_per_epoch, PoissonSampler, PrivacyError, Result};

use crate::training::{DpOptimizer, GradSampleModule, Optimizer, PerExampleGradients};

/// DP-SGD over `epochs` passes of Poisson-sampled batches.
///
/// Each step is a subsampled Gaussian mechanism with sampling rate
/// `q = min(1, batch_size / dataset_size)`; an epoch has
/// `ceil(dataset_size / batch_size)` steps.
#[derive(Clone, Debug, PartialEq)]
pub struct NoisySgd {
    dataset_size: usize,
    batch_size: usize,
    epochs: usize,
    max_grad_norm: f64,
    noise_scale: f64,
}

impl NoisySgd {
    /// Create an uncalibrated DP-SGD mechanism.
    pub fn new(
        dataset_size: usize,
        batch_size: usize,
        epochs: usize,
        max_grad_norm: f64,
    ) -> Result<Self> {
        if dataset_size == 0 {
            return Err(PrivacyError::config("dataset_size must be positive"));
        }
        if batch_size == 0 {
            return Err(PrivacyError::config("batch_size must be positive"));
        }
        if !max_grad_norm.is_finite() || max_grad_norm <= 0.0 {
            return Err(PrivacyError::config(format!(
                "max_grad_norm must be finite and positive, got {max_grad_norm}"
            )));
        }
        if batch_size > dataset_size {
            warn!(
                dataset_size,
                batch_size, "batch size exceeds dataset size, sampling rate clamped to 1"
            );
        }
        Ok(Self {
            dataset_size,
            batch_size,
            epochs,
            max_grad_norm,
            noise_scale: 0.0,
        })
    }

    /// Number of private records.
    pub fn dataset_size(&self) -> usize {
        self.dataset_size
    }

    /// Expected batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of training epochs.
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Per-example gradient clipping bound.
    pub fn max_grad_norm(&self) -> f64 {
        self.max_grad_norm
    }

    /// Per-record inclusion probability.
    pub fn sampling_rate(&self) -> f64 {
        (self.batch_size as f64 / self.dataset_size as f64).min(1.0)
    }

    /// Steps per epoch, matching [`PoissonSampler::steps_per_epoch`].
    pub fn steps_per_epoch(&self) -> usize {
        steps_per_epoch(self.dataset_size, self.batch_size)
    }

    /// Total number of noisy steps.
    pub fn total_steps(&self) -> usize {
        self.steps_per_epoch() * self.epochs
    }

    /// `q · dataset_size`, the normalizer of the noisy gradient sum.
    pub fn expected_batch_size(&self) -> f64 {
        self.batch_size.min(self.dataset_size) as f64
    }

    /// Wrap `optimizer` so that each step privatizes its gradient batch.
    ///
    /// `seed` drives the gradient noise stream.
    pub fn prepare_optimizer<O: Optimizer>(&self, optimizer: O, seed: u64) -> DpOptimizer<O> {
        DpOptimizer::new(
            optimizer,
            self.max_grad_norm,
            self.noise_scale,
            self.expected_batch_size(),
            seed,
        )
    }

    /// Wrap `module` so that it yields clipped per-example gradients.
    pub fn prepare_module<M: PerExampleGradients>(&self, module: M) -> GradSampleModule<M> {
        GradSampleModule::new(module, self.max_grad_norm)
    }

    /// Poisson loader matching the accounted sampling rate.
    pub fn data_loader(&self, seed: u64) -> Result<PoissonSampler> {
        PoissonSampler::new(self.dataset_size, self.batch_size, seed)
    }
}

/// Per-step RDP repeated `steps` times; zero steps cost nothing.
pub(crate) fn repeated_rdp(
    orders: &[f64],
    steps: usize,
    per_step: impl Fn(f64) -> f64,
) -> Vec<f64> {
    if steps == 0 {
        return vec![0.0; orders.len()];
    }
    orders
        .iter()
        .map(|&alpha| per_step(alpha) * steps as f64)
        .collect()
}

impl NoisyMechanism for NoisySgd {
    fn name(&self) -> &str {
        "noisy-sgd"
    }

    fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    fn set_noise_scale(&mut self, noise_scale: f64) {
        self.noise_scale = clamp_noise_scale(noise_scale);
    }

    fn rdp(&self, orders: &[f64]) -> Vec<f64> {
        let q = self.sampling_rate();
        repeated_rdp(orders, self.total_steps(), |alpha| {
            subsampled_gaussian_rdp(alpha, self.noise_scale, q)
        })
    }
}
