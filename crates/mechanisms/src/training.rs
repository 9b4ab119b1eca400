//! DP-SGD hooks for an external training loop.
//!
//! The loop owns the model and the update rule. These wrappers only see
//! per-example gradients: [`GradSampleModule`] bounds each one, and
//! [`DpOptimizer`] turns a batch of them into the noisy averaged gradient the
//! accountant assumes.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use gnn_privacy_core::{
    add_gaussian_noise, clip_and_sum, clip_tensor, ClipReport, PrivacyError, Result, Tensor,
};

/// Gradient-consuming update rule.
pub trait Optimizer {
    /// Shape of the gradient consumed by [`Optimizer::step`].
    fn gradient_shape(&self) -> Vec<usize>;

    /// Apply one update with the given gradient.
    fn step(&mut self, gradient: &Tensor) -> Result<()>;
}

/// Model able to report one gradient per example of a batch.
pub trait PerExampleGradients {
    /// Gradients for the examples at `batch`, in batch order.
    fn per_example_gradients(&mut self, batch: &[usize]) -> Result<Vec<Tensor>>;
}

impl<O: Optimizer + ?Sized> Optimizer for &mut O {
    fn gradient_shape(&self) -> Vec<usize> {
        (**self).gradient_shape()
    }

    fn step(&mut self, gradient: &Tensor) -> Result<()> {
        (**self).step(gradient)
    }
}

impl<M: PerExampleGradients + ?Sized> PerExampleGradients for &mut M {
    fn per_example_gradients(&mut self, batch: &[usize]) -> Result<Vec<Tensor>> {
        (**self).per_example_gradients(batch)
    }
}

/// Module wrapper yielding per-example gradients clipped to `max_grad_norm`.
#[derive(Clone, Debug)]
pub struct GradSampleModule<M> {
    module: M,
    max_grad_norm: f64,
    last_reports: Vec<ClipReport>,
}

impl<M: PerExampleGradients> GradSampleModule<M> {
    pub(crate) fn new(module: M, max_grad_norm: f64) -> Self {
        Self {
            module,
            max_grad_norm,
            last_reports: Vec::new(),
        }
    }

    /// Clipping bound applied to every per-example gradient.
    pub fn max_grad_norm(&self) -> f64 {
        self.max_grad_norm
    }

    /// Clip reports of the most recent batch.
    pub fn last_reports(&self) -> &[ClipReport] {
        &self.last_reports
    }

    /// Fraction of the most recent batch that was clipped.
    pub fn clipped_fraction(&self) -> f64 {
        if self.last_reports.is_empty() {
            return 0.0;
        }
        let clipped = self.last_reports.iter().filter(|r| r.clipped).count();
        clipped as f64 / self.last_reports.len() as f64
    }

    /// Wrapped module.
    pub fn inner(&self) -> &M {
        &self.module
    }

    /// Mutable access to the wrapped module.
    pub fn inner_mut(&mut self) -> &mut M {
        &mut self.module
    }

    /// Unwrap the module.
    pub fn into_inner(self) -> M {
        self.module
    }
}

impl<M: PerExampleGradients> PerExampleGradients for GradSampleModule<M> {
    fn per_example_gradients(&mut self, batch: &[usize]) -> Result<Vec<Tensor>> {
        let mut grads = self.module.per_example_gradients(batch)?;
        if grads.len() != batch.len() {
            return Err(PrivacyError::config(format!(
                "module returned {} gradients for a batch of {}",
                grads.len(),
                batch.len()
            )));
        }
        self.last_reports = grads
            .iter_mut()
            .map(|g| clip_tensor(g, self.max_grad_norm))
            .collect();
        Ok(grads)
    }
}

/// Optimizer wrapper performing the private gradient aggregation.
///
/// On each step: clip every per-example gradient to `max_grad_norm`, sum,
/// add `N(0, (noise_scale · max_grad_norm)²)` per coordinate, divide by the
/// expected batch size and hand the result to the wrapped optimizer. Empty
/// batches still produce a noise-only update. With a zero noise scale the
/// wrapper is non-private: it averages the raw gradients of the realised
/// batch and skips empty batches.
#[derive(Clone, Debug)]
pub struct DpOptimizer<O> {
    optimizer: O,
    max_grad_norm: f64,
    noise_scale: f64,
    expected_batch_size: f64,
    rng: ChaCha8Rng,
    steps: usize,
}

impl<O: Optimizer> DpOptimizer<O> {
    pub(crate) fn new(
        optimizer: O,
        max_grad_norm: f64,
        noise_scale: f64,
        expected_batch_size: f64,
        seed: u64,
    ) -> Self {
        Self {
            optimizer,
            max_grad_norm,
            noise_scale,
            expected_batch_size,
            rng: ChaCha8Rng::seed_from_u64(seed),
            steps: 0,
        }
    }

    /// Whether steps add noise.
    pub fn is_private(&self) -> bool {
        self.noise_scale > 0.0
    }

    /// Standard deviation of the noise added to the gradient sum.
    pub fn noise_std(&self) -> f64 {
        self.noise_scale * self.max_grad_norm
    }

    /// Normalizer applied to the noisy sum.
    pub fn expected_batch_size(&self) -> f64 {
        self.expected_batch_size
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Wrapped optimizer.
    pub fn inner(&self) -> &O {
        &self.optimizer
    }

    /// Unwrap the optimizer.
    pub fn into_inner(self) -> O {
        self.optimizer
    }

    /// Aggregate `per_example` gradients and apply one update.
    ///
    /// Returns the gradient handed to the wrapped optimizer, or `None` when
    /// a non-private step had nothing to average.
    pub fn step(&mut self, per_example: &[Tensor]) -> Result<Option<Tensor>> {
        let shape = self.optimizer.gradient_shape();
        if let Some(grad) = per_example.iter().find(|g| g.shape() != shape.as_slice()) {
            return Err(PrivacyError::config(format!(
                "per-example gradient has shape {:?}, optimizer expects {:?}",
                grad.shape(),
                shape
            )));
        }

        let gradient = if self.is_private() {
            let mut total = match per_example {
                [] => Tensor::zeros(shape),
                _ => clip_and_sum(per_example, self.max_grad_norm)?.0,
            };
            add_gaussian_noise(&mut total, self.noise_std(), &mut self.rng);
            total / self.expected_batch_size
        } else {
            if per_example.is_empty() {
                return Ok(None);
            }
            let mut total = Tensor::zeros(shape);
            for grad in per_example {
                total += grad;
            }
            total / per_example.len() as f64
        };

        self.optimizer.step(&gradient)?;
        self.steps += 1;
        trace!(step = self.steps, batch = per_example.len(), "applied gradient update");
        Ok(Some(gradient))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Plain SGD on a flat parameter vector.
    #[derive(Clone, Debug)]
    pub struct Sgd {
        pub params: Tensor,
        pub lr: f64,
    }

    impl Optimizer for Sgd {
        fn gradient_shape(&self) -> Vec<usize> {
            self.params.shape().to_vec()
        }

        fn step(&mut self, gradient: &Tensor) -> Result<()> {
            self.params.scaled_add(-self.lr, gradient);
            Ok(())
        }
    }

    /// Per-example gradient `index · direction`.
    #[derive(Clone, Debug)]
    pub struct ScaledDirection {
        pub direction: Tensor,
    }

    impl PerExampleGradients for ScaledDirection {
        fn per_example_gradients(&mut self, batch: &[usize]) -> Result<Vec<Tensor>> {
            Ok(batch.iter().map(|&i| &self.direction * i as f64).collect())
        }
    }
}
