//! Batch sampling for DP-SGD.
//!
//! The subsampled-Gaussian bound used for DP-SGD accounting assumes every
//! record enters a batch independently with probability `q`. Batches drawn
//! by [`PoissonSampler`] satisfy this; shuffle-and-slice batches do not and
//! must not be used on the private training path.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use crate::error::{PrivacyError, Result};

/// Batch of dataset indices.
pub type BatchIndices = Vec<usize>;

/// Sample indices using Poisson sampling.
///
/// Each index is included independently with probability `q`.
pub fn poisson_sample<R: Rng + ?Sized>(n: usize, q: f64, rng: &mut R) -> BatchIndices {
    if n == 0 || !q.is_finite() || q <= 0.0 {
        return Vec::new();
    }

    let q = q.min(1.0);
    let mut indices = Vec::new();
    for i in 0..n {
        if rng.gen_bool(q) {
            indices.push(i);
        }
    }
    indices
}

/// Sample a fixed number of indices without replacement.
///
/// Only for non-private evaluation loaders.
pub fn fixed_sample<R: Rng + ?Sized>(n: usize, batch_size: usize, rng: &mut R) -> BatchIndices {
    if n == 0 || batch_size == 0 {
        return Vec::new();
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(batch_size.min(n));
    indices
}

/// Restartable Poisson minibatch sampler over a fixed-size dataset.
#[derive(Clone, Debug)]
pub struct PoissonSampler {
    dataset_size: usize,
    batch_size: usize,
    seed: u64,
    rng: ChaCha8Rng,
}

impl PoissonSampler {
    /// Create a sampler with expected batch size `batch_size`.
    pub fn new(dataset_size: usize, batch_size: usize, seed: u64) -> Result<Self> {
        if dataset_size == 0 {
            return Err(PrivacyError::config("dataset_size must be positive"));
        }
        if batch_size == 0 {
            return Err(PrivacyError::config(
                "batch_size must be positive for Poisson sampling",
            ));
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
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Number of records in the dataset.
    pub fn dataset_size(&self) -> usize {
        self.dataset_size
    }

    /// Expected batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Per-record inclusion probability `min(1, batch_size / dataset_size)`.
    pub fn sampling_rate(&self) -> f64 {
        (self.batch_size as f64 / self.dataset_size as f64).min(1.0)
    }

    /// Number of batches making up one epoch, `ceil(dataset_size / batch_size)`.
    pub fn steps_per_epoch(&self) -> usize {
        steps_per_epoch(self.dataset_size, self.batch_size)
    }

    /// Draw a fresh batch.
    pub fn next_batch(&mut self) -> BatchIndices {
        poisson_sample(self.dataset_size, self.sampling_rate(), &mut self.rng)
    }

    /// Lazily draw the batches of one epoch.
    pub fn epoch(&mut self) -> Epoch<'_> {
        let remaining = self.steps_per_epoch();
        Epoch {
            sampler: self,
            remaining,
        }
    }

    /// Rewind to the initial seed, replaying the same batch sequence.
    pub fn restart(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
    }
}

/// Iterator over the batches of one epoch.
#[derive(Debug)]
pub struct Epoch<'a> {
    sampler: &'a mut PoissonSampler,
    remaining: usize,
}

impl Iterator for Epoch<'_> {
    type Item = BatchIndices;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.sampler.next_batch())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// `ceil(dataset_size / batch_size)`, or zero when either is zero.
pub fn steps_per_epoch(dataset_size: usize, batch_size: usize) -> usize {
    if dataset_size == 0 || batch_size == 0 {
        return 0;
    }
    (dataset_size + batch_size - 1) / batch_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisson_sample_probability() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let n = 10_000;
        let q = 0.1;
        let samples = poisson_sample(n, q, &mut rng);
        let ratio = samples.len() as f64 / n as f64;
        assert!((ratio - q).abs() < 0.02);
    }

    #[test]
    fn test_fixed_sample_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let samples = fixed_sample(100, 10, &mut rng);
        assert_eq!(samples.len(), 10);
    }

    #[test]
    fn rejects_empty_configuration() {
        assert!(PoissonSampler::new(0, 10, 0).is_err());
        assert!(PoissonSampler::new(10, 0, 0).is_err());
    }

    #[test]
    fn mean_batch_size_and_inclusion_frequency_converge() {
        let mut sampler = PoissonSampler::new(1000, 100, 7).expect("sampler");
        let draws = 2000;
        let mut counts = vec![0usize; 1000];
        let mut total = 0usize;
        for _ in 0..draws {
            let batch = sampler.next_batch();
            total += batch.len();
            for i in batch {
                counts[i] += 1;
            }
        }

        let mean = total as f64 / draws as f64;
        assert!((mean - 100.0).abs() < 1.5, "mean batch size {mean}");

        let q = sampler.sampling_rate();
        let mean_freq =
            counts.iter().map(|&c| c as f64 / draws as f64).sum::<f64>() / counts.len() as f64;
        assert!((mean_freq - q).abs() < 0.002);
        for &c in &counts {
            let freq = c as f64 / draws as f64;
            assert!((freq - q).abs() < 0.06, "inclusion frequency {freq}");
        }
    }

    #[test]
    fn batch_sizes_vary() {
        let mut sampler = PoissonSampler::new(1000, 100, 1).expect("sampler");
        let sizes: Vec<usize> = sampler.epoch().map(|b| b.len()).collect();
        assert_eq!(sizes.len(), 10);
        assert!(sizes.iter().any(|&s| s != sizes[0]));
    }

    #[test]
    fn restart_replays_and_epochs_are_fresh() {
        let mut sampler = PoissonSampler::new(200, 20, 5).expect("sampler");
        let first: Vec<_> = sampler.epoch().collect();
        let second: Vec<_> = sampler.epoch().collect();
        assert_ne!(first, second);

        sampler.restart();
        let replay: Vec<_> = sampler.epoch().collect();
        assert_eq!(first, replay);
    }

    #[test]
    fn steps_per_epoch_rounds_up() {
        assert_eq!(steps_per_epoch(2560, 256), 10);
        assert_eq!(steps_per_epoch(2561, 256), 11);
        assert_eq!(steps_per_epoch(10, 0), 0);
        let sampler = PoissonSampler::new(10, 50, 0).expect("sampler");
        assert_eq!(sampler.sampling_rate(), 1.0);
        assert_eq!(sampler.steps_per_epoch(), 1);
    }
}
