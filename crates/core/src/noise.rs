//! Gaussian noise draws shared by the mechanisms.
//!
//! A degenerate standard deviation (zero, negative, NaN or infinite) adds
//! nothing, so uncalibrated mechanisms behave as their noiseless versions.

use ndarray::{Array, Dimension};
use rand::Rng;
use rand_distr::{Distribution, Normal};

fn normal(sigma: f64) -> Option<Normal<f64>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return None;
    }
    Normal::new(0.0, sigma).ok()
}

/// Add i.i.d. `N(0, sigma²)` noise to every finite entry of `array`.
pub fn add_gaussian_noise<R: Rng + ?Sized, D: Dimension>(
    array: &mut Array<f64, D>,
    sigma: f64,
    rng: &mut R,
) {
    let Some(dist) = normal(sigma) else {
        return;
    };
    for x in array.iter_mut().filter(|x| x.is_finite()) {
        *x += dist.sample(rng);
    }
}

/// One draw from `N(0, sigma²)`, or zero for a degenerate `sigma`.
pub fn gaussian_sample<R: Rng + ?Sized>(sigma: f64, rng: &mut R) -> f64 {
    normal(sigma).map_or(0.0, |dist| dist.sample(rng))
}
