//! The capability shared by every randomized mechanism.

use gnn_privacy_core::Result;

use crate::calibrate::Calibrator;
use crate::rdp::{default_orders, rdp_to_epsilon, sanitize_orders, RdpCurve};

/// A randomized mechanism whose privacy loss is governed by one noise scale.
///
/// Implementors own their `noise_scale` exclusively. A scale of zero means the
/// mechanism adds no noise, so its curve is `+∞` unless the mechanism releases
/// nothing at all.
///
/// For fixed shape parameters, [`NoisyMechanism::epsilon`] must be
/// non-increasing in the noise scale; [`Calibrator`] relies on this.
pub trait NoisyMechanism {
    /// Short human-readable name used in logs and calibration records.
    fn name(&self) -> &str;

    /// Current noise multiplier (standard deviation in units of sensitivity).
    fn noise_scale(&self) -> f64;

    /// Replace the noise multiplier. Negative or NaN values are treated as zero.
    fn set_noise_scale(&mut self, noise_scale: f64);

    /// RDP value at each order. Pure and deterministic.
    fn rdp(&self, orders: &[f64]) -> Vec<f64>;

    /// RDP curve over sanitized `orders`.
    ///
    /// Fails when the mechanism reports a value count that does not match
    /// the orders.
    fn rdp_curve(&self, orders: &[f64]) -> Result<RdpCurve> {
        let orders = sanitize_orders(orders);
        let values = self.rdp(&orders);
        RdpCurve::new(orders, values)
    }

    /// ε at `delta` over the default order grid.
    fn epsilon(&self, delta: f64) -> f64 {
        self.epsilon_with_orders(delta, &default_orders())
    }

    /// ε at `delta` over a custom order grid.
    fn epsilon_with_orders(&self, delta: f64, orders: &[f64]) -> f64 {
        let orders = sanitize_orders(orders);
        let values = self.rdp(&orders);
        if values.len() != orders.len() {
            return f64::INFINITY;
        }
        rdp_to_epsilon(&orders, &values, delta)
    }

    /// Calibrate the noise scale in place with the default [`Calibrator`].
    fn calibrate(&mut self, epsilon: f64, delta: f64) -> Result<f64>
    where
        Self: Sized,
    {
        Calibrator::default().calibrate(self, epsilon, delta)
    }

    /// Consume and return the mechanism with a new noise scale.
    fn with_noise_scale(mut self, noise_scale: f64) -> Self
    where
        Self: Sized,
    {
        self.set_noise_scale(noise_scale);
        self
    }
}

impl<M: NoisyMechanism + ?Sized> NoisyMechanism for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn noise_scale(&self) -> f64 {
        (**self).noise_scale()
    }

    fn set_noise_scale(&mut self, noise_scale: f64) {
        (**self).set_noise_scale(noise_scale)
    }

    fn rdp(&self, orders: &[f64]) -> Vec<f64> {
        (**self).rdp(orders)
    }
}

/// Normalize a requested noise scale: NaN and negatives become zero.
pub fn clamp_noise_scale(noise_scale: f64) -> f64 {
    if noise_scale.is_nan() || noise_scale < 0.0 {
        0.0
    } else {
        noise_scale
    }
}
