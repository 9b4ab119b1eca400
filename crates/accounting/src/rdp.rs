//! Rényi Differential Privacy curves and conversion to (ε, δ)-DP.

use serde::{Deserialize, Serialize};
use statrs::function::factorial::ln_binomial;

use gnn_privacy_core::{PrivacyError, Result};

/// Orders closer to 1 than this are skipped by the (ε, δ) conversion.
const MIN_ORDER_GAP: f64 = 1e-9;

/// Default Rényi orders.
///
/// - `1.25, 1.5, 1.75`
/// - `2.0 ..= 8.0` in steps of `0.5`
/// - integers `9 ..= 64`
/// - `72, 80, 96, 112, 128, 160, 192, 256, 384, 512, 768, 1024`
pub fn default_orders() -> Vec<f64> {
    let mut orders = vec![1.25, 1.5, 1.75];
    orders.extend((4..=16).map(|i| i as f64 * 0.5));
    orders.extend((9..=64).map(|a| a as f64));
    orders.extend(
        [72, 80, 96, 112, 128, 160, 192, 256, 384, 512, 768, 1024]
            .iter()
            .map(|&a| a as f64),
    );
    orders
}

/// Keep finite orders above 1, sorted and deduplicated.
///
/// Falls back to [`default_orders`] when nothing usable remains.
pub fn sanitize_orders(orders: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = orders
        .iter()
        .copied()
        .filter(|&a| a.is_finite() && a > 1.0)
        .collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

    if out.is_empty() {
        return default_orders();
    }
    out
}

/// Map NaN to `+∞` and clamp tiny negative round-off to zero.
pub(crate) fn sanitize_rdp(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value.max(0.0)
    }
}

/// A privacy-loss curve: one Rényi divergence bound per order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RdpCurve {
    orders: Vec<f64>,
    values: Vec<f64>,
}

impl RdpCurve {
    /// Build a curve from matching orders and values.
    pub fn new(orders: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if orders.len() != values.len() {
            return Err(PrivacyError::config(format!(
                "{} orders but {} rdp values",
                orders.len(),
                values.len()
            )));
        }
        if let Some(&a) = orders.iter().find(|a| !(a.is_finite() && **a > 1.0)) {
            return Err(PrivacyError::config(format!(
                "rdp orders must be finite and > 1, got {a}"
            )));
        }
        let values = values.into_iter().map(sanitize_rdp).collect();
        Ok(Self { orders, values })
    }

    /// The all-zero curve of a mechanism that releases nothing.
    pub fn zeros(orders: Vec<f64>) -> Self {
        let values = vec![0.0; orders.len()];
        Self { orders, values }
    }

    /// Rényi orders.
    pub fn orders(&self) -> &[f64] {
        &self.orders
    }

    /// RDP value per order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Pointwise sum with `other`, which must share the same orders.
    pub fn compose(&self, other: &RdpCurve) -> Result<RdpCurve> {
        if self.orders != other.orders {
            return Err(PrivacyError::config(
                "cannot compose rdp curves over different orders",
            ));
        }
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a + b)
            .collect();
        Ok(Self {
            orders: self.orders.clone(),
            values,
        })
    }

    /// Curve of `count` sequential repetitions.
    pub fn scale(&self, count: f64) -> RdpCurve {
        let values = self
            .values
            .iter()
            .map(|&v| scale_rdp(v, count))
            .collect();
        Self {
            orders: self.orders.clone(),
            values,
        }
    }

    /// Tightest ε over the curve's orders at the given δ.
    pub fn epsilon(&self, delta: f64) -> f64 {
        rdp_to_epsilon(&self.orders, &self.values, delta)
    }

    /// Order at which the (ε, δ) conversion is tightest, if any.
    pub fn optimal_order(&self, delta: f64) -> Option<f64> {
        self.orders
            .iter()
            .zip(&self.values)
            .filter_map(|(&a, &v)| epsilon_at_order(a, v, delta).map(|e| (a, e)))
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .map(|(a, _)| a)
    }
}

/// `count · value`, treating a zero count as contributing nothing.
pub(crate) fn scale_rdp(value: f64, count: f64) -> f64 {
    if count == 0.0 {
        0.0
    } else {
        sanitize_rdp(value * count)
    }
}

/// Candidate ε at a single order, or `None` if the order must be skipped.
///
/// `ε(α) = rdp + ln(1/δ)/(α − 1) + ln(1 − 1/α)`.
pub fn epsilon_at_order(alpha: f64, rdp: f64, delta: f64) -> Option<f64> {
    if !alpha.is_finite() || alpha - 1.0 <= MIN_ORDER_GAP || !rdp.is_finite() {
        return None;
    }
    if !delta.is_finite() || delta <= 0.0 || delta > 1.0 {
        return None;
    }
    let eps = rdp + (-delta.ln()) / (alpha - 1.0) + (-1.0 / alpha).ln_1p();
    eps.is_finite().then_some(eps)
}

/// Convert an RDP curve to (ε, δ)-DP by minimizing over orders.
///
/// Returns `+∞` when δ is outside `(0, 1]` or no order yields a finite
/// candidate. The result is never negative.
pub fn rdp_to_epsilon(orders: &[f64], rdp: &[f64], delta: f64) -> f64 {
    orders
        .iter()
        .zip(rdp)
        .filter_map(|(&a, &v)| epsilon_at_order(a, v, delta))
        .fold(f64::INFINITY, f64::min)
        .max(0.0)
}

/// RDP of the Gaussian mechanism with noise multiplier `sigma`.
pub fn gaussian_rdp(alpha: f64, sigma: f64) -> f64 {
    if !sigma.is_finite() || sigma <= 0.0 {
        return f64::INFINITY;
    }
    alpha / (2.0 * sigma * sigma)
}

/// RDP of the Poisson-subsampled Gaussian mechanism.
///
/// Integer orders use the exact binomial expansion of `A_α`. Fractional
/// orders are bounded by the next integer order, which is valid because RDP
/// is non-decreasing in α. The result never exceeds the unsampled Gaussian.
pub fn subsampled_gaussian_rdp(alpha: f64, sigma: f64, q: f64) -> f64 {
    if !alpha.is_finite() || alpha <= 1.0 {
        return 0.0;
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return f64::INFINITY;
    }
    if q <= 0.0 {
        return 0.0;
    }
    let full = gaussian_rdp(alpha, sigma);
    if q >= 1.0 {
        return full;
    }

    let order = if is_integer(alpha) {
        alpha.round()
    } else {
        alpha.ceil()
    };
    let log_a = log_a_integer(q, sigma, order as u64);
    sanitize_rdp(log_a / (order - 1.0)).min(full)
}

fn is_integer(x: f64) -> bool {
    (x - x.round()).abs() < 1e-12
}

/// `ln A_α` for integer α:
/// `Σ_j C(α, j) q^j (1 − q)^{α−j} exp(j(j − 1) / (2σ²))`.
fn log_a_integer(q: f64, sigma: f64, alpha: u64) -> f64 {
    let log_q = q.ln();
    let log_1mq = (-q).ln_1p();
    let two_sigma_sq = 2.0 * sigma * sigma;
    let alpha_f = alpha as f64;

    let mut log_sum = f64::NEG_INFINITY;
    for j in 0..=alpha {
        let j_f = j as f64;
        let log_term = ln_binomial(alpha, j)
            + j_f * log_q
            + (alpha_f - j_f) * log_1mq
            + j_f * (j_f - 1.0) / two_sigma_sq;
        log_sum = log_add_exp(log_sum, log_term);
    }
    log_sum
}

/// RDP of a Gaussian whose sensitivity is itself random.
///
/// `weights` lists `(probability, rho)` pairs, where `rho` is the sensitivity
/// (in units of the clipping norm) realised with that probability. Joint
/// convexity of `exp((α − 1) D_α)` gives
/// `ε(α) = ln E[exp(α(α − 1) ρ² / (2σ²))] / (α − 1)`.
pub fn mixture_gaussian_rdp(alpha: f64, sigma: f64, weights: &[(f64, f64)]) -> f64 {
    let log_weights: Vec<(f64, f64)> = weights
        .iter()
        .filter(|&&(p, _)| p > 0.0)
        .map(|&(p, rho)| (p.ln(), rho))
        .collect();
    log_mixture_gaussian_rdp(alpha, sigma, &log_weights)
}

/// [`mixture_gaussian_rdp`] with log-probabilities.
///
/// Tail terms whose probability underflows `f64` still contribute, which
/// matters when `α(α − 1) ρ² / (2σ²)` is large.
pub fn log_mixture_gaussian_rdp(alpha: f64, sigma: f64, log_weights: &[(f64, f64)]) -> f64 {
    if !alpha.is_finite() || alpha <= 1.0 {
        return 0.0;
    }
    let support = log_weights
        .iter()
        .copied()
        .filter(|&(log_p, _)| log_p > f64::NEG_INFINITY && !log_p.is_nan());
    if support.clone().all(|(_, rho)| rho == 0.0) {
        return 0.0;
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return f64::INFINITY;
    }

    let coeff = alpha * (alpha - 1.0) / (2.0 * sigma * sigma);
    let log_sum = support
        .map(|(log_p, rho)| log_p + coeff * rho * rho)
        .fold(f64::NEG_INFINITY, log_add_exp);
    sanitize_rdp(log_sum / (alpha - 1.0))
}

/// Numerically stable `ln(exp(a) + exp(b))`.
pub(crate) fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::INFINITY || b == f64::INFINITY {
        return f64::INFINITY;
    }
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}
