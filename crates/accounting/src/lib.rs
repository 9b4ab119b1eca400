//! Rényi-DP accounting and noise calibration for private graph learning.
//!
//! Every randomized component implements [`NoisyMechanism`]: it owns one noise
//! scale and reports its RDP curve for that scale. Curves compose additively
//! ([`ComposedNoisyMechanism`]), convert to (ε, δ) over a grid of orders, and
//! the [`Calibrator`] inverts that conversion to find the smallest noise scale
//! meeting a target budget.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calibrate;
pub mod composed;
pub mod mechanism;
pub mod rdp;

pub use calibrate::{CalibrationRecord, Calibrator};
pub use composed::ComposedNoisyMechanism;
pub use mechanism::{clamp_noise_scale, NoisyMechanism};
pub use rdp::{
    default_orders, epsilon_at_order, gaussian_rdp, log_mixture_gaussian_rdp, mixture_gaussian_rdp,
    rdp_to_epsilon, sanitize_orders, subsampled_gaussian_rdp, RdpCurve,
};

/// Common imports for privacy accounting.
pub mod prelude {
    pub use crate::{
        default_orders, rdp_to_epsilon, CalibrationRecord, Calibrator, ComposedNoisyMechanism,
        NoisyMechanism, RdpCurve,
    };
}
