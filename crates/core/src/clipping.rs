//! Per-example gradient clipping for bounded sensitivity.

use crate::error::{PrivacyError, Result};
use crate::tensor::{l2_norm, sanitize, Tensor};

/// Result of a clipping operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipReport {
    /// Original L2 norm before clipping.
    pub original_norm: f64,
    /// Whether clipping was applied.
    pub clipped: bool,
    /// Scale factor applied (1.0 if not clipped).
    pub scale: f64,
}

/// Clip a tensor to a maximum L2 norm in-place.
///
/// NaN and infinite entries are zeroed first. A tensor whose norm is still not
/// finite, or a non-positive `max_norm`, yields an all-zero tensor.
pub fn clip_tensor(tensor: &mut Tensor, max_norm: f64) -> ClipReport {
    sanitize(tensor);
    let norm = l2_norm(tensor);

    if !max_norm.is_finite() || max_norm <= 0.0 || !norm.is_finite() {
        tensor.fill(0.0);
        return ClipReport {
            original_norm: norm,
            clipped: true,
            scale: 0.0,
        };
    }

    if norm <= max_norm {
        return ClipReport {
            original_norm: norm,
            clipped: false,
            scale: 1.0,
        };
    }

    let scale = max_norm / norm;
    tensor.mapv_inplace(|x| x * scale);
    ClipReport {
        original_norm: norm,
        clipped: true,
        scale,
    }
}

/// Clip every per-example gradient to `max_norm` and sum them.
///
/// Returns the sum together with the per-example norms measured before
/// clipping. All gradients must share one shape.
pub fn clip_and_sum(per_example: &[Tensor], max_norm: f64) -> Result<(Tensor, Vec<f64>)> {
    let first = per_example
        .first()
        .ok_or_else(|| PrivacyError::config("cannot aggregate an empty set of gradients"))?;
    let mut total = Tensor::zeros(first.raw_dim());
    let mut norms = Vec::with_capacity(per_example.len());

    for grad in per_example {
        if grad.raw_dim() != total.raw_dim() {
            return Err(PrivacyError::config(
                "per-example gradients must share one shape",
            ));
        }
        let mut clipped = grad.clone();
        let report = clip_tensor(&mut clipped, max_norm);
        norms.push(report.original_norm);
        total += &clipped;
    }

    Ok((total, norms))
}
