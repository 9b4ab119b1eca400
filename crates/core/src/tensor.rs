//! Tensor types and low-level operations.

use ndarray::{Array2, ArrayD, Axis};

/// Dynamic-dimensional tensor, used for gradients.
pub type Tensor = ArrayD<f64>;

/// Node feature matrix with one row per node.
pub type Matrix = Array2<f64>;

/// Floor applied to row norms before dividing.
pub const NORM_EPS: f64 = 1e-12;

/// Compute L2 norm of a tensor, handling NaN/inf.
pub fn l2_norm(t: &Tensor) -> f64 {
    let mut sum_sq: f64 = 0.0;
    for &v in t.iter() {
        if v.is_nan() {
            return f64::NAN;
        }
        if !v.is_finite() {
            return f64::INFINITY;
        }
        sum_sq += v * v;
    }
    sum_sq.sqrt()
}

/// Replace NaN and infinite values with zero in-place.
pub fn sanitize(t: &mut Tensor) {
    t.mapv_inplace(|x| if x.is_finite() { x } else { 0.0 });
}

/// Scale every row of `x` to unit L2 norm.
///
/// Rows with norm below [`NORM_EPS`] are divided by the floor instead, so an
/// all-zero row stays zero.
pub fn normalize_rows(x: &mut Matrix) {
    for mut row in x.axis_iter_mut(Axis(0)) {
        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        let denom = norm.max(NORM_EPS);
        row.mapv_inplace(|v| v / denom);
    }
}
