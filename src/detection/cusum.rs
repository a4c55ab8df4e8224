// One-sided (lower) CUSUM over a smoothed curve
//
//   cusum[0] = min(0, k)                          (no predecessor, diff = 0)
//   cusum[i] = min(0, cusum[i-1] + diff[i] + k)   diff[i] = s[i] - s[i-1]
//
// `k` is the per-step tolerance: a drop no larger than `k` is absorbed before
// it reaches the accumulator. The statistic never rises above zero.

use crate::error::{FlattenError, Result};
use crate::series::ensure_finite;

/// Compute the lower CUSUM of `smoothed` with tolerance `k`
///
/// # Errors
/// - `InvalidParameter` if `k` is negative or not finite
/// - `InvalidInput` if any value is NaN or infinite
///
/// # Example
/// ```
/// use pcr_flatten::detection::cusum;
///
/// let stat = cusum(&[100.0, 90.0, 85.0, 95.0], 0.0).unwrap();
/// assert_eq!(stat, vec![0.0, -10.0, -15.0, -5.0]);
/// ```
pub fn cusum(smoothed: &[f64], k: f64) -> Result<Vec<f64>> {
    if !k.is_finite() || k < 0.0 {
        return Err(FlattenError::parameter(format!(
            "CUSUM tolerance k must be finite and >= 0, got {}",
            k
        )));
    }
    ensure_finite(smoothed, "smoothed value")?;

    let mut out = Vec::with_capacity(smoothed.len());
    let mut acc = 0.0_f64;
    let mut prev: Option<f64> = None;

    for &value in smoothed {
        let diff = prev.map_or(0.0, |p| value - p);
        acc = (acc + diff + k).min(0.0);
        out.push(acc);
        prev = Some(value);
    }

    Ok(out)
}
