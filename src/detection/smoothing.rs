// Centered moving average with boundary truncation
//
// Near the ends the window shrinks instead of zero-padding, so edge values are
// not pulled toward zero. The price is an asymmetric window on the first and
// last ⌊w/2⌋ points.

use crate::error::{FlattenError, Result};

/// Default smoothing window width
pub const DEFAULT_WINDOW: usize = 5;

/// Smooth a series with a centered window of odd width `window`
///
/// For index `i` the average covers `[max(0, i - w/2), min(n, i + w/2 + 1))`.
/// A window of 1 returns the input unchanged.
///
/// # Example
/// ```
/// use pcr_flatten::detection::smooth;
///
/// let smoothed = smooth(&[3.0, 6.0, 9.0], 3).unwrap();
/// assert_eq!(smoothed, vec![4.5, 6.0, 7.5]);
/// ```
pub fn smooth(values: &[f64], window: usize) -> Result<Vec<f64>> {
    if window == 0 || window % 2 == 0 {
        return Err(FlattenError::parameter(format!(
            "smoothing window must be a positive odd integer, got {}",
            window
        )));
    }

    let n = values.len();
    let half = window / 2;

    // Prefix sums keep this O(n) regardless of window width
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    let smoothed = (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);
            (prefix[end] - prefix[start]) / (end - start) as f64
        })
        .collect();

    Ok(smoothed)
}
