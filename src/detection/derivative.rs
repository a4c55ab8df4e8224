// Rate-of-change between consecutive raw readings
//
// The derivative criterion bypasses smoothing and CUSUM entirely: a record is
// flagged when its steepest single-step drop reaches the threshold.

use crate::detection::minimum::{locate_minimum, MinimumPoint};
use crate::error::{FlattenError, Result};

/// First differences `r[i] - r[i-1]`, one shorter than the input
pub fn derivative(readings: &[f64]) -> Vec<f64> {
    readings.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Steepest drop and the reading index it lands on
///
/// The index refers to the later reading of the pair, so it lines up with the
/// input readings. A single reading has no drop: `(0, 0.0)`.
pub fn derivative_minimum(readings: &[f64]) -> Result<MinimumPoint> {
    match readings.len() {
        0 => Err(FlattenError::EmptySeries),
        1 => Ok(MinimumPoint {
            index: 0,
            value: 0.0,
        }),
        _ => {
            let min = locate_minimum(&derivative(readings))?;
            Ok(MinimumPoint {
                index: min.index + 1,
                value: min.value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivative_values() {
        assert_eq!(derivative(&[1.0, 4.0, 2.0]), vec![3.0, -2.0]);
        assert!(derivative(&[1.0]).is_empty());
    }

    #[test]
    fn test_minimum_index_is_shifted() {
        let min = derivative_minimum(&[10.0, 9.0, 5.0, 4.0, 8.0]).unwrap();
        assert_eq!(min.index, 2);
        assert_eq!(min.value, -4.0);
    }

    #[test]
    fn test_first_steepest_drop_wins() {
        let min = derivative_minimum(&[10.0, 7.0, 7.0, 4.0]).unwrap();
        assert_eq!(min.index, 1);
    }

    #[test]
    fn test_single_reading() {
        let min = derivative_minimum(&[3.0]).unwrap();
        assert_eq!((min.index, min.value), (0, 0.0));
    }

    #[test]
    fn test_empty() {
        assert_eq!(
            derivative_minimum(&[]).unwrap_err(),
            FlattenError::EmptySeries
        );
    }
}
