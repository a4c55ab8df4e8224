// Minimum localization with a first-occurrence tie-break
//
// A decline that bottoms out into a plateau produces a run of equal CUSUM
// values. The first index of that run is where the decline ended, so ties
// always resolve to the lowest index.

use crate::error::{FlattenError, Result};
use serde::{Deserialize, Serialize};

/// Position and value of the most negative CUSUM entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimumPoint {
    pub index: usize,
    pub value: f64,
}

/// Find the global minimum of a CUSUM series
///
/// # Example
/// ```
/// use pcr_flatten::detection::locate_minimum;
///
/// let min = locate_minimum(&[-50.0, -80.0, -80.0, -85.0, -85.0]).unwrap();
/// assert_eq!(min.index, 3);
/// assert_eq!(min.value, -85.0);
/// ```
pub fn locate_minimum(values: &[f64]) -> Result<MinimumPoint> {
    let (&first, rest) = values.split_first().ok_or(FlattenError::EmptySeries)?;

    let mut best = MinimumPoint {
        index: 0,
        value: first,
    };

    for (offset, &value) in rest.iter().enumerate() {
        // Strict comparison keeps the earliest index on ties
        if value < best.value {
            best = MinimumPoint {
                index: offset + 1,
                value,
            };
        }
    }

    Ok(best)
}
