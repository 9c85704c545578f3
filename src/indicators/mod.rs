// Technical indicators module
// Series transforms for Bollinger Bands, moving-average slopes and EMA crossovers.
// Every output has the input's length; values that lack history are NaN
// unless the function documents a fill value.

pub mod bollinger;
pub mod moving_average;
pub mod slope;

pub use bollinger::{bollinger, BollingerBands};
pub use moving_average::{ema, rolling_mean};
pub use slope::{ema_slope, normalized_slope, pct_change, percentage_slope};

/// Most recent value of a series, if it is defined
pub fn latest(series: &[f64]) -> Option<f64> {
    series.last().copied().filter(|v| v.is_finite())
}

/// Replace undefined values with `fill`
pub(crate) fn fill_undefined(series: Vec<f64>, fill: f64) -> Vec<f64> {
    series
        .into_iter()
        .map(|v| if v.is_finite() { v } else { fill })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_skips_undefined() {
        assert_eq!(latest(&[1.0, 2.0]), Some(2.0));
        assert_eq!(latest(&[1.0, f64::NAN]), None);
        assert_eq!(latest(&[]), None);
    }

    #[test]
    fn test_fill_undefined() {
        let filled = fill_undefined(vec![f64::NAN, 1.5, f64::INFINITY], 0.0);
        assert_eq!(filled, vec![0.0, 1.5, 0.0]);
    }
}
