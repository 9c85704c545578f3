use super::fill_undefined;
use super::moving_average::{ema, rolling_mean};

/// One-step percentage change: `(x[t] - x[t-1]) / x[t-1] * 100`.
///
/// Index 0 and any step touching an undefined value are NaN.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for t in 1..values.len() {
        let change = (values[t] - values[t - 1]) / values[t - 1] * 100.0;
        if change.is_finite() {
            out[t] = change;
        }
    }
    out
}

/// Slope of the `window`-period moving average rescaled into [-1, 1].
///
/// Raw slope is `(MA[t] - MA[t-window]) / MA[t-1] * 100`. Each raw value is
/// min-max normalized against the defined raw slopes in the trailing
/// `window` observations (partial windows allowed); a zero range uses a
/// denominator of 1. Undefined points are filled with 0.
///
/// A point with no variation in its trailing window normalizes to -1, so a
/// flat market reads as a falling slope rather than a neutral one.
pub fn normalized_slope(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return vec![0.0; values.len()];
    }

    let ma = rolling_mean(values, window);
    let mut raw = vec![f64::NAN; values.len()];
    for t in window..values.len() {
        let slope = (ma[t] - ma[t - window]) / ma[t - 1] * 100.0;
        if slope.is_finite() {
            raw[t] = slope;
        }
    }

    let mut normalized = vec![f64::NAN; values.len()];
    for t in 0..values.len() {
        if !raw[t].is_finite() {
            continue;
        }

        let start = (t + 1).saturating_sub(window);
        let (min, max) = raw[start..=t]
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        let range = max - min;
        let denom = if range == 0.0 { 1.0 } else { range };
        normalized[t] = 2.0 * (raw[t] - min) / denom - 1.0;
    }

    fill_undefined(normalized, 0.0)
}

/// One-step percentage change of the `window`-period moving average.
/// Undefined points are filled with 0.
pub fn percentage_slope(values: &[f64], window: usize) -> Vec<f64> {
    fill_undefined(pct_change(&rolling_mean(values, window)), 0.0)
}

/// One-step percentage change of the EMA. Index 0 is filled with 0.
pub fn ema_slope(values: &[f64], span: usize) -> Vec<f64> {
    fill_undefined(pct_change(&ema(values, span)), 0.0)
}
