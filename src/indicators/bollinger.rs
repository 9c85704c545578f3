use super::moving_average::rolling_mean;

/// Bollinger Bands over a trailing window.
///
/// - Middle: SMA(close, window)
/// - Upper: middle + k * stddev(close, window)
/// - Lower: middle - k * stddev(close, window)
///
/// Uses the sample standard deviation (divide by n - 1).
/// The first `window - 1` points of each band are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(values: &[f64], window: usize, num_std: f64) -> BollingerBands {
    let middle = rolling_mean(values, window);
    let mut upper = vec![f64::NAN; values.len()];
    let mut lower = vec![f64::NAN; values.len()];

    if window >= 2 && values.len() >= window {
        for i in (window - 1)..values.len() {
            let mean = middle[i];
            let slice = &values[i + 1 - window..=i];
            let variance =
                slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window - 1) as f64;
            let std = variance.sqrt();

            upper[i] = mean + num_std * std;
            lower[i] = mean - num_std * std;
        }
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}
