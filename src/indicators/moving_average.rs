/// Trailing simple moving average.
///
/// `out[i]` is the mean of `values[i + 1 - window..=i]`; the first
/// `window - 1` points are NaN, as is any window that contains a NaN.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        out[i] = slice.iter().sum::<f64>() / window as f64;
    }

    out
}

/// Exponential Moving Average with smoothing factor `2 / (span + 1)`.
///
/// Seeded by the first observation: `EMA[0] = x[0]`,
/// `EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1]`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev = first;
    out.push(prev);

    for &price in &values[1..] {
        prev = alpha * price + (1.0 - alpha) * prev;
        out.push(prev);
    }

    out
}
