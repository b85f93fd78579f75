use crate::config::TrendConfig;

/// Least-squares slope of `percentages` (oldest first) against their index,
/// scaled by `slope_divisor` and clamped to `[-1, 1]`.
///
/// Sequences shorter than two points, degenerate inputs and non-finite
/// values all yield `0.0`.
pub fn estimate_trend(percentages: &[f64], config: &TrendConfig) -> f64 {
    if percentages.len() < 2 || config.slope_divisor <= 0.0 {
        return 0.0;
    }

    let n = percentages.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = percentages.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance_x = 0.0;
    for (index, value) in percentages.iter().enumerate() {
        let dx = index as f64 - mean_x;
        covariance += dx * (value - mean_y);
        variance_x += dx * dx;
    }

    if variance_x == 0.0 || !covariance.is_finite() {
        return 0.0;
    }

    let trend = covariance / variance_x / config.slope_divisor;
    trend.clamp(-1.0, 1.0)
}
