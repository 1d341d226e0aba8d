//! Statistical factors for the correlation analysis

use statrs::statistics::{Data, Distribution};

/// Sample mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Data::new(values.to_vec()).mean()
}

/// Pearson correlation coefficient between two paired series.
///
/// Returns `None` when the series differ in length, have fewer than two
/// pairs, or either side has zero variance (the coefficient is undefined).
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len();

    let x_data = Data::new(xs.to_vec());
    let y_data = Data::new(ys.to_vec());

    let x_mean = x_data.mean()?;
    let y_mean = y_data.mean()?;
    let x_std = x_data.std_dev()?;
    let y_std = y_data.std_dev()?;

    if x_std == 0.0 || y_std == 0.0 || !x_std.is_finite() || !y_std.is_finite() {
        return None;
    }

    let covariance: f64 = xs
        .iter()
        .zip(ys.iter())
        .map(|(&xi, &yi)| (xi - x_mean) * (yi - y_mean))
        .sum::<f64>()
        / (n - 1) as f64;

    // float noise can push a perfect correlation just past +/-1
    Some((covariance / (x_std * y_std)).clamp(-1.0, 1.0))
}
