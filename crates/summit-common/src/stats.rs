//! Summary statistics over mixing ratios and peak areas.
//!
//! Each function returns `None` where the statistic is undefined, instead of NaN.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (n - 1 denominator); needs at least two values.
pub fn stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let m = mean(values)?;
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Relative standard deviation in percent: `stdev / median * 100`.
pub fn rsd(values: &[f64]) -> Option<f64> {
    let med = median(values)?;
    if med == 0.0 {
        return None;
    }
    Some(stdev(values)? / med * 100.0)
}

/// Mean, median and standard deviation of one window of readings.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    pub stdev: Option<f64>,
}

impl Summary {
    pub fn of(values: &[f64]) -> Option<Self> {
        Some(Self {
            mean: mean(values)?,
            median: median(values)?,
            stdev: stdev(values),
        })
    }
}
