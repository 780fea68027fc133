use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MS_TO_US;

/// Groups with fewer points than this are left out of regression analysis.
pub const MIN_REGRESSION_POINTS: usize = 3;

/// Slopes below this many microseconds per connection count as constant time.
pub const DEFAULT_CONSTANT_SLOPE_THRESHOLD_US: f64 = 0.1;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sum_of_squares(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|x| (x - mean).powi(2)).sum()
}

pub fn population_stddev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    Some((sum_of_squares(values, mean) / values.len() as f64).sqrt())
}

/// Standard deviation with Bessel's correction, undefined for a single value.
pub fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    Some((sum_of_squares(values, mean) / (values.len() - 1) as f64).sqrt())
}

/// Quantile of already sorted values, interpolating linearly between the
/// two closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Coefficient of variation (population stddev over mean) as a fraction.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    if mean == 0.0 {
        return None;
    }
    Some(population_stddev(values)? / mean)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub stddev: f64,
    pub sample_stddev: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl GroupSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            count: values.len(),
            mean: mean(values)?,
            stddev: population_stddev(values)?,
            sample_stddev: sample_stddev(values),
            min: *sorted.first()?,
            q1: quantile_sorted(&sorted, 0.25)?,
            median: quantile_sorted(&sorted, 0.5)?,
            q3: quantile_sorted(&sorted, 0.75)?,
            max: *sorted.last()?,
        })
    }

    pub fn coefficient_of_variation(&self) -> Option<f64> {
        (self.mean != 0.0).then(|| self.stddev / self.mean)
    }
}

/// Ordinary least squares fit of `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub points: usize,
}

impl Regression {
    /// Returns `None` when fewer than two points are given or every `x` is
    /// the same.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len().min(ys.len());
        if n < 2 {
            return None;
        }
        let (xs, ys) = (&xs[..n], &ys[..n]);
        let mean_x = mean(xs)?;
        let mean_y = mean(ys)?;

        let ss_xx = sum_of_squares(xs, mean_x);
        let ss_yy = sum_of_squares(ys, mean_y);
        let ss_xy = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum::<f64>();

        if ss_xx == 0.0 {
            return None;
        }
        let slope = ss_xy / ss_xx;
        let r_squared = if ss_yy == 0.0 {
            0.0
        } else {
            let r = (ss_xy / (ss_xx * ss_yy).sqrt()).clamp(-1.0, 1.0);
            r * r
        };

        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
            r_squared,
            points: n,
        })
    }

    /// Slope in microseconds per connection, for a fit of milliseconds.
    pub fn slope_us(&self) -> f64 {
        self.slope * MS_TO_US
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    pub fn formula(&self) -> String {
        format!("{:.3} + {:.3}×10⁻³ × N ms", self.intercept, self.slope_us())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Constant,
    Linear,
}

impl Complexity {
    pub fn classify(slope_us: f64, threshold_us: f64) -> Self {
        if slope_us.abs() < threshold_us {
            Complexity::Constant
        } else {
            Complexity::Linear
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Complexity::Constant => "O(1)",
            Complexity::Linear => "O(N)",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Relative change against a baseline, with the first order error of the
/// ratio of two independent normal variables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentChange {
    pub percent: f64,
    pub error: f64,
}

impl PercentChange {
    pub fn propagate(
        baseline: f64,
        baseline_stddev: f64,
        current: f64,
        current_stddev: f64,
    ) -> Option<Self> {
        if baseline == 0.0 {
            return None;
        }
        let percent = (current - baseline) / baseline * 100.0;
        let error = 100.0
            * ((current_stddev / baseline).powi(2)
                + (current * baseline_stddev / baseline.powi(2)).powi(2))
            .sqrt();
        Some(Self { percent, error })
    }
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.1}% ± {:.1}%", self.percent, self.error)
    }
}

/// Which rows of a connection sweep take part in an analysis.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum RowFilter {
    #[default]
    All,
    MinConnections(f64),
    ConnectionRange(f64, f64),
    /// Rows up to and including the first maximum of `connections`.
    IncreasingPhase,
}

impl RowFilter {
    pub fn apply<T: Clone>(&self, rows: &[T], connections: impl Fn(&T) -> f64) -> Vec<T> {
        match *self {
            RowFilter::All => rows.to_vec(),
            RowFilter::MinConnections(min) => rows
                .iter()
                .filter(|r| connections(*r) >= min)
                .cloned()
                .collect(),
            RowFilter::ConnectionRange(min, max) => rows
                .iter()
                .filter(|r| (min..=max).contains(&connections(*r)))
                .cloned()
                .collect(),
            RowFilter::IncreasingPhase => {
                let end = increasing_phase_len(rows.iter().map(&connections));
                rows[..end].to_vec()
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RowFilter::All => "all connections".to_owned(),
            RowFilter::MinConnections(min) => format!("connections ≥ {min}"),
            RowFilter::ConnectionRange(min, max) => format!("{min}-{max} connections"),
            RowFilter::IncreasingPhase => "increasing phase".to_owned(),
        }
    }
}

/// Number of leading values up to and including the first maximum.
pub fn increasing_phase_len(values: impl IntoIterator<Item = f64>) -> usize {
    let mut best: Option<(usize, f64)> = None;
    let mut len = 0;
    for (idx, value) in values.into_iter().enumerate() {
        len = idx + 1;
        match best {
            Some((_, max)) if value <= max => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map_or(len, |(idx, _)| idx + 1)
}

/// Groups items by key, keeping groups and their members in the order they
/// first appear.
pub fn group_by_first_appearance<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<(K, Vec<T>)>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();
    for item in items {
        let k = key(&item);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(item),
            None => groups.push((k, vec![item])),
        }
    }
    groups
}
