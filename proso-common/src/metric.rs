//! Confidence estimates used by experiment statistics

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

/// z-score of the 95% confidence level
pub const DEFAULT_Z: f64 = 1.96;

/// Point estimate with its confidence interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceValue {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceValue {
    /// JSON form with every number rounded to two decimal places
    pub fn to_json(&self) -> Value {
        json!({
            "value": format_number(self.value),
            "confidence_interval": {
                "min": format_number(self.lower),
                "max": format_number(self.upper),
            }
        })
    }
}

impl Serialize for ConfidenceValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Mean of a binary sample with the normal-approximation interval
///
/// Returns `None` for an empty sample.
pub fn binomial_confidence_mean(xs: &[bool], z: f64) -> Option<ConfidenceValue> {
    if xs.is_empty() {
        return None;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().filter(|x| **x).count() as f64 / n;
    let confidence = z * ((mean * (1.0 - mean)) / n).sqrt();
    Some(ConfidenceValue {
        value: mean,
        lower: mean - confidence,
        upper: mean + confidence,
    })
}

/// Median with the rank-based (non-parametric) confidence interval
///
/// Returns `None` for an empty sample.
pub fn confidence_median(xs: &[f64], z: f64) -> Option<ConfidenceValue> {
    if xs.is_empty() {
        return None;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let half = n as f64 / 2.0;
    let modifier = (z * (n as f64).sqrt()) / 2.0;
    let lower = ((half - modifier).round_ties_even() as i64 - 1).max(0) as usize;
    let upper = ((1.0 + half + modifier).round_ties_even() as i64 - 1).min(n as i64 - 1) as usize;

    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    Some(ConfidenceValue {
        value: median,
        lower: sorted[lower],
        upper: sorted[upper],
    })
}

/// Round to two decimal places
pub fn format_number(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
