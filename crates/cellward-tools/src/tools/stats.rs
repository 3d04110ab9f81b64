//! Pure numeric routines backing `compute_statistics` and
//! `detect_anomalies` (spec §6.3). Operate on plain `Vec<f64>` column
//! data so they stay unit-testable without any spreadsheet plumbing.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64], mean_value: f64) -> f64 {
    values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v
}

fn percentile(sorted_values: &[f64], fraction: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }
    let idx = fraction * (sorted_values.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted_values[lo]
    } else {
        let frac = idx - lo as f64;
        sorted_values[lo] * (1.0 - frac) + sorted_values[hi] * frac
    }
}

fn mode(values: &[f64]) -> Option<f64> {
    use std::collections::HashMap;
    let mut counts: HashMap<u64, (f64, usize)> = HashMap::new();
    for &v in values {
        let key = v.to_bits();
        let entry = counts.entry(key).or_insert((v, 0));
        entry.1 += 1;
    }
    counts.values().max_by_key(|(_, count)| *count).map(|(v, _)| *v)
}

fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let ma = mean(a);
    let mb = mean(b);
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum::<f64>() / a.len() as f64;
    let sa = variance(a, ma).sqrt();
    let sb = variance(b, mb).sqrt();
    if sa == 0.0 || sb == 0.0 {
        None
    } else {
        Some(cov / (sa * sb))
    }
}

/// `compute_statistics` measures (spec §6.3): `correlation` is only
/// populated when exactly two columns are supplied.
pub fn compute_statistics(columns: &[Vec<f64>]) -> Value {
    let flat: Vec<f64> = columns.iter().flatten().copied().collect();
    let mut stats = serde_json::Map::new();
    if flat.is_empty() {
        for key in ["mean", "sum", "median", "mode", "stdev", "variance", "min", "max"] {
            stats.insert(key.to_string(), Value::Null);
        }
        stats.insert("count".to_string(), json!(0));
        stats.insert(
            "quartiles".to_string(),
            json!({ "q1": Value::Null, "q2": Value::Null, "q3": Value::Null }),
        );
        stats.insert("correlation".to_string(), Value::Null);
        return Value::Object(stats);
    }

    let m = mean(&flat);
    let var = variance(&flat, m);
    let sorted_flat = sorted(&flat);

    stats.insert("mean".to_string(), json!(m));
    stats.insert("sum".to_string(), json!(flat.iter().sum::<f64>()));
    stats.insert("count".to_string(), json!(flat.len()));
    stats.insert("median".to_string(), json!(percentile(&sorted_flat, 0.5)));
    stats.insert("mode".to_string(), mode(&flat).map(Value::from).unwrap_or(Value::Null));
    stats.insert("stdev".to_string(), json!(var.sqrt()));
    stats.insert("variance".to_string(), json!(var));
    stats.insert("min".to_string(), json!(sorted_flat.first().copied().unwrap_or(f64::NAN)));
    stats.insert("max".to_string(), json!(sorted_flat.last().copied().unwrap_or(f64::NAN)));
    stats.insert(
        "quartiles".to_string(),
        json!({
            "q1": percentile(&sorted_flat, 0.25),
            "q2": percentile(&sorted_flat, 0.5),
            "q3": percentile(&sorted_flat, 0.75),
        }),
    );
    stats.insert(
        "correlation".to_string(),
        if columns.len() == 2 {
            correlation(&columns[0], &columns[1]).map(Value::from).unwrap_or(Value::Null)
        } else {
            Value::Null
        },
    );

    Value::Object(stats)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyMethod {
    Iqr,
    Zscore,
    IsolationForest,
}

impl AnomalyMethod {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "iqr" => Some(AnomalyMethod::Iqr),
            "zscore" => Some(AnomalyMethod::Zscore),
            "isolation_forest" => Some(AnomalyMethod::IsolationForest),
            _ => None,
        }
    }
}

fn detect_iqr(values: &[f64]) -> Vec<usize> {
    let sorted_values = sorted(values);
    let q1 = percentile(&sorted_values, 0.25);
    let q3 = percentile(&sorted_values, 0.75);
    let iqr = q3 - q1;
    let lo = q1 - 1.5 * iqr;
    let hi = q3 + 1.5 * iqr;
    values
        .iter()
        .enumerate()
        .filter(|(_, &v)| v < lo || v > hi)
        .map(|(i, _)| i)
        .collect()
}

fn detect_zscore(values: &[f64], threshold: f64) -> Vec<usize> {
    let m = mean(values);
    let sd = variance(values, m).sqrt();
    if sd == 0.0 {
        return Vec::new();
    }
    values
        .iter()
        .enumerate()
        .filter(|(_, &v)| ((v - m) / sd).abs() > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// A deliberately small isolation forest: each tree recursively splits
/// a random feature at a random threshold until the partition holds a
/// single point or a depth cap is hit, and a point's anomaly score is
/// the inverse of its average isolation depth across trees — points
/// that separate quickly (few splits) score as more anomalous.
fn isolation_depth(point: f64, sample: &[f64], rng: &mut impl Rng, max_depth: u32) -> u32 {
    if max_depth == 0 || sample.len() <= 1 {
        return 0;
    }
    let min = sample.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = sample.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return 0;
    }
    let split = rng.gen_range(min..max);
    let left: Vec<f64> = sample.iter().copied().filter(|&v| v < split).collect();
    let right: Vec<f64> = sample.iter().copied().filter(|&v| v >= split).collect();
    if point < split {
        1 + isolation_depth(point, &left, rng, max_depth - 1)
    } else {
        1 + isolation_depth(point, &right, rng, max_depth - 1)
    }
}

fn detect_isolation_forest(values: &[f64], trees: usize) -> Vec<usize> {
    if values.len() < 4 {
        return Vec::new();
    }
    let mut rng = rand::thread_rng();
    let sample_size = values.len().min(256);
    let max_depth = (sample_size as f64).log2().ceil() as u32 + 1;

    let mut scores = vec![0.0f64; values.len()];
    for _ in 0..trees {
        let mut sample: Vec<f64> = values.to_vec();
        sample.shuffle(&mut rng);
        sample.truncate(sample_size);
        for (i, &point) in values.iter().enumerate() {
            scores[i] += isolation_depth(point, &sample, &mut rng, max_depth) as f64;
        }
    }
    for score in &mut scores {
        *score /= trees as f64;
    }
    let avg_depth = scores.iter().sum::<f64>() / scores.len() as f64;
    scores
        .iter()
        .enumerate()
        .filter(|(_, &depth)| depth < avg_depth * 0.6)
        .map(|(i, _)| i)
        .collect()
}

/// Returns the (possibly truncated) anomaly row indices, whether
/// truncation occurred, and the true pre-truncation count — callers
/// must report the real total, not the bounded list's length.
pub fn detect_anomalies(method: AnomalyMethod, values: &[f64], max_anomalies: usize) -> (Vec<usize>, bool, usize) {
    let indices = match method {
        AnomalyMethod::Iqr => detect_iqr(values),
        AnomalyMethod::Zscore => detect_zscore(values, 3.0),
        AnomalyMethod::IsolationForest => detect_isolation_forest(values, 64),
    };
    let total = indices.len();
    let truncated = total > max_anomalies;
    let mut bounded = indices;
    bounded.truncate(max_anomalies);
    (bounded, truncated, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iqr_flags_obvious_outlier() {
        let values = vec![1.0, 2.0, 3.0, 2.0, 1.0, 100.0];
        let anomalies = detect_iqr(&values);
        assert!(anomalies.contains(&5));
    }

    #[test]
    fn zscore_flags_far_outlier() {
        let values = vec![10.0, 11.0, 9.0, 10.0, 10.0, 200.0];
        let anomalies = detect_zscore(&values, 2.0);
        assert!(anomalies.contains(&5));
    }

    #[test]
    fn correlation_requires_two_columns() {
        let stats = compute_statistics(&[vec![1.0, 2.0, 3.0]]);
        assert_eq!(stats["correlation"], Value::Null);
    }

    #[test]
    fn correlation_perfect_for_linear_columns() {
        let stats = compute_statistics(&[vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0]]);
        let corr = stats["correlation"].as_f64().unwrap();
        assert!((corr - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_yields_null_statistics() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats["mean"], Value::Null);
        assert_eq!(stats["count"], json!(0));
    }
}
