//! Class break computation: quantile, natural breaks (Jenks) and equal interval.
//!
//! Breaks are returned as `num_classes + 1` boundaries running from the series
//! minimum to its maximum. Renderers that use threshold lookups need strictly
//! increasing boundaries; [`separate_equal_breaks`] takes care of that.

use crate::error::{Result, StyleError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Offset added to a boundary equal to its predecessor.
pub const BREAK_EPSILON: f64 = 1e-13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    Quantile,
    Jenks,
    EqualInterval,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "quantile" => Ok(Method::Quantile),
            "jenks" | "natural_breaks" => Ok(Method::Jenks),
            "equal_interval" => Ok(Method::EqualInterval),
            other => Err(format!("unknown classification method '{}'", other)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Quantile => "quantile",
            Method::Jenks => "jenks",
            Method::EqualInterval => "equal_interval",
        })
    }
}

/// Compute `num_classes + 1` class boundaries for `series`.
///
/// NaN entries are ignored. An empty series yields [`StyleError::InsufficientData`].
/// A constant series yields all-equal breaks; pass the result through
/// [`separate_equal_breaks`] before building threshold lookups.
pub fn compute_breaks(series: &[f64], num_classes: usize, method: Method) -> Result<Vec<f64>> {
    if num_classes == 0 {
        return Err(StyleError::InvalidClassCount(num_classes));
    }
    let mut sorted: Vec<f64> = series.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return Err(StyleError::InsufficientData);
    }
    sorted.sort_by(f64::total_cmp);

    let breaks = match method {
        Method::Quantile => quantile(&sorted, num_classes),
        Method::EqualInterval => equal_interval(&sorted, num_classes),
        Method::Jenks if sorted.len() <= num_classes => quantile(&sorted, num_classes),
        Method::Jenks => jenks(&sorted, num_classes),
    };
    log::debug!(
        "{} breaks over {} values ({} classes): {:?}",
        method,
        sorted.len(),
        num_classes,
        breaks
    );
    Ok(breaks)
}

/// Make boundaries strictly increasing.
///
/// Any boundary not above its (already adjusted) predecessor becomes the predecessor
/// plus [`BREAK_EPSILON`], or the next representable value when the offset is lost
/// to rounding at large magnitudes.
pub fn separate_equal_breaks(breaks: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(breaks.len());
    for &b in breaks {
        match out.last() {
            Some(&prev) if b <= prev => {
                let bumped = prev + BREAK_EPSILON;
                out.push(if bumped > prev { bumped } else { next_up(prev) });
            }
            _ => out.push(b),
        }
    }
    out
}

fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

fn quantile(sorted: &[f64], k: usize) -> Vec<f64> {
    let n = sorted.len();
    (0..=k)
        .map(|i| {
            let pos = (i as f64 / k as f64) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            lerp(sorted[lo], sorted[hi], frac)
        })
        .collect()
}

fn equal_interval(sorted: &[f64], k: usize) -> Vec<f64> {
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let mut out: Vec<f64> = (0..k).map(|i| lerp(min, max, i as f64 / k as f64)).collect();
    out.push(max);
    out
}

/// Point `t` of the way from `a` to `b`, without overflowing when `b - a` does.
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    let span = b - a;
    if span.is_finite() {
        a + span * t
    } else {
        a * (1.0 - t) + b * t
    }
}

/// Fisher-Jenks optimal classification over a sorted series with more values than classes.
fn jenks(sorted: &[f64], k: usize) -> Vec<f64> {
    let n = sorted.len();
    // 1-based rows (element count) and columns (class count).
    let mut lower_limits = vec![vec![0usize; k + 1]; n + 1];
    let mut variances = vec![vec![f64::INFINITY; k + 1]; n + 1];
    for j in 1..=k {
        lower_limits[1][j] = 1;
        variances[1][j] = 0.0;
    }

    for l in 2..=n {
        let (mut sum, mut sum_sq, mut w) = (0.0f64, 0.0f64, 0.0f64);
        let mut variance = 0.0;
        for m in 1..=l {
            let lower = l - m + 1;
            let val = sorted[lower - 1];
            w += 1.0;
            sum += val;
            sum_sq += val * val;
            variance = sum_sq - (sum * sum) / w;
            let prev = lower - 1;
            if prev != 0 {
                for j in 2..=k {
                    let candidate = variance + variances[prev][j - 1];
                    if variances[l][j] >= candidate {
                        lower_limits[l][j] = lower;
                        variances[l][j] = candidate;
                    }
                }
            }
        }
        lower_limits[l][1] = 1;
        variances[l][1] = variance;
    }

    let mut breaks = vec![0.0; k + 1];
    breaks[0] = sorted[0];
    breaks[k] = sorted[n - 1];
    let mut end = n;
    for j in (2..=k).rev() {
        let start = lower_limits[end][j];
        if start < 2 {
            // Remaining classes are empty (ties in a near-constant series).
            for b in breaks[1..j].iter_mut() {
                *b = sorted[0];
            }
            break;
        }
        // Upper value of the class below.
        breaks[j - 1] = sorted[start - 2];
        end = start - 1;
    }
    breaks
}

/// Precomputed breaks published alongside the map data.
///
/// Nested JSON objects are flattened with `/` between keys, so both
/// `{"Staffed All Beds": [..]}` and `{"per_capita": {"ICUbed": {"mean": [..]}}}`
/// load into the same flat lookup.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BreaksTable(BTreeMap<String, Vec<f64>>);

impl BreaksTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, breaks: Vec<f64>) {
        self.0.insert(key.into(), breaks);
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Flatten a JSON document; leaves that are not arrays of numbers are skipped.
    pub fn from_json_value(v: &Value) -> Self {
        let mut table = Self::new();
        flatten_into(&mut table, String::new(), v);
        table
    }
}

fn flatten_into(table: &mut BreaksTable, prefix: String, v: &Value) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}/{}", prefix, k)
                };
                flatten_into(table, key, child);
            }
        }
        Value::Array(items) if !prefix.is_empty() => {
            let nums: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
            if let Some(nums) = nums {
                table.insert(prefix, nums);
            }
        }
        _ => {}
    }
}

impl<'de> Deserialize<'de> for BreaksTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        Ok(Self::from_json_value(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantile_interpolates_between_ranks() {
        let b = compute_breaks(&[0.0, 10.0], 4, Method::Quantile).unwrap();
        assert_eq!(b, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn equal_interval_hits_both_ends() {
        let b = compute_breaks(&[3.0, 1.0, 7.0], 3, Method::EqualInterval).unwrap();
        assert_eq!(b.len(), 4);
        assert_eq!(b[0], 1.0);
        assert!((b[1] - 3.0).abs() < 1e-12);
        assert!((b[2] - 5.0).abs() < 1e-12);
        assert_eq!(b[3], 7.0);
    }

    #[test]
    fn jenks_with_few_values_falls_back() {
        let b = compute_breaks(&[1.0, 2.0], 5, Method::Jenks).unwrap();
        assert_eq!(b.len(), 6);
        assert_eq!(b[0], 1.0);
        assert_eq!(b[5], 2.0);
    }

    #[test]
    fn nan_is_ignored() {
        let b = compute_breaks(&[f64::NAN, 4.0, 2.0], 1, Method::Quantile).unwrap();
        assert_eq!(b, vec![2.0, 4.0]);
        assert_eq!(
            compute_breaks(&[f64::NAN], 2, Method::Quantile),
            Err(StyleError::InsufficientData)
        );
    }

    #[test]
    fn separation_survives_large_magnitudes() {
        let b = separate_equal_breaks(&[1.0e9, 1.0e9, 1.0e9]);
        assert!(b[0] < b[1] && b[1] < b[2]);
    }

    #[test]
    fn breaks_table_flattens_nested_objects() {
        let t = BreaksTable::from_json_value(&json!({
            "totals": {"ICUbed": {"mean": [0, 1, 2]}},
            "per_capita": {"ICUbed": {"mean": [0.0, 0.5], "note": "skip me"}}
        }));
        assert_eq!(t.get("totals/ICUbed/mean"), Some(&[0.0, 1.0, 2.0][..]));
        assert_eq!(t.get("per_capita/ICUbed/mean"), Some(&[0.0, 0.5][..]));
        assert_eq!(t.len(), 2);
    }
}
