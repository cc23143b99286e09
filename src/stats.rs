use crate::models::{Feature, NumericValue};
use crate::paint::PaintStyle;
use serde::{Deserialize, Serialize};

/// Summary statistics for one property across a layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesSummary {
    pub property: String,
    pub count: usize,
    pub missing: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

pub fn summarize<I>(property: &str, values: I) -> SeriesSummary
where
    I: IntoIterator<Item = NumericValue>,
{
    let mut vals = Vec::new();
    let mut missing = 0;
    for v in values {
        match v {
            NumericValue::Present(x) => vals.push(x),
            NumericValue::Missing => missing += 1,
        }
    }
    vals.sort_by(f64::total_cmp);
    let count = vals.len();
    let mean = if count > 0 {
        Some(vals.iter().sum::<f64>() / count as f64)
    } else {
        None
    };
    let median = if count == 0 {
        None
    } else if count % 2 == 1 {
        Some(vals[count / 2])
    } else {
        Some((vals[count / 2 - 1] + vals[count / 2]) / 2.0)
    };
    SeriesSummary {
        property: property.to_string(),
        count,
        missing,
        min: vals.first().copied(),
        max: vals.last().copied(),
        mean,
        median,
    }
}

/// One summary per property, in the order given.
pub fn grouped_summary(features: &[Feature], properties: &[String]) -> Vec<SeriesSummary> {
    properties
        .iter()
        .map(|p| summarize(p, features.iter().map(|f| f.value(p))))
        .collect()
}

/// Number of features per class of `style`; empty for hidden layers.
pub fn class_counts(style: &PaintStyle, features: &[Feature]) -> Vec<usize> {
    let Some(resolved) = style.resolved() else {
        return Vec::new();
    };
    let mut counts = vec![0; resolved.colors.breaks().len().saturating_sub(1)];
    for class in features.iter().filter_map(|f| style.classify(f)) {
        if let Some(c) = counts.get_mut(class) {
            *c += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_count_median_averages() {
        let s = summarize(
            "x",
            [4.0.into(), NumericValue::Missing, 1.0.into(), 3.0.into(), 2.0.into()],
        );
        assert_eq!(s.count, 4);
        assert_eq!(s.missing, 1);
        assert_eq!(s.median, Some(2.5));
        assert_eq!(s.mean, Some(2.5));
        assert_eq!((s.min, s.max), (Some(1.0), Some(4.0)));
    }
}
