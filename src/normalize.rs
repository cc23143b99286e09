//! Per-capita normalization of raw feature values.

use crate::models::{Feature, NumericValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Total,
    PerCapita,
}

/// Rescale `raw` to a per-capita figure when `mode` asks for it.
///
/// - `suppress` marks indicators that are never normalized (rates, percentages); the
///   raw value is returned whatever the mode.
/// - Per-capita needs a population above zero and a base; otherwise the result is
///   `Missing` rather than a division by zero.
pub fn normalize(
    raw: NumericValue,
    population: NumericValue,
    per_capita_base: Option<f64>,
    mode: Mode,
    suppress: bool,
) -> NumericValue {
    let NumericValue::Present(raw) = raw else {
        return NumericValue::Missing;
    };
    if suppress || mode == Mode::Total {
        return NumericValue::Present(raw);
    }
    match (population, per_capita_base) {
        (NumericValue::Present(pop), Some(base)) if pop > 0.0 && base > 0.0 => {
            (raw / (pop / base)).into()
        }
        _ => NumericValue::Missing,
    }
}

/// How a layer turns a feature's property into the value that gets classified.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Use the property as-is (totals, or per-capita columns precomputed in the data).
    #[default]
    None,
    /// Divide by `population / base`, reading population from `population_property`.
    /// Without a base every value is `Missing`.
    Derived {
        base: Option<f64>,
        population_property: String,
    },
}

impl Normalization {
    pub fn is_derived(&self) -> bool {
        matches!(self, Normalization::Derived { .. })
    }

    /// Resolve the normalized value of `property` for one feature.
    pub fn apply(&self, feature: &Feature, property: &str) -> NumericValue {
        let raw = feature.value(property);
        match self {
            Normalization::None => raw,
            Normalization::Derived {
                base,
                population_property,
            } => normalize(
                raw,
                feature.value(population_property),
                *base,
                Mode::PerCapita,
                false,
            ),
        }
    }
}
