//! Property-key composition.
//!
//! The static data files name their columns by concatenating selection parts, so
//! these functions have to reproduce the exact strings:
//!
//! - capacity maps: `"Staffed ICU Beds"` / `"Staffed ICU Beds [Per 1000 People]"`
//! - IHME projections: `"2020-04-15_ICUbed_mean"`
//!
//! Precomputed breaks use a parallel key: the undated property name for suffixed
//! data, and `"totals/ICUbed/mean"` / `"per_capita/ICUbed/mean"` for IHME data.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// `<indicator property><per-capita suffix>`; per-capita columns exist in the data.
    #[default]
    IndicatorSuffix,
    /// `<date>_<indicator>_<bound level>`; per-capita values are derived from population.
    DateIndicatorBound,
}

/// The parts of a selection that take part in key construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParts<'a> {
    /// Column name of the indicator (IHME: the indicator id).
    pub indicator: &'a str,
    pub date: Option<&'a str>,
    pub bound_level: Option<&'a str>,
    /// Suffix of the active per-capita basis, already gated; `None` for totals.
    pub per_capita_suffix: Option<&'a str>,
}

impl KeyScheme {
    /// Name of the feature property holding the value for this selection.
    pub fn property_key(self, parts: &KeyParts<'_>) -> String {
        match self {
            KeyScheme::IndicatorSuffix => {
                format!("{}{}", parts.indicator, parts.per_capita_suffix.unwrap_or(""))
            }
            KeyScheme::DateIndicatorBound => format!(
                "{}_{}_{}",
                parts.date.unwrap_or(""),
                parts.indicator,
                parts.bound_level.unwrap_or("")
            ),
        }
    }

    /// Key of the matching entry in a precomputed [`crate::breaks::BreaksTable`].
    pub fn breaks_key(self, parts: &KeyParts<'_>, per_capita: bool) -> String {
        match self {
            KeyScheme::IndicatorSuffix => self.property_key(parts),
            KeyScheme::DateIndicatorBound => format!(
                "{}/{}/{}",
                if per_capita { "per_capita" } else { "totals" },
                parts.indicator,
                parts.bound_level.unwrap_or("")
            ),
        }
    }

    /// Whether keys under this scheme need a date.
    pub fn uses_date(self) -> bool {
        matches!(self, KeyScheme::DateIndicatorBound)
    }

    /// Whether per-capita values come from dividing by population at styling time.
    pub fn derives_per_capita(self) -> bool {
        matches!(self, KeyScheme::DateIndicatorBound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_keys_append_basis_marker() {
        let mut parts = KeyParts {
            indicator: "Staffed All Beds",
            date: Some("2020-04-01"),
            bound_level: None,
            per_capita_suffix: Some(" [Per 1000 People]"),
        };
        let scheme = KeyScheme::IndicatorSuffix;
        assert_eq!(scheme.property_key(&parts), "Staffed All Beds [Per 1000 People]");
        assert_eq!(scheme.breaks_key(&parts, true), "Staffed All Beds [Per 1000 People]");
        parts.per_capita_suffix = None;
        assert_eq!(scheme.property_key(&parts), "Staffed All Beds");
    }

    #[test]
    fn dated_keys_ignore_suffix() {
        let parts = KeyParts {
            indicator: "ICUbed",
            date: Some("2020-04-15"),
            bound_level: Some("mean"),
            per_capita_suffix: Some("ignored"),
        };
        let scheme = KeyScheme::DateIndicatorBound;
        assert_eq!(scheme.property_key(&parts), "2020-04-15_ICUbed_mean");
        assert_eq!(scheme.breaks_key(&parts, true), "per_capita/ICUbed/mean");
        assert_eq!(scheme.breaks_key(&parts, false), "totals/ICUbed/mean");
    }
}
