//! Legend entries and the number formatting shared by legends, popups and exports.

use crate::color::Rgb8;
use crate::models::NumericValue;
use crate::paint::ResolvedStyle;
use crate::style::Interpolation;
use num_format::{Locale, ToFormattedString};
use serde::Serialize;

/// Format a value for display.
///
/// - missing → `N/A`
/// - percentages are stored as fractions: `0.734` → `73%`
/// - whole numbers get thousands separators: `12345` → `12,345`
/// - everything else gets two decimals
pub fn format_number(value: NumericValue, as_percent: bool) -> String {
    let NumericValue::Present(v) = value else {
        return "N/A".to_string();
    };
    if as_percent {
        return format!("{}%", (v * 100.0).round());
    }
    if v.fract() == 0.0 && v.abs() < 9.0e15 {
        return (v as i64).to_formatted_string(&Locale::en);
    }
    format!("{:.2}", v)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub color: Rgb8,
    pub lower: f64,
    /// Upper bound of the class; `None` for the open-ended top class and for
    /// stops of a continuous ramp.
    pub upper: Option<f64>,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: String,
    pub entries: Vec<LegendEntry>,
    pub no_data: Rgb8,
    pub continuous: bool,
}

impl Legend {
    /// One entry per class (stepwise) or per stop (continuous).
    pub fn from_style(style: &ResolvedStyle, no_data: Rgb8) -> Self {
        let breaks = style.colors.breaks();
        let colors = style.colors.colors();
        let pct = style.display_as_percent;
        let fmt = |v: f64| format_number(NumericValue::Present(v), pct);

        let entries = match style.colors.mode() {
            Interpolation::Step => colors
                .iter()
                .enumerate()
                .map(|(i, &color)| {
                    let lower = breaks[i];
                    let upper = if i + 2 < breaks.len() {
                        Some(breaks[i + 1])
                    } else {
                        None
                    };
                    let label = match upper {
                        Some(u) => format!("{} - {}", fmt(lower), fmt(u)),
                        None => format!("{}+", fmt(lower)),
                    };
                    LegendEntry {
                        color,
                        lower,
                        upper,
                        label,
                    }
                })
                .collect(),
            Interpolation::Linear => breaks
                .iter()
                .zip(colors)
                .map(|(&b, &color)| LegendEntry {
                    color,
                    lower: b,
                    upper: None,
                    label: fmt(b),
                })
                .collect(),
        };

        Legend {
            title: style.title.clone(),
            entries,
            no_data,
            continuous: style.colors.mode() == Interpolation::Linear,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_the_popups() {
        assert_eq!(format_number(NumericValue::Missing, false), "N/A");
        assert_eq!(format_number(0.734.into(), true), "73%");
        assert_eq!(format_number(1234567.0.into(), false), "1,234,567");
        assert_eq!(format_number(12.3456.into(), false), "12.35");
        assert_eq!(format_number((-2.0).into(), false), "-2");
    }
}
