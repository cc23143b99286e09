//! Map configuration: indicators, aggregation levels, per-capita bases, bound levels.
//!
//! A [`MapConfig`] is built once (from JSON or a preset), optionally merged with the
//! runtime config published next to the data, and then only read. Components get it
//! passed in explicitly.

use crate::breaks::{BreaksTable, Method};
use crate::color::{ColorRamp, Rgb8};
use crate::error::{Result as StyleResult, StyleError};
use crate::key::KeyScheme;
use crate::models::MissingPolicy;
use crate::style::{DEFAULT_TIER_ZOOMS, Interpolation, RadiusTier};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Polygons colored by value.
    #[default]
    Fill,
    /// Points sized and colored by value (facilities).
    Circle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: String,
    pub label: String,
    /// Column name in the data; defaults to `id`.
    #[serde(default)]
    pub property: Option<String>,
    pub colors: Vec<String>,
    #[serde(default)]
    pub radii: Vec<RadiusTier>,
    /// Rates and percentages are always shown as-is.
    #[serde(default)]
    pub suppress_per_capita: bool,
    #[serde(default)]
    pub display_as_percent: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl Indicator {
    pub fn property_name(&self) -> &str {
        self.property.as_deref().unwrap_or(&self.id)
    }

    pub fn ramp(&self) -> StyleResult<ColorRamp> {
        ColorRamp::from_hex(&self.colors)
    }

    /// Circle radius tiers; `[3: 1..20, 10: 5..50]` when none are configured.
    pub fn radius_tiers(&self) -> Vec<RadiusTier> {
        if self.radii.is_empty() {
            vec![
                RadiusTier::new(DEFAULT_TIER_ZOOMS[0], 1.0, 20.0),
                RadiusTier::new(DEFAULT_TIER_ZOOMS[1], 5.0, 50.0),
            ]
        } else {
            self.radii.clone()
        }
    }
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationLevel {
    pub id: String,
    pub label: String,
    /// Property holding the feature's display name.
    #[serde(default)]
    pub name_property: Option<String>,
    /// Append `, <State>` to display names.
    #[serde(default)]
    pub include_state: bool,
    #[serde(default)]
    pub kind: LayerKind,
    #[serde(default = "yes")]
    pub supports_per_capita: bool,
    /// Divisor base for derived per-capita values (people per unit).
    #[serde(default)]
    pub per_capita_base: Option<f64>,
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub breaks_url: Option<String>,
    #[serde(default)]
    pub breaks: Option<BreaksTable>,
}

impl AggregationLevel {
    fn new(id: &str, label: &str, name_property: &str) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            name_property: Some(name_property.into()),
            include_state: false,
            kind: LayerKind::Fill,
            supports_per_capita: true,
            per_capita_base: None,
            data_url: None,
            breaks_url: None,
            breaks: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerCapitaBasis {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub label_abbreviated: Option<String>,
    /// Marker appended to column names, e.g. `" [Per 1000 People]"`.
    #[serde(default)]
    pub suffix: String,
}

impl PerCapitaBasis {
    pub fn short_label(&self) -> &str {
        self.label_abbreviated.as_deref().unwrap_or(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundLevel {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreaksSource {
    /// Use published breaks, classifying loaded data only when an entry is absent.
    #[default]
    Precomputed,
    /// Always classify the loaded data.
    Computed,
}

fn default_classes() -> usize {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub source: BreaksSource,
    #[serde(default)]
    pub method: Method,
    #[serde(default = "default_classes")]
    pub num_classes: usize,
    #[serde(default)]
    pub missing: MissingPolicy,
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            source: BreaksSource::default(),
            method: Method::default(),
            num_classes: default_classes(),
            missing: MissingPolicy::default(),
            interpolation: Interpolation::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub indicator: Option<String>,
    #[serde(default)]
    pub aggregation: Option<String>,
    #[serde(default)]
    pub bound_level: Option<String>,
    #[serde(default)]
    pub per_capita: Option<String>,
}

fn default_fallback() -> String {
    crate::color::FALLBACK_HEX.to_string()
}

fn default_population() -> String {
    "population".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub name: String,
    #[serde(default)]
    pub key_scheme: KeyScheme,
    pub indicators: Vec<Indicator>,
    pub aggregations: Vec<AggregationLevel>,
    #[serde(default)]
    pub per_capita: Vec<PerCapitaBasis>,
    #[serde(default)]
    pub bound_levels: Vec<BoundLevel>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default = "default_fallback")]
    pub fallback_color: String,
    #[serde(default = "default_population")]
    pub population_property: String,
    #[serde(default)]
    pub model_version: Option<String>,
}

/// Runtime config published with the data (`ihme-config.json` and friends).
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub aggregations: BTreeMap<String, AggregationOverride>,
    #[serde(default, alias = "modelVersion", alias = "model_version_id")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AggregationOverride {
    #[serde(default)]
    pub per_capita_base: Option<f64>,
    #[serde(default)]
    pub breaks: Option<BreaksTable>,
}

impl RuntimeConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parse runtime config")
    }
}

impl MapConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: MapConfig = serde_json::from_str(s).context("parse map config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read map config {}", path.display()))?;
        Self::from_json_str(&s).with_context(|| format!("load {}", path.display()))
    }

    /// Look up a built-in preset: `capacity`, `ihme` or `vents`.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "capacity" => Some(Self::healthcare_capacity()),
            "ihme" => Some(Self::ihme_projections()),
            "vents" => Some(Self::ventilator_supply()),
            _ => None,
        }
    }

    /// Check that ids resolve and every ramp parses.
    pub fn validate(&self) -> StyleResult<()> {
        if self.indicators.is_empty() {
            return Err(StyleError::UnknownIndicator(String::new()));
        }
        if self.aggregations.is_empty() {
            return Err(StyleError::UnknownAggregation(String::new()));
        }
        for ind in &self.indicators {
            ind.ramp()?;
        }
        Rgb8::from_hex(&self.fallback_color)?;
        if let Some(id) = &self.defaults.indicator {
            self.indicator(id)?;
        }
        if let Some(id) = &self.defaults.aggregation {
            self.aggregation(id)?;
        }
        if let Some(id) = &self.defaults.bound_level {
            self.bound_level(id)?;
        }
        if let Some(id) = &self.defaults.per_capita {
            self.per_capita_basis(id)?;
        }
        Ok(())
    }

    pub fn indicator(&self, id: &str) -> StyleResult<&Indicator> {
        self.indicators
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| StyleError::UnknownIndicator(id.to_string()))
    }

    pub fn aggregation(&self, id: &str) -> StyleResult<&AggregationLevel> {
        self.aggregations
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| StyleError::UnknownAggregation(id.to_string()))
    }

    pub fn bound_level(&self, id: &str) -> StyleResult<&BoundLevel> {
        self.bound_levels
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| StyleError::UnknownBoundLevel(id.to_string()))
    }

    pub fn per_capita_basis(&self, id: &str) -> StyleResult<&PerCapitaBasis> {
        self.per_capita
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| StyleError::UnknownPerCapita(id.to_string()))
    }

    pub fn date(&self, index: usize) -> StyleResult<&str> {
        if self.dates.is_empty() {
            return Err(StyleError::NoDates);
        }
        self.dates
            .get(index)
            .map(String::as_str)
            .ok_or(StyleError::DateOutOfRange {
                index,
                len: self.dates.len(),
            })
    }

    pub fn fallback(&self) -> Rgb8 {
        Rgb8::from_hex(&self.fallback_color).unwrap_or_else(|_| Rgb8::fallback())
    }

    /// Per-capita only applies to normalizable indicators on levels that support it.
    pub fn allows_per_capita(&self, indicator: &Indicator, aggregation: &AggregationLevel) -> bool {
        !indicator.suppress_per_capita && aggregation.supports_per_capita
    }

    /// Index of `today` in the date list, else the latest date.
    pub fn default_date_index(&self, today: NaiveDate) -> usize {
        let today = today.format("%Y-%m-%d").to_string();
        self.dates
            .iter()
            .position(|d| *d == today)
            .unwrap_or_else(|| self.dates.len().saturating_sub(1))
    }

    /// Fold the runtime config into a new configuration.
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        if !runtime.dates.is_empty() {
            let unique: BTreeSet<String> = runtime.dates.into_iter().collect();
            self.dates = unique.into_iter().collect();
        }
        for (id, over) in runtime.aggregations {
            match self.aggregations.iter_mut().find(|a| a.id == id) {
                Some(agg) => {
                    if over.per_capita_base.is_some() {
                        agg.per_capita_base = over.per_capita_base;
                    }
                    if over.breaks.is_some() {
                        agg.breaks = over.breaks;
                    }
                }
                None => log::warn!("runtime config names unknown aggregation '{}'", id),
            }
        }
        if runtime.model_version.is_some() {
            self.model_version = runtime.model_version;
        }
        self
    }

    /// State/HRR/county/facility capacity maps.
    pub fn healthcare_capacity() -> Self {
        let ind = |id: &str, label: &str, colors: [&str; 4], rate: bool| Indicator {
            id: id.into(),
            label: label.into(),
            property: Some(label.into()),
            colors: colors.iter().map(|c| c.to_string()).collect(),
            radii: if rate {
                vec![RadiusTier::new(3.0, 1.0, 8.0), RadiusTier::new(10.0, 5.0, 40.0)]
            } else {
                vec![RadiusTier::new(3.0, 1.0, 20.0), RadiusTier::new(10.0, 5.0, 50.0)]
            },
            suppress_per_capita: rate,
            display_as_percent: rate,
            description: None,
        };
        let level = |id: &str, label: &str, name: &str, file: &str| AggregationLevel {
            breaks_url: Some(format!("data/config/ccm_{}_breaks.json", file)),
            ..AggregationLevel::new(id, label, name)
        };
        let basis = |id: &str, label: &str, short: &str, suffix: &str| PerCapitaBasis {
            id: id.into(),
            label: label.into(),
            label_abbreviated: Some(short.into()),
            suffix: suffix.into(),
        };

        MapConfig {
            name: "US Healthcare System Capacity".into(),
            key_scheme: KeyScheme::IndicatorSuffix,
            indicators: vec![
                ind("staffed_all_beds", "Staffed All Beds", ["#fff7fb", "#9db5ce", "#4d7596", "#023858"], false),
                ind("staffed_icu_beds", "Staffed ICU Beds", ["#f7fcfd", "#b0aacb", "#7a5a8d", "#4d004b"], false),
                ind("licensed_all_beds", "Licensed All Beds", ["#f7fcfd", "#8cc1aa", "#40825e", "#00441b"], false),
                ind("all_bed_occupancy_rate", "All Bed Occupancy Rate", ["#f3e7e9", "#d49ebb", "#a55c90", "#6c2167"], true),
                ind("icu_bed_occupancy_rate", "ICU Bed Occupancy Rate", ["#e9eeed", "#91bec5", "#56899d", "#2a5675"], true),
            ],
            aggregations: vec![
                level("state", "State", "State Name", "state"),
                level("hrr", "HRR", "HRRCITY", "hrr"),
                AggregationLevel {
                    include_state: true,
                    ..level("county", "County", "County Name", "county")
                },
                AggregationLevel {
                    kind: LayerKind::Circle,
                    supports_per_capita: false,
                    ..level("facility", "Facility", "Name", "facility")
                },
            ],
            per_capita: vec![
                basis("people", "per 1,000 people", "per 1k people", " [Per 1000 People]"),
                basis("adults", "per 1,000 adults (20+)", "per 1k adults (20+)", " [Per 1000 Adults (20+)]"),
                basis("elderly", "per 1,000 elderly (65+)", "per 1k elderly (65+)", " [Per 1000 Elderly (65+)]"),
            ],
            bound_levels: Vec::new(),
            dates: Vec::new(),
            defaults: Defaults {
                indicator: Some("staffed_all_beds".into()),
                aggregation: Some("state".into()),
                bound_level: None,
                per_capita: Some("people".into()),
            },
            classification: Classification {
                num_classes: 4,
                ..Classification::default()
            },
            fallback_color: default_fallback(),
            population_property: default_population(),
            model_version: None,
        }
    }

    /// IHME projections explorer (country and region levels, dated keys).
    pub fn ihme_projections() -> Self {
        const BLUE: [&str; 4] = ["#fff7fb", "#9db5ce", "#4d7596", "#023858"];
        const PURPLE: [&str; 4] = ["#f7fcfd", "#b0aacb", "#7a5a8d", "#4d004b"];
        const GREEN: [&str; 4] = ["#f7fcfd", "#8cc1aa", "#40825e", "#00441b"];
        const PLUM: [&str; 4] = ["#f3e7e9", "#d49ebb", "#a55c90", "#6c2167"];
        let ind = |id: &str, label: &str, colors: [&str; 4], description: &str| Indicator {
            id: id.into(),
            label: label.into(),
            property: None,
            colors: colors.iter().map(|c| c.to_string()).collect(),
            radii: Vec::new(),
            suppress_per_capita: false,
            display_as_percent: false,
            description: Some(description.into()),
        };

        MapConfig {
            name: "IHME COVID-19 Projections".into(),
            key_scheme: KeyScheme::DateIndicatorBound,
            indicators: vec![
                ind("allbed", "All Beds", BLUE, "Hospital beds needed per day for COVID-19 patients"),
                ind("ICUbed", "ICU Beds", PURPLE, "ICU beds needed per day for COVID-19 patients"),
                ind("InvVen", "Ventilators", GREEN, "Invasive ventilation needed per day for COVID-19 patients"),
                ind("admis", "Daily Hospital Admissions", BLUE, "New hospital admissions per day of COVID-19 patients"),
                ind("newICU", "Daily ICU Admissions", PURPLE, "New ICU admissions per day of COVID-19 patients"),
                ind("deaths", "Daily COVID-19 Deaths", PLUM, "Daily deaths of COVID-19 patients"),
                ind("totdea", "Total COVID-19 Deaths", PLUM, "Cumulative deaths of COVID-19 patients"),
                ind("bedover", "Hospital Bed Shortage", BLUE, "Difference between total hospital beds needed for COVID-19 patients and estimated count of hospital beds available"),
                ind("icuover", "ICU Bed Shortage", PURPLE, "Difference between total ICU beds needed for COVID-19 patients and estimated count of ICU beds available"),
            ],
            aggregations: vec![
                AggregationLevel {
                    data_url: Some("data/ihme-country-data.json".into()),
                    ..AggregationLevel::new("country", "National", "name")
                },
                AggregationLevel {
                    data_url: Some("data/ihme-region-data.json".into()),
                    ..AggregationLevel::new("region", "Regional", "name")
                },
            ],
            per_capita: vec![PerCapitaBasis {
                id: "population".into(),
                label: "per capita".into(),
                label_abbreviated: None,
                suffix: String::new(),
            }],
            bound_levels: vec![
                BoundLevel { id: "lower".into(), label: "Lower Bound".into() },
                BoundLevel { id: "mean".into(), label: "Mean".into() },
                BoundLevel { id: "upper".into(), label: "Upper".into() },
            ],
            dates: Vec::new(),
            defaults: Defaults {
                indicator: Some("ICUbed".into()),
                aggregation: Some("region".into()),
                bound_level: Some("mean".into()),
                per_capita: Some("population".into()),
            },
            classification: Classification {
                interpolation: Interpolation::Linear,
                ..Classification::default()
            },
            fallback_color: default_fallback(),
            population_property: default_population(),
            model_version: None,
        }
    }

    /// State ventilator-supply map: Jenks breaks computed from the loaded GeoJSON.
    pub fn ventilator_supply() -> Self {
        MapConfig {
            name: "Ventilator Supply".into(),
            key_scheme: KeyScheme::IndicatorSuffix,
            indicators: vec![Indicator {
                id: "vents_per_100k".into(),
                label: "Estimated Full-Featured Mechanical Ventilators per 100,000 Population".into(),
                property: Some(
                    "Estimated No. Full-Featured Mechanical Ventilators per 100,000 Population".into(),
                ),
                // ColorBrewer BuPu, 5 classes
                colors: ["#edf8fb", "#b3cde3", "#8c96c6", "#8856a7", "#810f7c"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                radii: Vec::new(),
                suppress_per_capita: true,
                display_as_percent: false,
                description: None,
            }],
            aggregations: vec![AggregationLevel {
                supports_per_capita: false,
                data_url: Some("hghi_state_data_with_vents.geojson".into()),
                ..AggregationLevel::new("state", "State", "State Name")
            }],
            per_capita: Vec::new(),
            bound_levels: Vec::new(),
            dates: Vec::new(),
            defaults: Defaults::default(),
            classification: Classification {
                source: BreaksSource::Computed,
                method: Method::Jenks,
                num_classes: 5,
                missing: MissingPolicy::Zero,
                interpolation: Interpolation::Step,
            },
            fallback_color: default_fallback(),
            population_property: default_population(),
            model_version: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for name in ["capacity", "ihme", "vents"] {
            let cfg = MapConfig::preset(name).unwrap();
            cfg.validate().unwrap();
        }
        assert!(MapConfig::preset("nope").is_none());
    }

    #[test]
    fn facility_level_never_per_capita() {
        let cfg = MapConfig::healthcare_capacity();
        let beds = cfg.indicator("staffed_icu_beds").unwrap();
        assert!(!cfg.allows_per_capita(beds, cfg.aggregation("facility").unwrap()));
        assert!(cfg.allows_per_capita(beds, cfg.aggregation("county").unwrap()));
        let rate = cfg.indicator("icu_bed_occupancy_rate").unwrap();
        assert!(!cfg.allows_per_capita(rate, cfg.aggregation("state").unwrap()));
    }

    #[test]
    fn default_date_prefers_today() {
        let mut cfg = MapConfig::ihme_projections();
        cfg.dates = vec!["2020-04-01".into(), "2020-04-02".into(), "2020-04-03".into()];
        let today = NaiveDate::from_ymd_opt(2020, 4, 2).unwrap();
        assert_eq!(cfg.default_date_index(today), 1);
        let later = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert_eq!(cfg.default_date_index(later), 2);
    }
}
