//! Paint styles for map layers.
//!
//! A layer's style is rebuilt from scratch on every selection change:
//! [`plan`] resolves what to show, [`resolve_breaks`] classifies it, [`assemble`] builds
//! the lookups, and [`PaintStyle::to_expression`] renders the Mapbox-style paint object.
//! The same lookups answer per-feature queries ([`PaintStyle::color_of`] and friends),
//! so the declarative expression and the eager path cannot drift apart.

use crate::breaks::{BreaksTable, compute_breaks, separate_equal_breaks};
use crate::color::{ColorRamp, Rgb8};
use crate::config::{BreaksSource, Classification, LayerKind, MapConfig};
use crate::error::{Result, StyleError};
use crate::key::KeyParts;
use crate::models::{Feature, NumericValue, extract_series};
use crate::normalize::Normalization;
use crate::selection::SelectionState;
use crate::style::{ColorLookup, Interpolation, RadiusLookup, RadiusTier};
use serde_json::{Value, json};

/// Where a layer reads its value from.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSource {
    pub property: String,
    pub normalization: Normalization,
}

impl ValueSource {
    pub fn value_of(&self, feature: &Feature) -> NumericValue {
        self.normalization.apply(feature, &self.property)
    }

    /// Expression evaluating to the (normalized) value.
    pub fn value_expression(&self) -> Value {
        let raw = json!(["to-number", ["get", self.property]]);
        match &self.normalization {
            Normalization::None => raw,
            Normalization::Derived {
                base,
                population_property,
            } => json!([
                "/",
                raw,
                ["/", ["to-number", ["get", population_property]], base.unwrap_or(0.0)]
            ]),
        }
    }

    /// Expression that is true exactly when [`ValueSource::value_of`] is present.
    pub fn guard_expression(&self) -> Value {
        let mut all = vec![json!("all")];
        all.extend(numeric_checks(&self.property));
        if let Normalization::Derived {
            base,
            population_property,
        } = &self.normalization
        {
            all.extend(numeric_checks(population_property));
            all.push(json!([">", ["to-number", ["get", population_property]], 0]));
            // no base means no per-capita value for anyone
            if base.is_none_or(|b| b <= 0.0) {
                all.push(json!(false));
            }
        }
        Value::Array(all)
    }
}

/// Checks that `property` holds a finite number or a string that parses as one,
/// mirroring [`NumericValue::from_json`]. Order matters: `all` short-circuits and
/// `to-number` fails on text that is not a number.
fn numeric_checks(property: &str) -> Vec<Value> {
    let get = json!(["get", property]);
    vec![
        json!(["has", property]),
        json!(["match", ["typeof", get], ["number", "string"], true, false]),
        // blank strings convert to 0 in the renderer
        json!([
            "!",
            [
                "all",
                ["==", ["to-number", ["concat", get, "2"], 0], 2],
                ["==", ["to-number", ["concat", "2", get], 0], 2]
            ]
        ]),
        json!(["==", ["to-number", get, 0], ["to-number", get, 1]]),
        json!(["<=", ["abs", ["to-number", get]], f64::MAX]),
    ]
}

/// Everything needed to style one layer for one selection.
#[derive(Debug, Clone, PartialEq)]
pub struct StylePlan {
    pub layer: String,
    pub kind: LayerKind,
    pub source: ValueSource,
    /// Key into a precomputed [`BreaksTable`].
    pub breaks_key: String,
    pub per_capita: bool,
    pub title: String,
    pub display_as_percent: bool,
    pub ramp: ColorRamp,
    pub radii: Vec<RadiusTier>,
    pub fallback: Rgb8,
    pub classification: Classification,
}

impl StylePlan {
    /// Identity of the breaks this plan produces; used for caching.
    pub fn cache_key(&self) -> String {
        let norm = match &self.source.normalization {
            Normalization::None => "none".to_string(),
            Normalization::Derived {
                base,
                population_property,
            } => format!("{}:{:?}", population_property, base),
        };
        format!(
            "{}|{}|{}|{}",
            self.layer, self.breaks_key, self.source.property, norm
        )
    }
}

/// Resolve the plan for `layer`. `Ok(None)` means the layer is not the active
/// aggregation and should be hidden.
pub fn plan(config: &MapConfig, selection: &SelectionState, layer: &str) -> Result<Option<StylePlan>> {
    let aggregation = config.aggregation(layer)?;
    let indicator = config.indicator(&selection.indicator)?;
    if selection.aggregation != layer {
        return Ok(None);
    }

    let scheme = config.key_scheme;
    // The requested basis survives while gated off; it just has no effect.
    let basis = match &selection.per_capita {
        Some(id) if config.allows_per_capita(indicator, aggregation) => {
            Some(config.per_capita_basis(id)?)
        }
        _ => None,
    };
    let date = if scheme.uses_date() {
        Some(config.date(selection.date_index)?)
    } else {
        None
    };
    let bound = match selection
        .bound_level
        .as_deref()
        .or(config.defaults.bound_level.as_deref())
    {
        Some(id) if scheme.uses_date() => Some(config.bound_level(id)?),
        _ => None,
    };

    let per_capita_suffix = match basis {
        Some(b) if !scheme.derives_per_capita() => Some(b.suffix.as_str()),
        _ => None,
    };
    let parts = KeyParts {
        indicator: indicator.property_name(),
        date,
        bound_level: bound.map(|b| b.id.as_str()),
        per_capita_suffix,
    };
    let per_capita = basis.is_some();
    let normalization = if per_capita && scheme.derives_per_capita() {
        if aggregation.per_capita_base.is_none() {
            log::warn!("layer '{}' has no per-capita base; values will be missing", layer);
        }
        Normalization::Derived {
            base: aggregation.per_capita_base,
            population_property: config.population_property.clone(),
        }
    } else {
        Normalization::None
    };

    let mut title = indicator.label.clone();
    if let Some(b) = basis {
        title.push(' ');
        title.push_str(&b.label);
    }
    if let Some(b) = bound {
        title.push_str(&format!(" ({})", b.label));
    }

    Ok(Some(StylePlan {
        layer: layer.to_string(),
        kind: aggregation.kind,
        source: ValueSource {
            property: scheme.property_key(&parts),
            normalization,
        },
        breaks_key: scheme.breaks_key(&parts, per_capita),
        per_capita,
        title,
        display_as_percent: indicator.display_as_percent,
        ramp: indicator.ramp()?,
        radii: indicator.radius_tiers(),
        fallback: config.fallback(),
        classification: config.classification,
    }))
}

/// Class breaks for a plan: the precomputed entry when there is one, otherwise
/// breaks classified from `features`.
pub fn resolve_breaks(
    plan: &StylePlan,
    features: &[Feature],
    precomputed: Option<&BreaksTable>,
) -> Result<Vec<f64>> {
    if plan.classification.source == BreaksSource::Precomputed {
        if let Some(b) = precomputed.and_then(|t| t.get(&plan.breaks_key)) {
            if b.len() >= 2 {
                log::debug!("using precomputed breaks '{}'", plan.breaks_key);
                return Ok(separate_equal_breaks(b));
            }
        }
        log::debug!(
            "no precomputed breaks for '{}'; classifying {} features",
            plan.breaks_key,
            features.len()
        );
    }
    let series = extract_series(
        features.iter().map(|f| plan.source.value_of(f)),
        plan.classification.missing,
    );
    let breaks = compute_breaks(
        &series,
        plan.classification.num_classes,
        plan.classification.method,
    )?;
    Ok(separate_equal_breaks(&breaks))
}

/// Build the lookups for a plan and its breaks.
pub fn assemble(plan: StylePlan, breaks: Vec<f64>) -> Result<ResolvedStyle> {
    let colors = ColorLookup::new(
        plan.classification.interpolation,
        &breaks,
        &plan.ramp,
        plan.fallback,
    )?;
    let radius = match plan.kind {
        LayerKind::Circle => Some(RadiusLookup::new(&breaks, &plan.radii)?),
        LayerKind::Fill => None,
    };
    Ok(ResolvedStyle {
        layer: plan.layer,
        kind: plan.kind,
        source: plan.source,
        breaks_key: plan.breaks_key,
        per_capita: plan.per_capita,
        title: plan.title,
        display_as_percent: plan.display_as_percent,
        colors,
        radius,
    })
}

/// Turn a breaks result into a style; a series without numbers hides the layer.
pub(crate) fn finish(plan: StylePlan, breaks: Result<Vec<f64>>) -> Result<PaintStyle> {
    match breaks {
        Ok(b) => Ok(PaintStyle::Styled(Box::new(assemble(plan, b)?))),
        Err(StyleError::InsufficientData) => {
            log::warn!(
                "layer '{}': no numeric values for '{}', hiding it",
                plan.layer,
                plan.source.property
            );
            Ok(PaintStyle::hidden(plan.kind))
        }
        Err(e) => Err(e),
    }
}

/// Style `layer` for `selection` without any caching.
pub fn build_style(
    features: &[Feature],
    selection: &SelectionState,
    config: &MapConfig,
    layer: &str,
    precomputed: Option<&BreaksTable>,
) -> Result<PaintStyle> {
    let aggregation = config.aggregation(layer)?;
    let Some(plan) = plan(config, selection, layer)? else {
        return Ok(PaintStyle::hidden(aggregation.kind));
    };
    let precomputed = precomputed.or(aggregation.breaks.as_ref());
    let breaks = resolve_breaks(&plan, features, precomputed);
    finish(plan, breaks)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    pub layer: String,
    pub kind: LayerKind,
    pub source: ValueSource,
    pub breaks_key: String,
    pub per_capita: bool,
    pub title: String,
    pub display_as_percent: bool,
    pub colors: ColorLookup,
    pub radius: Option<RadiusLookup>,
}

impl ResolvedStyle {
    pub fn breaks(&self) -> &[f64] {
        self.colors.breaks()
    }

    fn color_expression(&self) -> Value {
        let value = self.source.value_expression();
        let breaks = self.colors.breaks();
        let colors = self.colors.colors();
        let mut expr = Vec::new();
        match self.colors.mode() {
            Interpolation::Step => {
                expr.push(json!("step"));
                expr.push(value);
                expr.push(json!(colors[0].to_hex()));
                for (b, c) in breaks[1..colors.len()].iter().zip(&colors[1..]) {
                    expr.push(json!(b));
                    expr.push(json!(c.to_hex()));
                }
            }
            Interpolation::Linear => {
                expr.push(json!("interpolate"));
                expr.push(json!(["linear"]));
                expr.push(value);
                for (b, c) in breaks.iter().zip(colors) {
                    expr.push(json!(b));
                    expr.push(json!(c.to_hex()));
                }
            }
        }
        json!([
            "case",
            self.source.guard_expression(),
            Value::Array(expr),
            self.colors.fallback().to_hex()
        ])
    }

    fn radius_expression(&self, radius: &RadiusLookup) -> Value {
        let (low, high) = radius.domain();
        let mut expr = vec![json!("interpolate"), json!(["linear"]), json!(["zoom"])];
        for tier in radius.tiers() {
            let by_value = if high > low {
                json!([
                    "interpolate",
                    ["linear"],
                    self.source.value_expression(),
                    low,
                    tier.min,
                    high,
                    tier.max
                ])
            } else {
                json!(["step", self.source.value_expression(), tier.min, high, tier.max])
            };
            expr.push(json!(tier.zoom));
            expr.push(json!(["case", self.source.guard_expression(), by_value, 0]));
        }
        Value::Array(expr)
    }

    fn zoom_ramp(radius: &RadiusLookup, from: f64, to: f64) -> Value {
        match (radius.tiers().first(), radius.tiers().last()) {
            (Some(a), Some(b)) if b.zoom > a.zoom => {
                json!(["interpolate", ["linear"], ["zoom"], a.zoom, from, b.zoom, to])
            }
            _ => json!(to),
        }
    }
}

/// Zoom levels between which outline width grows.
const OUTLINE_ZOOM: (f64, f64) = (3.0, 10.0);

/// The current style of one layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintStyle {
    /// Inactive or without data: drawn fully transparent.
    Hidden { kind: LayerKind },
    Styled(Box<ResolvedStyle>),
}

impl PaintStyle {
    pub fn hidden(kind: LayerKind) -> Self {
        PaintStyle::Hidden { kind }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, PaintStyle::Styled(_))
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            PaintStyle::Hidden { kind } => *kind,
            PaintStyle::Styled(s) => s.kind,
        }
    }

    pub fn resolved(&self) -> Option<&ResolvedStyle> {
        match self {
            PaintStyle::Hidden { .. } => None,
            PaintStyle::Styled(s) => Some(s),
        }
    }

    /// Mapbox GL paint properties for this layer.
    pub fn to_expression(&self) -> Value {
        match self {
            PaintStyle::Hidden {
                kind: LayerKind::Fill,
            } => json!({ "fill-color": "transparent" }),
            PaintStyle::Hidden {
                kind: LayerKind::Circle,
            } => json!({ "circle-radius": 0, "circle-color": "transparent" }),
            PaintStyle::Styled(s) => match (&s.kind, &s.radius) {
                (LayerKind::Circle, Some(radius)) => json!({
                    "circle-radius": s.radius_expression(radius),
                    "circle-color": s.color_expression(),
                    "circle-stroke-color": "#000",
                    "circle-stroke-width": ResolvedStyle::zoom_ramp(radius, 0.5, 1.0),
                    "circle-opacity": ResolvedStyle::zoom_ramp(radius, 0.5, 1.0),
                }),
                _ => json!({ "fill-color": s.color_expression() }),
            },
        }
    }

    /// Paint of the boundary line drawn over a fill layer; `None` for circle layers.
    pub fn outline_expression(&self) -> Option<Value> {
        if self.kind() != LayerKind::Fill {
            return None;
        }
        if !self.is_visible() {
            return Some(json!({ "line-opacity": 0 }));
        }
        Some(json!({
            "line-width": ["interpolate", ["linear"], ["zoom"], OUTLINE_ZOOM.0, 0.5, OUTLINE_ZOOM.1, 3],
            "line-color": "#000",
            "line-opacity": 0.25,
        }))
    }

    pub fn value_of(&self, feature: &Feature) -> NumericValue {
        match self {
            PaintStyle::Hidden { .. } => NumericValue::Missing,
            PaintStyle::Styled(s) => s.source.value_of(feature),
        }
    }

    /// Fill color of `feature`; `None` when the layer is hidden.
    pub fn color_of(&self, feature: &Feature) -> Option<Rgb8> {
        let s = self.resolved()?;
        Some(s.colors.color_for(s.source.value_of(feature)))
    }

    /// Circle radius of `feature` at `zoom`; 0 for hidden layers and fill layers.
    pub fn radius_of(&self, feature: &Feature, zoom: f64) -> f64 {
        match self.resolved() {
            Some(ResolvedStyle {
                radius: Some(r),
                source,
                ..
            }) => r.radius(source.value_of(feature), zoom),
            _ => 0.0,
        }
    }

    /// Class index of `feature`, or `None` for missing values and hidden layers.
    pub fn classify(&self, feature: &Feature) -> Option<usize> {
        let s = self.resolved()?;
        let v = s.source.value_of(feature).value()?;
        Some(s.colors.class_index(v))
    }
}
