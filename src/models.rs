use anyhow::{Context, Result, bail};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A property value that is either a usable number or "no data".
///
/// Source files mix numbers, numeric strings and nulls; everything that does not
/// parse to a finite number becomes `Missing` so it can never be confused with zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NumericValue {
    Present(f64),
    #[default]
    Missing,
}

impl NumericValue {
    /// Interpret a raw JSON property value.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Number(n) => n.as_f64().into(),
            Value::String(s) => s.trim().parse::<f64>().ok().into(),
            _ => NumericValue::Missing,
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            NumericValue::Present(v) => Some(v),
            NumericValue::Missing => None,
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, NumericValue::Present(_))
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        self.value().map(f).into()
    }
}

impl From<Option<f64>> for NumericValue {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(x) if x.is_finite() => NumericValue::Present(x),
            _ => NumericValue::Missing,
        }
    }
}

impl From<f64> for NumericValue {
    fn from(v: f64) -> Self {
        Some(v).into()
    }
}

impl Serialize for NumericValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

/// Accepts a JSON number, a numeric string or null.
impl<'de> Deserialize<'de> for NumericValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};
        struct NumericVisitor;

        impl<'de> Visitor<'de> for NumericVisitor {
            type Value = NumericValue;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "a number, a numeric string, or null")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(v.into())
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok((v as f64).into())
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok((v as f64).into())
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Self::Value, E> {
                Ok(s.trim().parse::<f64>().ok().into())
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
                Ok(NumericValue::Missing)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(NumericValue::Missing)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(NumericValue::Missing)
            }
        }

        deserializer.deserialize_any(NumericVisitor)
    }
}

/// How missing values are treated when building a series for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Leave missing values out of the series (they still render as "no data").
    #[default]
    Skip,
    /// Count missing values as zero in the series.
    Zero,
}

/// One geographic entity: a state, county, HRR, facility, country or region.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    pub geometry: Option<geojson::Geometry>,
}

impl Feature {
    pub fn new(id: Option<String>, properties: Map<String, Value>) -> Self {
        Self {
            id,
            properties,
            geometry: None,
        }
    }

    /// Numeric value of `property`; absent, null and non-numeric values are `Missing`.
    pub fn value(&self, property: &str) -> NumericValue {
        self.properties
            .get(property)
            .map(NumericValue::from_json)
            .unwrap_or_default()
    }

    /// Text value of `property` (numbers are rendered as-is).
    pub fn text(&self, property: &str) -> Option<String> {
        match self.properties.get(property)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Display name for popups and exports, e.g. `"King, WA"` for county features.
    pub fn display_name(&self, name_property: Option<&str>, include_state: bool) -> String {
        let mut name = name_property
            .and_then(|p| self.text(p))
            .or_else(|| self.id.clone())
            .unwrap_or_default();
        if include_state {
            if let Some(state) = self.text("State") {
                name.push_str(", ");
                name.push_str(&state);
            }
        }
        name
    }
}

/// All features loaded for one aggregation level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub features: Vec<Feature>,
}

impl Dataset {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// Parse a dataset from any of the shapes the map data files use:
    /// - a GeoJSON `FeatureCollection` (or single `Feature`)
    /// - a JSON array of property objects
    /// - a JSON object keyed by feature id whose values are property objects
    pub fn from_json_value(v: Value) -> Result<Self> {
        let is_geojson = v
            .get("type")
            .and_then(Value::as_str)
            .map(|t| t == "FeatureCollection" || t == "Feature")
            .unwrap_or(false);
        if is_geojson {
            let gj: GeoJson = serde_json::from_value(v).context("parse geojson")?;
            return Ok(Self::from_geojson(gj));
        }

        match v {
            Value::Array(items) => {
                let mut features = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        Value::Object(props) => {
                            let id = props.get("id").and_then(id_string);
                            features.push(Feature::new(id, props));
                        }
                        other => bail!("dataset entry {} is not an object: {}", i, other),
                    }
                }
                Ok(Self::new(features))
            }
            Value::Object(map) => {
                let mut features = Vec::with_capacity(map.len());
                for (id, item) in map {
                    match item {
                        Value::Object(props) => features.push(Feature::new(Some(id), props)),
                        other => bail!("dataset entry '{}' is not an object: {}", id, other),
                    }
                }
                Ok(Self::new(features))
            }
            other => bail!("unsupported dataset shape: {}", json_kind(&other)),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let v: Value = serde_json::from_str(s).context("decode dataset json")?;
        Self::from_json_value(v)
    }

    fn from_geojson(gj: GeoJson) -> Self {
        let features = match gj {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(g) => vec![geojson::Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
        };
        Self::new(
            features
                .into_iter()
                .map(|f| Feature {
                    id: f.id.map(|id| match id {
                        geojson::feature::Id::String(s) => s,
                        geojson::feature::Id::Number(n) => n.to_string(),
                    }),
                    properties: f.properties.unwrap_or_default(),
                    geometry: f.geometry,
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Collect the numeric series used for classification.
pub fn extract_series<I>(values: I, policy: MissingPolicy) -> Vec<f64>
where
    I: IntoIterator<Item = NumericValue>,
{
    values
        .into_iter()
        .filter_map(|v| match (v, policy) {
            (NumericValue::Present(x), _) => Some(x),
            (NumericValue::Missing, MissingPolicy::Zero) => Some(0.0),
            (NumericValue::Missing, MissingPolicy::Skip) => None,
        })
        .collect()
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_value_accepts_numbers_strings_and_null() {
        assert_eq!(NumericValue::from_json(&json!(3)), NumericValue::Present(3.0));
        assert_eq!(NumericValue::from_json(&json!(" 2.5 ")), NumericValue::Present(2.5));
        assert_eq!(NumericValue::from_json(&json!("n/a")), NumericValue::Missing);
        assert_eq!(NumericValue::from_json(&json!(null)), NumericValue::Missing);
        assert_eq!(NumericValue::from_json(&json!(true)), NumericValue::Missing);

        let v: Vec<NumericValue> = serde_json::from_str(r#"[1, "4", null, "x"]"#).unwrap();
        assert_eq!(
            v,
            vec![
                NumericValue::Present(1.0),
                NumericValue::Present(4.0),
                NumericValue::Missing,
                NumericValue::Missing
            ]
        );
    }

    #[test]
    fn series_policy_skip_vs_zero() {
        let vals = [NumericValue::Present(2.0), NumericValue::Missing];
        assert_eq!(extract_series(vals, MissingPolicy::Skip), vec![2.0]);
        assert_eq!(extract_series(vals, MissingPolicy::Zero), vec![2.0, 0.0]);
    }

    #[test]
    fn dataset_from_keyed_object() {
        let ds = Dataset::from_json_value(json!({
            "USA": {"population": 330000000},
            "CAN": {"population": "38000000"}
        }))
        .unwrap();
        assert_eq!(ds.len(), 2);
        let can = ds.features.iter().find(|f| f.id.as_deref() == Some("CAN")).unwrap();
        assert_eq!(can.value("population"), NumericValue::Present(38_000_000.0));
    }
}
