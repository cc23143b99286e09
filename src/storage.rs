use crate::config::AggregationLevel;
use crate::legend::format_number;
use crate::models::Feature;
use crate::paint::PaintStyle;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One feature as it appears on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedFeature {
    pub id: Option<String>,
    pub name: String,
    pub value: Option<f64>,
    pub display: String,
    pub class: Option<usize>,
    pub color: Option<String>,
}

pub fn classify_features(
    features: &[Feature],
    style: &PaintStyle,
    aggregation: &AggregationLevel,
) -> Vec<ClassifiedFeature> {
    let as_percent = style.resolved().map(|s| s.display_as_percent).unwrap_or(false);
    features
        .iter()
        .map(|f| {
            let value = style.value_of(f);
            ClassifiedFeature {
                id: f.id.clone(),
                name: f.display_name(aggregation.name_property.as_deref(), aggregation.include_state),
                value: value.value(),
                display: format_number(value, as_percent),
                class: style.classify(f),
                color: style.color_of(f).map(|c| c.to_hex()),
            }
        })
        .collect()
}

/// Save classified features as CSV with header.
pub fn save_csv<P: AsRef<Path>>(rows: &[ClassifiedFeature], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    wtr.serialize(("id", "name", "value", "display", "class", "color"))?;
    for r in rows {
        wtr.serialize((&r.id, &r.name, r.value, &r.display, r.class, &r.color))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Save any serializable value as pretty JSON.
pub fn save_json<T: Serialize + ?Sized, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let s = serde_json::to_string_pretty(value)?;
    f.write_all(s.as_bytes())?;
    Ok(())
}

/// The paint document handed to the renderer: `{ layer: { visible, paint, outline? } }`.
pub fn paint_document<'a, I>(styles: I) -> Value
where
    I: IntoIterator<Item = (&'a str, &'a PaintStyle)>,
{
    let mut doc = serde_json::Map::new();
    for (layer, style) in styles {
        let mut entry = serde_json::json!({
            "visible": style.is_visible(),
            "paint": style.to_expression(),
        });
        if let Some(outline) = style.outline_expression() {
            entry["outline"] = outline;
        }
        doc.insert(layer.to_string(), entry);
    }
    Value::Object(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerKind;
    use tempfile::tempdir;

    #[test]
    fn write_csv_and_json() {
        let dir = tempdir().unwrap();
        let csvp = dir.path().join("x.csv");
        let jsonp = dir.path().join("x.json");
        let rows = vec![ClassifiedFeature {
            id: Some("53033".into()),
            name: "King, WA".into(),
            value: Some(1.5),
            display: "1.50".into(),
            class: Some(2),
            color: Some("#4d7596".into()),
        }];
        save_csv(&rows, &csvp).unwrap();
        save_json(&rows, &jsonp).unwrap();
        let csv_text = std::fs::read_to_string(&csvp).unwrap();
        assert!(csv_text.starts_with("id,name,value,display,class,color"));
        assert!(csv_text.contains("\"King, WA\""));
        assert!(jsonp.exists());
    }

    #[test]
    fn hidden_layers_are_marked_invisible() {
        let hidden = PaintStyle::hidden(LayerKind::Circle);
        let doc = paint_document([("facility", &hidden)]);
        assert_eq!(doc["facility"]["visible"], Value::Bool(false));
        assert_eq!(doc["facility"]["paint"]["circle-radius"], 0);
        assert!(doc["facility"].get("outline").is_none());

        let state = PaintStyle::hidden(LayerKind::Fill);
        let doc = paint_document([("state", &state)]);
        assert_eq!(doc["state"]["outline"]["line-opacity"], 0);
    }
}
