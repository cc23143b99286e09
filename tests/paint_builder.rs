use ccm_style::breaks::BreaksTable;
use ccm_style::config::{AggregationOverride, BreaksSource, LayerKind, RuntimeConfig};
use ccm_style::style::Interpolation;
use ccm_style::{Feature, MapConfig, NumericValue, PaintStyle, SelectionState, build_style};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

fn feature(id: &str, props: Value) -> Feature {
    let Value::Object(map) = props else {
        panic!("properties must be an object")
    };
    Feature::new(Some(id.to_string()), map)
}

/// Number conversion as the renderer does it for strings: trimmed, blank is 0,
/// and text that is not a number fails.
fn renderer_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return Some(0.0);
    }
    let lower = t.to_ascii_lowercase();
    if lower.contains("inf") || lower.contains("nan") {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn same(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Evaluates the subset of the Mapbox expression language the paint builder emits.
fn eval(expr: &Value, props: &Map<String, Value>) -> Value {
    let Some(items) = expr.as_array() else {
        return expr.clone();
    };
    let op = items[0].as_str().expect("operator");
    let num = |e: &Value| eval(e, props).as_f64().expect("number");
    match op {
        "get" => props
            .get(items[1].as_str().unwrap())
            .cloned()
            .unwrap_or(Value::Null),
        "has" => Value::Bool(props.contains_key(items[1].as_str().unwrap())),
        "typeof" => json!(match eval(&items[1], props) {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }),
        "to-number" => {
            for arg in &items[1..] {
                let converted = match eval(arg, props) {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => renderer_number(&s),
                    Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
                    Value::Null => Some(0.0),
                    _ => None,
                };
                if let Some(v) = converted {
                    return json!(v);
                }
            }
            panic!("to-number failed for {expr}")
        }
        "concat" => Value::String(
            items[1..]
                .iter()
                .map(|e| match eval(e, props) {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        ),
        "abs" => json!(num(&items[1]).abs()),
        "/" => json!(num(&items[1]) / num(&items[2])),
        "==" => Value::Bool(same(&eval(&items[1], props), &eval(&items[2], props))),
        ">" => Value::Bool(num(&items[1]) > num(&items[2])),
        "<=" => Value::Bool(num(&items[1]) <= num(&items[2])),
        "!" => Value::Bool(eval(&items[1], props) != Value::Bool(true)),
        "all" => Value::Bool(items[1..].iter().all(|e| eval(e, props) == Value::Bool(true))),
        "match" => {
            let input = eval(&items[1], props);
            let mut i = 2;
            while i + 1 < items.len() {
                let hit = match &items[i] {
                    Value::Array(labels) => labels.iter().any(|l| same(l, &input)),
                    label => same(label, &input),
                };
                if hit {
                    return eval(&items[i + 1], props);
                }
                i += 2;
            }
            eval(&items[items.len() - 1], props)
        }
        "case" => {
            let mut i = 1;
            while i + 1 < items.len() {
                if eval(&items[i], props) == Value::Bool(true) {
                    return eval(&items[i + 1], props);
                }
                i += 2;
            }
            eval(&items[items.len() - 1], props)
        }
        "step" => {
            let input = num(&items[1]);
            let mut out = eval(&items[2], props);
            let mut i = 3;
            while i + 1 < items.len() {
                if input >= num(&items[i]) {
                    out = eval(&items[i + 1], props);
                }
                i += 2;
            }
            out
        }
        other => panic!("unsupported operator {other}"),
    }
}

fn ihme_config() -> MapConfig {
    let mut aggregations = BTreeMap::new();
    aggregations.insert(
        "region".to_string(),
        AggregationOverride {
            per_capita_base: Some(100_000.0),
            breaks: None,
        },
    );
    let mut cfg = MapConfig::ihme_projections().with_runtime(RuntimeConfig {
        dates: vec!["2020-04-02".into(), "2020-04-01".into(), "2020-04-02".into()],
        aggregations,
        model_version: Some("2020_04_05.05.us".into()),
    });
    cfg.classification.interpolation = Interpolation::Step;
    cfg
}

fn ihme_features() -> Vec<Feature> {
    vec![
        feature("WA", json!({"2020-04-02_ICUbed_mean": 120, "population": 7_600_000})),
        feature("NY", json!({"2020-04-02_ICUbed_mean": 4800, "population": 19_450_000})),
        feature("CA", json!({"2020-04-02_ICUbed_mean": "900", "population": 39_500_000})),
        feature("LA", json!({"2020-04-02_ICUbed_mean": 700, "population": 4_650_000})),
        feature("VT", json!({"2020-04-02_ICUbed_mean": 9, "population": 620_000})),
        feature("XX", json!({"2020-04-02_ICUbed_mean": 50, "population": 0})),
        feature("YY", json!({"2020-04-02_ICUbed_mean": 50})),
        feature("ZZ", json!({"population": 1_000_000})),
        feature("NA", json!({"2020-04-02_ICUbed_mean": 50, "population": "n/a"})),
        feature("TB", json!({"2020-04-02_ICUbed_mean": 50, "population": true})),
    ]
}

fn ihme_selection() -> SelectionState {
    SelectionState {
        indicator: "ICUbed".into(),
        aggregation: "region".into(),
        per_capita: Some("population".into()),
        bound_level: Some("mean".into()),
        date_index: 1,
    }
}

#[test]
fn declarative_and_eager_per_capita_agree() {
    let cfg = ihme_config();
    assert_eq!(cfg.dates, vec!["2020-04-01", "2020-04-02"]);
    let features = ihme_features();
    let style = build_style(&features, &ihme_selection(), &cfg, "region", None).unwrap();
    assert!(style.is_visible());

    let paint = style.to_expression();
    let fill = &paint["fill-color"];
    for f in &features {
        let declarative = eval(fill, &f.properties);
        let eager = style.color_of(f).unwrap().to_hex();
        assert_eq!(declarative, json!(eager), "feature {:?}", f.id);
    }

    let wa = &features[0];
    let expected = 120.0 / (7_600_000.0 / 100_000.0);
    assert_eq!(style.value_of(wa), NumericValue::Present(expected));
    for missing in &features[5..] {
        assert_eq!(style.value_of(missing), NumericValue::Missing);
        assert_eq!(style.color_of(missing).unwrap().to_hex(), "#cccccc");
    }
}

#[test]
fn text_and_boolean_values_get_the_no_data_color() {
    let cfg = MapConfig::healthcare_capacity();
    let sel = SelectionState {
        indicator: "staffed_all_beds".into(),
        aggregation: "state".into(),
        per_capita: None,
        bound_level: None,
        date_index: 0,
    };
    let mut table = BreaksTable::new();
    table.insert("Staffed All Beds", vec![0.0, 10.0, 20.0, 30.0, 40.0]);
    let style = build_style(&[], &sel, &cfg, "state", Some(&table)).unwrap();
    let fill = &style.to_expression()["fill-color"];

    let numeric = [json!(5), json!(35.5), json!("25"), json!("  12 "), json!(0)];
    let malformed = [
        json!("n/a"),
        json!(true),
        json!(false),
        json!(""),
        json!("   "),
        json!("NaN"),
        Value::Null,
    ];
    for v in numeric.iter().chain(&malformed) {
        let f = feature("X", json!({"Staffed All Beds": v}));
        let eager = style.color_of(&f).unwrap().to_hex();
        assert_eq!(eval(fill, &f.properties), json!(eager), "value {v}");
    }
    for v in &malformed {
        let f = feature("X", json!({"Staffed All Beds": v}));
        assert_eq!(style.color_of(&f).unwrap().to_hex(), "#cccccc", "value {v}");
    }
    let twelve = feature("X", json!({"Staffed All Beds": "  12 "}));
    assert_eq!(style.classify(&twelve), Some(1));
}

#[test]
fn fill_layers_get_an_outline() {
    let cfg = MapConfig::healthcare_capacity();
    let sel = SelectionState {
        indicator: "staffed_all_beds".into(),
        aggregation: "state".into(),
        per_capita: None,
        bound_level: None,
        date_index: 0,
    };
    let mut table = BreaksTable::new();
    table.insert("Staffed All Beds", vec![0.0, 10.0, 20.0, 30.0, 40.0]);
    let state = build_style(&[], &sel, &cfg, "state", Some(&table)).unwrap();
    assert_eq!(
        state.outline_expression(),
        Some(json!({
            "line-width": ["interpolate", ["linear"], ["zoom"], 3.0, 0.5, 10.0, 3],
            "line-color": "#000",
            "line-opacity": 0.25,
        }))
    );
    let county = build_style(&[], &sel, &cfg, "county", None).unwrap();
    assert_eq!(county.outline_expression(), Some(json!({"line-opacity": 0})));
    let facility = build_style(&[], &sel, &cfg, "facility", None).unwrap();
    assert_eq!(facility.outline_expression(), None);
}

#[test]
fn dated_keys_pick_the_selected_day() {
    let cfg = ihme_config();
    let mut sel = ihme_selection();
    sel.per_capita = None;
    sel.date_index = 0;
    // no values for 2020-04-01 in the fixture
    let style = build_style(&ihme_features(), &sel, &cfg, "region", None).unwrap();
    assert_eq!(style, PaintStyle::hidden(LayerKind::Fill));

    sel.date_index = 7;
    assert!(build_style(&ihme_features(), &sel, &cfg, "region", None).is_err());
}

#[test]
fn precomputed_breaks_drive_the_step_expression() {
    let cfg = MapConfig::healthcare_capacity();
    let sel = SelectionState {
        indicator: "staffed_all_beds".into(),
        aggregation: "state".into(),
        per_capita: Some("people".into()),
        bound_level: None,
        date_index: 0,
    };
    let mut table = BreaksTable::new();
    table.insert("Staffed All Beds [Per 1000 People]", vec![0.0, 1.5, 2.0, 2.5, 6.0]);
    let style = build_style(&[], &sel, &cfg, "state", Some(&table)).unwrap();

    let paint = style.to_expression();
    let case = paint["fill-color"].as_array().unwrap();
    assert_eq!(case[0], "case");
    assert_eq!(case[3], "#cccccc");
    assert_eq!(
        case[2],
        json!([
            "step",
            ["to-number", ["get", "Staffed All Beds [Per 1000 People]"]],
            "#fff7fb", 1.5, "#9db5ce", 2.0, "#4d7596", 2.5, "#023858"
        ])
    );
}

#[test]
fn inactive_layers_are_transparent() {
    let cfg = MapConfig::healthcare_capacity();
    let sel = SelectionState {
        indicator: "staffed_icu_beds".into(),
        aggregation: "county".into(),
        per_capita: None,
        bound_level: None,
        date_index: 0,
    };
    let state = build_style(&[], &sel, &cfg, "state", None).unwrap();
    assert_eq!(state.to_expression(), json!({"fill-color": "transparent"}));
    let facility = build_style(&[], &sel, &cfg, "facility", None).unwrap();
    assert_eq!(
        facility.to_expression(),
        json!({"circle-radius": 0, "circle-color": "transparent"})
    );
}

#[test]
fn facility_layer_gets_zoom_tiered_circles() {
    let mut cfg = MapConfig::healthcare_capacity();
    cfg.classification.source = BreaksSource::Computed;
    let sel = SelectionState {
        indicator: "icu_bed_occupancy_rate".into(),
        aggregation: "facility".into(),
        // facility level never normalizes
        per_capita: Some("people".into()),
        bound_level: None,
        date_index: 0,
    };
    let features: Vec<Feature> = [0.1, 0.4, 0.5, 0.7, 0.9]
        .iter()
        .enumerate()
        .map(|(i, v)| feature(&i.to_string(), json!({"ICU Bed Occupancy Rate": v})))
        .collect();
    let style = build_style(&features, &sel, &cfg, "facility", None).unwrap();
    let paint = style.to_expression();

    assert_eq!(paint["circle-stroke-color"], "#000");
    assert_eq!(
        paint["circle-opacity"],
        json!(["interpolate", ["linear"], ["zoom"], 3.0, 0.5, 10.0, 1.0])
    );
    let radius = paint["circle-radius"].as_array().unwrap();
    assert_eq!(radius[2], json!(["zoom"]));
    assert_eq!(radius[3], json!(3.0));
    assert_eq!(radius[5], json!(10.0));

    assert_eq!(style.radius_of(&features[0], 3.0), 1.0);
    assert_eq!(style.radius_of(&features[4], 10.0), 40.0);
    let s = style.resolved().unwrap();
    assert_eq!(s.source.property, "ICU Bed Occupancy Rate");
    assert!(!s.per_capita);
}

#[test]
fn per_capita_toggle_is_inert_for_rates() {
    let cfg = MapConfig::healthcare_capacity();
    let mut table = BreaksTable::new();
    table.insert("All Bed Occupancy Rate", vec![0.0, 0.5, 0.7, 0.85, 1.0]);
    let mut sel = SelectionState {
        indicator: "all_bed_occupancy_rate".into(),
        aggregation: "state".into(),
        per_capita: None,
        bound_level: None,
        date_index: 0,
    };
    let totals = build_style(&[], &sel, &cfg, "state", Some(&table)).unwrap();
    sel.per_capita = Some("adults".into());
    let toggled = build_style(&[], &sel, &cfg, "state", Some(&table)).unwrap();
    assert_eq!(totals, toggled);
    assert_eq!(totals.to_expression(), toggled.to_expression());
}

#[test]
fn no_numeric_data_hides_only_that_layer() {
    let cfg = MapConfig::ventilator_supply();
    let sel = SelectionState {
        indicator: "vents_per_100k".into(),
        aggregation: "state".into(),
        per_capita: None,
        bound_level: None,
        date_index: 0,
    };
    let empty = vec![feature("AK", json!({"State Name": "Alaska"}))];
    // missing counts as zero on this map, so a single zero is still classifiable
    let style = build_style(&empty, &sel, &cfg, "state", None).unwrap();
    assert!(style.is_visible());
    assert!(build_style(&[], &sel, &cfg, "state", None).unwrap() == PaintStyle::hidden(LayerKind::Fill));
}
