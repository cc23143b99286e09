use ccm_style::config::{BreaksSource, LayerKind, RuntimeConfig};
use ccm_style::key::KeyScheme;
use ccm_style::{MapConfig, Method, MissingPolicy, StyleError};
use chrono::NaiveDate;

#[test]
fn runtime_config_merges_into_a_new_config() {
    let runtime = RuntimeConfig::from_json_str(
        r#"{
            "dates": ["2020-04-03", "2020-04-01", "2020-04-02", "2020-04-01"],
            "model_version": "2020_04_09.04",
            "aggregations": {
                "country": {"per_capita_base": 1000000},
                "region": {
                    "per_capita_base": 100000,
                    "breaks": {"totals": {"ICUbed": {"mean": [0, 10, 100, 1000, 5000, 20000]}}}
                },
                "planet": {"per_capita_base": 1}
            }
        }"#,
    )
    .unwrap();
    let base = MapConfig::ihme_projections();
    let cfg = base.clone().with_runtime(runtime);

    assert_eq!(cfg.dates, vec!["2020-04-01", "2020-04-02", "2020-04-03"]);
    assert_eq!(cfg.model_version.as_deref(), Some("2020_04_09.04"));
    assert_eq!(cfg.aggregation("country").unwrap().per_capita_base, Some(1e6));
    let region = cfg.aggregation("region").unwrap();
    assert_eq!(region.per_capita_base, Some(1e5));
    let breaks = region.breaks.as_ref().unwrap();
    assert_eq!(breaks.get("totals/ICUbed/mean").unwrap().len(), 6);
    // the original is untouched
    assert!(base.dates.is_empty());
    assert!(base.aggregation("region").unwrap().breaks.is_none());
}

#[test]
fn default_date_is_today_or_latest() {
    let mut cfg = MapConfig::ihme_projections();
    cfg.dates = vec!["2020-04-01".into(), "2020-04-02".into(), "2020-04-03".into()];
    assert_eq!(cfg.default_date_index(NaiveDate::from_ymd_opt(2020, 4, 1).unwrap()), 0);
    assert_eq!(cfg.default_date_index(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()), 2);
    assert_eq!(cfg.date(2).unwrap(), "2020-04-03");
    assert_eq!(
        cfg.date(3),
        Err(StyleError::DateOutOfRange { index: 3, len: 3 })
    );
}

#[test]
fn presets_carry_the_map_tables() {
    let cap = MapConfig::healthcare_capacity();
    assert_eq!(cap.key_scheme, KeyScheme::IndicatorSuffix);
    assert_eq!(cap.aggregation("facility").unwrap().kind, LayerKind::Circle);
    assert!(cap.aggregation("county").unwrap().include_state);
    assert_eq!(
        cap.aggregation("hrr").unwrap().breaks_url.as_deref(),
        Some("data/config/ccm_hrr_breaks.json")
    );
    assert_eq!(cap.per_capita_basis("adults").unwrap().suffix, " [Per 1000 Adults (20+)]");
    assert!(cap.indicator("all_bed_occupancy_rate").unwrap().display_as_percent);

    let ihme = MapConfig::ihme_projections();
    assert_eq!(ihme.key_scheme, KeyScheme::DateIndicatorBound);
    assert_eq!(ihme.indicators.len(), 9);
    assert_eq!(ihme.defaults.aggregation.as_deref(), Some("region"));
    assert_eq!(ihme.bound_level("upper").unwrap().label, "Upper");

    let vents = MapConfig::ventilator_supply();
    assert_eq!(vents.classification.method, Method::Jenks);
    assert_eq!(vents.classification.source, BreaksSource::Computed);
    assert_eq!(vents.classification.missing, MissingPolicy::Zero);
    assert_eq!(vents.indicators[0].colors.len(), 5);
}

#[test]
fn json_config_round_trips_through_validation() {
    let text = serde_json::to_string(&MapConfig::healthcare_capacity()).unwrap();
    let back = MapConfig::from_json_str(&text).unwrap();
    assert_eq!(back, MapConfig::healthcare_capacity());
}

#[test]
fn bad_config_is_rejected() {
    let err = MapConfig::from_json_str(
        r##"{
            "name": "broken",
            "indicators": [{"id": "beds", "label": "Beds", "colors": ["#fff", "not-a-color"]}],
            "aggregations": [{"id": "state", "label": "State"}]
        }"##,
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("not-a-color"));

    let err = MapConfig::from_json_str(
        r##"{
            "name": "broken",
            "indicators": [{"id": "beds", "label": "Beds", "colors": ["#fff", "#000"]}],
            "aggregations": [{"id": "state", "label": "State"}],
            "defaults": {"aggregation": "county"}
        }"##,
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("county"));
}
