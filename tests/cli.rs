use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const VENTS: &str = "Estimated No. Full-Featured Mechanical Ventilators per 100,000 Population";

fn write_states(dir: &std::path::Path) -> std::path::PathBuf {
    let square = |x: f64| {
        serde_json::json!({"type": "Polygon", "coordinates": [[[x, 40.0], [x + 1.0, 40.0], [x + 1.0, 41.0], [x, 41.0], [x, 40.0]]]})
    };
    let values = [("WA", 18.0), ("OR", 21.0), ("ID", 30.0), ("MT", 44.0), ("WY", 52.0), ("UT", 60.0)];
    let features: Vec<serde_json::Value> = values
        .iter()
        .enumerate()
        .map(|(i, (name, v))| {
            serde_json::json!({
                "type": "Feature",
                "geometry": square(-120.0 + i as f64),
                "properties": {"State Name": name, VENTS: v}
            })
        })
        .collect();
    let path = dir.join("states.geojson");
    let doc = serde_json::json!({"type": "FeatureCollection", "features": features});
    fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("ccm")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("breaks").and(predicate::str::contains("classify")));
    Command::cargo_bin("data-update-pr")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--data-update-branch"));
}

#[test]
fn breaks_prints_a_json_array() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("values.json");
    fs::write(&input, r#"[{"v": 1}, {"v": 2}, {"v": 3}, {"v": 4}, {"v": null}]"#).unwrap();
    let out = Command::cargo_bin("ccm")
        .unwrap()
        .args(["breaks", "--input"])
        .arg(&input)
        .args(["--property", "v", "-k", "2", "--method", "equal-interval"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let breaks: Vec<f64> = serde_json::from_slice(&out).unwrap();
    assert_eq!(breaks, vec![1.0, 2.5, 4.0]);
}

#[test]
fn style_writes_paint_for_a_local_layer() {
    let dir = tempdir().unwrap();
    let states = write_states(dir.path());
    let layer = format!("state={}", states.display());
    Command::cargo_bin("ccm")
        .unwrap()
        .current_dir(dir.path())
        .args(["style", "--preset", "vents", "--layer", &layer])
        .assert()
        .success()
        .stdout(predicate::str::contains("fill-color").and(predicate::str::contains("\"visible\": true")));
}

#[test]
fn classify_and_render_the_active_layer() {
    let dir = tempdir().unwrap();
    let states = write_states(dir.path());
    let layer = format!("state={}", states.display());
    let csv_out = dir.path().join("states.csv");
    Command::cargo_bin("ccm")
        .unwrap()
        .current_dir(dir.path())
        .args(["classify", "--preset", "vents", "--layer", &layer, "--out"])
        .arg(&csv_out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Saved 6 rows"));
    let text = fs::read_to_string(&csv_out).unwrap();
    assert!(text.starts_with("id,name,value,display,class,color"));
    assert!(text.contains("WA"));

    let svg_out = dir.path().join("states.svg");
    Command::cargo_bin("ccm")
        .unwrap()
        .current_dir(dir.path())
        .args(["render", "--preset", "vents", "--layer", &layer, "--out"])
        .arg(&svg_out)
        .assert()
        .success();
    assert!(fs::read_to_string(&svg_out).unwrap().contains("<polygon"));
}

#[test]
fn unknown_preset_fails() {
    Command::cargo_bin("ccm")
        .unwrap()
        .args(["style", "--preset", "atlantis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown preset"));
}

#[test]
fn pr_bot_requires_a_repository() {
    Command::cargo_bin("data-update-pr")
        .unwrap()
        .env_remove("GITHUB_REPOSITORY")
        .env_remove("INPUT_OWNER")
        .env_remove("INPUT_REPO")
        .args(["--token", "t", "--data-update-branch", "data-update"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("::error::no owner given"));
}
