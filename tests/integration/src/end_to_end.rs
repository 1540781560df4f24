//! End-to-end tests: files on disk through resolution, mutation, and
//! persistence, with the run logger wired in.

use preset_log::FileLogger;
use preset_store::{open_registry, open_registry_with_default};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_fixtures(root: &Path) {
    fs::create_dir_all(root.join("trials")).unwrap();
    fs::write(
        root.join("defaults.json"),
        r#"[
            // shared experiment defaults
            {
                "uuid": "defaults",
                "name": "Defaults",
                "abstract": true,
                "config": { "x": 2, "a": 25, "y": 51, "seed": 1234 }
            },
            {
                "uuid": "schedule",
                "name": "LR schedule",
                "abstract": true,
                "dynamic": true,
                "config": { "0": { "z": 24, "b": 12 }, "10": { "z": 30 } }
            }
        ]"#,
    )
    .unwrap();
    fs::write(
        root.join("trials/sweep.json"),
        r#"[
            { "uuid": "simple", "base": "defaults", "config": { "x": 8 } },
            { "uuid": "timed", "base": "schedule", "config": { "w": 150 } }
        ]"#,
    )
    .unwrap();
}

#[test]
fn load_resolve_and_query_across_files() {
    let temp = TempDir::new().unwrap();
    write_fixtures(temp.path());

    let mut registry = open_registry(temp.path()).unwrap();
    assert_eq!(registry.len(), 4);

    let simple = registry.get("simple").unwrap();
    assert_eq!(simple.get_int("x", None).unwrap(), 8);
    assert_eq!(simple.get_int("a", None).unwrap(), 25);
    assert_eq!(simple.get_int("y", None).unwrap(), 51);
    assert_eq!(simple.file(), Some("trials/sweep.json"));

    // abstract bases are hidden from per-file listings
    let from_sweep: Vec<&str> = registry
        .presets_by_file("trials/sweep.json")
        .iter()
        .map(|p| p.uuid())
        .collect();
    assert_eq!(from_sweep, vec!["simple", "timed"]);
    assert!(registry.presets_by_file("defaults.json").is_empty());

    // the flat child follows the dynamic base's schedule
    let timed = registry.get_mut("timed").unwrap();
    assert!(timed.treat_dynamic());
    assert_eq!(timed.get_int("z", None).unwrap(), 24);
    timed.iteration_cursor = 10;
    assert_eq!(timed.get_int("z", None).unwrap(), 30);
    assert_eq!(timed.get_int("w", None).unwrap(), 150);
    assert_eq!(timed.get_int("b", None).unwrap(), 12);
}

#[test]
fn added_presets_persist_and_survive_a_reload() {
    let temp = TempDir::new().unwrap();
    write_fixtures(temp.path());

    let mut registry = open_registry(temp.path()).unwrap();
    registry
        .add_preset(
            json!({
                "uuid": "added",
                "base": "defaults",
                "config": { "x": 99 }
            })
            .as_object()
            .unwrap()
            .clone(),
            Some("trials/sweep.json".to_string()),
        )
        .unwrap();

    let reloaded = open_registry(temp.path()).unwrap();
    let added = reloaded.get("added").unwrap();
    assert_eq!(added.get_int("x", None).unwrap(), 99);
    assert_eq!(added.get_int("a", None).unwrap(), 25);
    assert_eq!(added.file(), Some("trials/sweep.json"));
}

#[test]
fn timestep_mutation_round_trips_through_the_files() {
    let temp = TempDir::new().unwrap();
    write_fixtures(temp.path());

    let mut registry = open_registry(temp.path()).unwrap();
    registry
        .set_config_at_timestep("simple", &json!({ "x": 16 }), 100)
        .unwrap();

    let mut reloaded = open_registry(temp.path()).unwrap();
    let simple = reloaded.get_mut("simple").unwrap();
    assert!(simple.is_dynamic());
    assert_eq!(simple.get_int("x", None).unwrap(), 8);
    simple.iteration_cursor = 100;
    assert_eq!(simple.get_int("x", None).unwrap(), 16);
    // inherited values stay visible after the promotion
    assert_eq!(simple.get_int("a", None).unwrap(), 25);
}

#[test]
fn removal_rewrites_the_origin_file() {
    let temp = TempDir::new().unwrap();
    write_fixtures(temp.path());

    let mut registry = open_registry(temp.path()).unwrap();
    registry.remove_preset("timed").unwrap();

    let reloaded = open_registry(temp.path()).unwrap();
    assert!(matches!(
        reloaded.get("timed"),
        Err(preset_core::Error::NotFound { .. })
    ));
    assert!(reloaded.get("simple").is_ok());
}

#[test]
fn metadata_survives_an_explicit_save() {
    let temp = TempDir::new().unwrap();
    write_fixtures(temp.path());

    let mut registry = open_registry(temp.path()).unwrap();
    registry
        .get_mut("simple")
        .unwrap()
        .set_metadata("owner", json!("team-a"))
        .unwrap();
    registry.save().unwrap();

    let reloaded = open_registry(temp.path()).unwrap();
    let simple = reloaded.get("simple").unwrap();
    assert!(simple.has_metadata("owner"));
    assert_eq!(simple.get_metadata("owner").unwrap(), &json!("team-a"));
}

#[test]
fn default_preset_applies_to_documents_without_a_base() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("presets.json"),
        r#"[
            { "uuid": "default", "name": "Default", "config": { "seed": 7 } },
            { "uuid": "trial", "config": { "lr": 0.5 } }
        ]"#,
    )
    .unwrap();

    let registry = open_registry_with_default(temp.path(), "Default").unwrap();
    let trial = registry.get("trial").unwrap();
    assert_eq!(trial.get_int("seed", None).unwrap(), 7);
    assert_eq!(trial.get_float("lr", None).unwrap(), 0.5);
}

#[test]
fn value_usage_is_reported_to_the_run_log() {
    let temp = TempDir::new().unwrap();
    write_fixtures(temp.path());
    let log_dir = temp.path().join("logs");

    let mut registry = open_registry(temp.path()).unwrap();
    let logger = FileLogger::create(&log_dir, "run", true).unwrap();

    {
        let timed = registry.get_mut("timed").unwrap();
        timed.set_logger(Some(Arc::new(logger.with_module("config"))));
        timed.get_int("z", None).unwrap();
        timed.get_int("z", None).unwrap();
        timed.iteration_cursor = 10;
        timed.get_int("z", None).unwrap();
    }
    logger.log("trial finished");

    let content = fs::read_to_string(log_dir.join("run.log")).unwrap();
    let config_lines: Vec<&str> = content.lines().filter(|l| l.contains("[config]")).collect();
    assert_eq!(config_lines.len(), 2);
    assert!(config_lines[0].ends_with("Using z = 24"));
    assert!(config_lines[1].ends_with("Switching z: 24 -> 30"));
    assert!(content.contains("[general] trial finished"));
}
