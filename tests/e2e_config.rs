//! E2E tests for persistent configuration
//!
//! Tests config round-trip, defaults, backward compatibility, and the
//! line-in engine settings the config feeds.

use cubetimer::config::AppConfig;
use cubetimer::{AudioEngine, TimerId};

#[test]
fn test_config_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = AppConfig {
        timer_trigger: TimerId::Stackmat,
        inspection_enabled: true,
        stackmat_device: Some("USB Audio CODEC".to_string()),
        sample_rate: 48000,
        category: "Megaminx".to_string(),
    };
    config.save(&path).unwrap();
    assert_eq!(AppConfig::load_from(&path), config);
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_from(&dir.path().join("absent.json"));
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_old_config_without_new_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"timer_trigger": "KEYBOARD-TIMER-CONTROL"}"#).unwrap();

    let config = AppConfig::load_from(&path);
    assert_eq!(config.timer_trigger, TimerId::KeyboardControl);
    assert_eq!(config.sample_rate, 8000);
    assert_eq!(config.category, "3x3x3");
}

#[test]
fn test_unknown_trigger_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"timer_trigger": "FOOT-PEDAL"}"#).unwrap();
    assert_eq!(AppConfig::load_from(&path), AppConfig::default());
}

#[test]
fn test_config_paths() {
    assert!(AppConfig::path().ends_with("cubetimer/config.json"));
    assert!(AppConfig::solutions_path().ends_with("cubetimer/solutions.jsonl"));
}

#[test]
fn test_engine_takes_config_values() {
    let config = AppConfig::default();
    let mut engine = AudioEngine::new();
    engine.set_sample_rate(config.sample_rate);
    engine.select_device(config.stackmat_device.as_deref());
    assert_eq!(engine.sample_rate(), 8000);
    assert_eq!(engine.device_name(), None);
}
