use finsight_config::{ConfigManager, EngineConfig};
use tempfile::TempDir;

#[test]
fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let manager = ConfigManager::with_base_dir(dir.path().to_path_buf()).unwrap();
    let config = manager.load().unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.budget_tolerance, 0.10);
    assert_eq!(config.anomaly_sigma, 3.0);
    assert_eq!(config.baseline_min_samples, 3);
}

#[test]
fn save_then_load_roundtrips_overrides() {
    let dir = TempDir::new().unwrap();
    let manager = ConfigManager::with_base_dir(dir.path().to_path_buf()).unwrap();

    let mut config = EngineConfig::default();
    config.anomaly_sigma = 2.5;
    config.baseline_min_samples = 5;
    config.granularities = vec!["month".into()];
    manager.save(&config).unwrap();

    let loaded = manager.load().unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn partial_file_fills_missing_fields_with_defaults() {
    let dir = TempDir::new().unwrap();
    let manager = ConfigManager::with_base_dir(dir.path().to_path_buf()).unwrap();
    std::fs::write(manager.config_path(), r#"{"anomaly_sigma": 4.0}"#).unwrap();

    let loaded = manager.load().unwrap();
    assert_eq!(loaded.anomaly_sigma, 4.0);
    assert_eq!(loaded.budget_tolerance, 0.10);
    assert_eq!(
        loaded.granularities,
        EngineConfig::default_granularities()
    );
    assert_eq!(loaded.anomaly_granularity, "month");
}
