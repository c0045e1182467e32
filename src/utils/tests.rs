use crate::utils::error::{AppError, AppResult, EquipmentFailure};
use crate::utils::config::{scan_part_configs, AppConfig, ConfigManager, PartConfig};
use tempfile::tempdir;

/// 测试AppError的创建和错误代码
#[test]
fn test_app_error_creation() {
    let error = AppError::generic("测试错误");
    assert_eq!(error.error_code(), "GENERIC");
    assert!(error.to_string().contains("测试错误"));

    let comm_error = AppError::equipment_communication_error("串口打开失败");
    assert_eq!(comm_error.error_code(), "EQUIPMENT_COMMUNICATION_ERROR");
    assert!(comm_error.to_string().contains("串口打开失败"));

    let failure: AppError = EquipmentFailure::new("Keithley 2200 Power Supply", "no device").into();
    assert_eq!(failure.error_code(), "EQUIPMENT_FAILURE");
    assert!(failure.to_string().contains("Keithley 2200 Power Supply"));
    assert!(failure.to_string().contains("no device"));
}

/// 测试错误转换 (From trait)
#[test]
fn test_error_conversion() {
    let str_error: AppError = "字符串错误".into();
    assert_eq!(str_error.error_code(), "GENERIC");

    let io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
    assert_eq!(io.error_code(), "IO_ERROR");

    let json_error: Result<serde_json::Value, serde_json::Error> = serde_json::from_str("{invalid json}");
    match json_error {
        Err(e) => {
            let app_error: AppError = e.into();
            assert_eq!(app_error.error_code(), "JSON_ERROR");
        }
        Ok(_) => panic!("应该产生JSON错误"),
    }
}

/// 测试状态转换错误
#[test]
fn test_state_transition_error() {
    let error = AppError::state_transition_error("Pass", "Running", "终态不可回退");
    assert_eq!(error.error_code(), "STATE_TRANSITION_ERROR");
    assert!(error.to_string().contains("从 Pass 到 Running"));
}

#[test]
fn test_app_config_defaults() {
    let config = AppConfig::default();
    assert_eq!(config.station.display_poll_interval_ms, 10);
    assert_eq!(config.logging_config.log_level, "info");
    assert!(config.station.version_string().starts_with("Commissioning Station "));
}

#[tokio::test]
async fn test_config_manager_creates_default_file() -> AppResult<()> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("station_config.json");

    let mut manager = ConfigManager::new(path.clone());
    manager.load_from_file().await?;
    assert!(path.exists());

    manager.get_config_mut().station.display_poll_interval_ms = 25;
    manager.save_to_file().await?;

    let mut reloaded = ConfigManager::new(path);
    reloaded.load_from_file().await?;
    assert_eq!(reloaded.get_config().station.display_poll_interval_ms, 25);
    reloaded.validate_config()?;
    Ok(())
}

#[test]
fn test_config_validation_rejects_bad_values() {
    let mut manager = ConfigManager::new("unused.json".into());
    manager.get_config_mut().logging_config.log_level = "verbose".to_string();
    assert!(manager.validate_config().is_err());

    let mut manager = ConfigManager::new("unused.json".into());
    manager.get_config_mut().station.display_poll_interval_ms = 0;
    assert!(manager.validate_config().is_err());
}

#[test]
fn test_part_config_load_from_ini() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("1234-5678.ini");
    std::fs::write(
        &path,
        "[uservars]\npartnum = 1234-5678\nopname = ManufacturingEngineer\n\n[procedure]\ncommissioning = guitest\n",
    )
    .unwrap();

    let part = PartConfig::load(&path).unwrap();
    assert_eq!(part.name, "1234-5678");
    assert_eq!(part.part_number(), "1234-5678");
    assert_eq!(part.get("opname"), Some("ManufacturingEngineer"));
    assert_eq!(part.procedure.as_deref(), Some("guitest"));
    assert_eq!(
        part.parameter_summary(),
        "Part Number = 1234-5678, opname = ManufacturingEngineer"
    );
}

#[test]
fn test_part_config_defaults_part_number_to_file_name() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("PN-42.ini");
    std::fs::write(&path, "[procedure]\ncommissioning = guitest\n").unwrap();

    let part = PartConfig::load(&path).unwrap();
    assert_eq!(part.part_number(), "PN-42");
}

#[test]
fn test_part_config_requires_part_number() {
    let part = PartConfig::new("empty");
    assert!(part.validate().is_err());
    assert!(PartConfig::new("ok").with_var("partnum", "X1").validate().is_ok());
}

#[test]
fn test_scan_part_configs_skips_other_files() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("A100.ini"), "[uservars]\npartnum = A100\n").unwrap();
    std::fs::write(dir.path().join("B200.ini"), "[uservars]\npartnum = B200\n").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a config").unwrap();

    let parts = scan_part_configs(dir.path()).unwrap();
    assert_eq!(parts.keys().cloned().collect::<Vec<_>>(), vec!["A100", "B200"]);
}
