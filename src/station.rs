//! 测试站启动流程
//!
//! 加载配置、初始化日志、选择部件与测试流程、连接模拟设备，
//! 先做夹具检验再运行一次完整作业，最后断开设备。

use crate::interfaces::ConsoleView;
use crate::logging::{init_logger, LoggerConfig};
use crate::models::{TaskState, UserVerdict};
use crate::procedures::{self, gui_test};
use crate::services::{DisplayLoop, EquipmentRegistry, EventBridge, SimulatedEquipment};
use crate::utils::config::{get_global_config, init_global_config, scan_part_configs, PartConfig};
use crate::utils::error::{AppError, AppResult};
use clap::Parser;
use std::path::PathBuf;
use log::{info, warn};

/// 命令行选项
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "commissioning-station")]
#[command(about = "Runs the fixture verify and one commissioning job for a part")]
#[command(version)]
pub struct StationOptions {
    /// 测试站配置文件（JSON）
    #[arg(long = "config")]
    pub config_path: Option<PathBuf>,

    /// 部件配置名（`config/<name>.ini`）
    #[arg(long)]
    pub part: Option<String>,

    /// 自动回复人工判定
    #[arg(long = "auto", value_enum)]
    pub auto_verdict: Option<UserVerdict>,

    /// 0 = English，1 = 简体中文
    #[arg(long = "lang", default_value_t = 0)]
    pub lang_idx: usize,

    #[arg(long)]
    pub skip_verify: bool,
}

/// 没有任何部件配置文件时使用的演示部件
fn demo_part() -> PartConfig {
    PartConfig::new("demo")
        .with_var("partnum", "DEMO-0001")
        .with_var("opname", "ManufacturingEngineer")
        .with_procedure(gui_test::NAME)
}

fn select_part(dir: &std::path::Path, requested: Option<&str>) -> AppResult<PartConfig> {
    let parts = match scan_part_configs(dir) {
        Ok(parts) => parts,
        Err(e) => {
            warn!("[Station] 读取部件配置目录失败，使用演示部件: {}", e);
            Default::default()
        }
    };

    match requested {
        Some(name) => parts
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::not_found_error("PartConfig", format!("找不到部件配置: {}", name))),
        None => Ok(parts.into_values().next().unwrap_or_else(demo_part)),
    }
}

/// 运行一次测试作业，返回作业结论
pub async fn run(options: StationOptions) -> AppResult<bool> {
    init_global_config(options.config_path.clone()).await?;
    let config = get_global_config()?;
    init_logger(&LoggerConfig::try_from(&config.logging_config)?);
    info!("🚀 {} 启动", config.station.version_string());

    let part = select_part(&config.station.part_config_dir, options.part.as_deref())?;
    info!("[Station] 部件: {} ({})", part.name, part.part_number());

    let equipment = EquipmentRegistry::new();
    for (key, eq) in SimulatedEquipment::demo_station() {
        equipment.register(key, eq);
    }

    let (bridge, receiver) = EventBridge::new();
    let procedure = procedures::create_procedure(part, bridge, equipment, &config.station)?;

    println!("{}", procedure.title());
    let view = ConsoleView::new(procedure.get_tests(), options.lang_idx)
        .with_auto_verdict(options.auto_verdict);
    view.print_test_list();
    let display = tokio::spawn(DisplayLoop::new(view, receiver, config.station.display_poll_interval()).run());

    if !options.skip_verify {
        let verify = procedure.verify_start().await?;
        verify
            .await
            .map_err(|e| AppError::concurrency_error(format!("夹具检验任务异常退出: {}", e)))?;
    }

    if let Err(failure) = procedure.test_start().await {
        display.abort();
        procedure.disconnect_equipment().await;
        return Err(failure.into());
    }

    let view = display
        .await
        .map_err(|e| AppError::concurrency_error(format!("显示循环异常退出: {}", e)))?;
    procedure.disconnect_equipment().await;

    if view.verify_state() == Some(TaskState::Fail) {
        warn!("[Station] 夹具检验未通过");
    }
    if let Some(path) = procedure.log_file_path() {
        println!("Log: {}", path.display());
    }
    Ok(view.verdict().unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(list: &[&str]) -> Result<StationOptions, clap::Error> {
        StationOptions::try_parse_from(std::iter::once("commissioning-station").chain(list.iter().copied()))
    }

    #[test]
    fn test_parse_options() {
        let options = parse(&[
            "--config", "cfg.json", "--part", "1234", "--auto", "fail", "--lang", "1", "--skip-verify",
        ])
        .unwrap();
        assert_eq!(options.config_path, Some(PathBuf::from("cfg.json")));
        assert_eq!(options.part.as_deref(), Some("1234"));
        assert_eq!(options.auto_verdict, Some(UserVerdict::Fail));
        assert_eq!(options.lang_idx, 1);
        assert!(options.skip_verify);
    }

    #[test]
    fn test_parse_options_defaults() {
        assert_eq!(parse(&[]).unwrap(), StationOptions::default());
    }

    #[test]
    fn test_parse_options_rejects_unknown_and_missing_values() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--part"]).is_err());
        assert!(parse(&["--lang", "x"]).is_err());
        assert!(parse(&["--auto", "maybe"]).is_err());
    }

    #[test]
    fn test_select_part_falls_back_to_demo() {
        let dir = tempfile::TempDir::new().unwrap();
        let part = select_part(dir.path(), None).unwrap();
        assert_eq!(part.part_number(), "DEMO-0001");
        assert!(select_part(dir.path(), Some("missing")).is_err());
    }

    #[test]
    fn test_select_part_reads_ini() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("1234.ini"),
            "[uservars]\npartnum = 1234-5678\n\n[procedure]\ncommissioning = selftest\n",
        )
        .unwrap();
        let part = select_part(dir.path(), Some("1234")).unwrap();
        assert_eq!(part.part_number(), "1234-5678");
        assert_eq!(part.procedure.as_deref(), Some("selftest"));
    }
}
