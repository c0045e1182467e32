//! 测试流程目录
//!
//! 部件配置的 `[procedure] commissioning` 指定使用哪个流程，未指定时使用 `guitest`。

pub mod gui_test;

use crate::services::domain::equipment_registry::EquipmentRegistry;
use crate::services::domain::procedure::Procedure;
use crate::services::infrastructure::event_bridge::EventBridge;
use crate::utils::config::{PartConfig, StationSettings};
use crate::utils::error::{AppError, AppResult};
use log::info;

pub const DEFAULT_PROCEDURE: &str = gui_test::NAME;

/// 所有可用的流程名
pub fn available_procedures() -> &'static [&'static str] {
    &[gui_test::NAME, gui_test::SELF_TEST_NAME]
}

/// 按部件配置创建测试流程
pub fn create_procedure(
    part_config: PartConfig,
    bridge: EventBridge,
    equipment: EquipmentRegistry,
    settings: &StationSettings,
) -> AppResult<Procedure> {
    let name = part_config
        .procedure
        .clone()
        .unwrap_or_else(|| DEFAULT_PROCEDURE.to_string());

    let builder = match name.as_str() {
        gui_test::NAME => gui_test::builder(part_config, bridge),
        gui_test::SELF_TEST_NAME => gui_test::self_test_builder(part_config, bridge),
        other => {
            return Err(AppError::not_found_error(
                "Procedure",
                format!("未知的测试流程: {} (可用: {})", other, available_procedures().join(", ")),
            ))
        }
    };

    info!("[Procedure] 选择测试流程: {}", name);
    builder.station(settings).equipment(equipment).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(procedure: Option<&str>) -> PartConfig {
        let part = PartConfig::new("demo").with_var("partnum", "PN-7");
        match procedure {
            Some(p) => part.with_procedure(p),
            None => part,
        }
    }

    #[test]
    fn test_default_procedure_is_gui_test() {
        let (bridge, _rx) = EventBridge::new();
        let procedure =
            create_procedure(part(None), bridge, EquipmentRegistry::new(), &StationSettings::default()).unwrap();
        assert_eq!(procedure.title(), gui_test::TITLE);
        let ids: Vec<_> = procedure.get_tests().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["passtest", "user"]);
    }

    #[test]
    fn test_self_test_selected_by_part_config() {
        let (bridge, _rx) = EventBridge::new();
        let procedure = create_procedure(
            part(Some("selftest")),
            bridge,
            EquipmentRegistry::new(),
            &StationSettings::default(),
        )
        .unwrap();
        assert_eq!(procedure.title(), gui_test::SELF_TEST_TITLE);
        assert_eq!(procedure.get_tests().len(), 4);
    }

    #[test]
    fn test_unknown_procedure_is_rejected() {
        let (bridge, _rx) = EventBridge::new();
        let err = create_procedure(
            part(Some("nope")),
            bridge,
            EquipmentRegistry::new(),
            &StationSettings::default(),
        )
        .err().unwrap();
        assert_eq!(err.error_code(), "NOT_FOUND_ERROR");
    }

    #[test]
    fn test_display_names() {
        assert_eq!(gui_test::display_name("guitest").unwrap().en, "GUI Test 1.0");
        assert!(gui_test::display_name("other").is_none());
    }
}
