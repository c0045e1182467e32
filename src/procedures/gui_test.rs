//! 演示测试流程
//!
//! `guitest`: 一个自动通过的测试加一个人工判定，用于调试显示层。
//! `selftest`: 扫码、通过、失败继续、人工判定，用于检查引擎的序列推进与结论汇总。

use crate::models::BilingualText;
use crate::services::domain::procedure::{Procedure, ProcedureBuilder};
use crate::services::domain::standard_test_steps::{FailContinueTest, PassTest, ScanUnitIdTest, UserTest};
use crate::services::infrastructure::event_bridge::EventBridge;
use crate::utils::config::PartConfig;

pub const NAME: &str = "guitest";
pub const TITLE: &str = "GUI Test 1.0";

pub const SELF_TEST_NAME: &str = "selftest";
pub const SELF_TEST_TITLE: &str = "Engine Self Test 1.0";

pub fn builder(part_config: PartConfig, bridge: EventBridge) -> ProcedureBuilder {
    Procedure::builder(TITLE, part_config, bridge)
        .step(PassTest::new)
        .step(UserTest::new)
}

pub fn self_test_builder(part_config: PartConfig, bridge: EventBridge) -> ProcedureBuilder {
    Procedure::builder(SELF_TEST_TITLE, part_config, bridge)
        .step(ScanUnitIdTest::new)
        .step(PassTest::new)
        .step(FailContinueTest::new)
        .step(UserTest::new)
}

/// 流程在选择界面中显示的名称
pub fn display_name(name: &str) -> Option<BilingualText> {
    match name {
        NAME => Some(BilingualText::new(TITLE, "界面测试 1.0")),
        SELF_TEST_NAME => Some(BilingualText::new(SELF_TEST_TITLE, "引擎自检 1.0")),
        _ => None,
    }
}
