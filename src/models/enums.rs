//! # 模型枚举类型模块
//!
//! 测试任务状态、人工判定结果以及测试序列状态机。

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use crate::utils::error::AppError;

/// 测试任务状态
///
/// 状态只能单向推进：`Pending → Running → {Pass, Fail}`，终态不可回退。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// 待执行
    #[default]
    Pending,
    /// 执行中
    Running,
    /// 通过
    Pass,
    /// 失败
    Fail,
}

impl TaskState {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Pass | TaskState::Fail)
    }

    /// 检查状态转换是否合法
    pub fn can_transition_to(self, next: TaskState) -> bool {
        match (self, next) {
            (TaskState::Pending, TaskState::Running) => true,
            (TaskState::Running, TaskState::Pass) | (TaskState::Running, TaskState::Fail) => true,
            // 未开始执行就被判失败（例如运行前出错）
            (TaskState::Pending, TaskState::Fail) => true,
            // 测试体内部先调用 fail() 再由异常路径强制置为失败
            (TaskState::Fail, TaskState::Fail) => true,
            _ => false,
        }
    }

    /// 双语显示文字
    pub fn label(self) -> BilingualLabel {
        match self {
            TaskState::Pending => ("Pending", "待定"),
            TaskState::Running => ("Running", "执行"),
            TaskState::Pass => ("Pass", "通过"),
            TaskState::Fail => ("Fail", "失败"),
        }
    }
}

/// (英文, 中文)
pub type BilingualLabel = (&'static str, &'static str);

impl Display for TaskState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Pass => "PASS",
            TaskState::Fail => "FAIL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TaskState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskState::Pending),
            "running" => Ok(TaskState::Running),
            "pass" => Ok(TaskState::Pass),
            "fail" => Ok(TaskState::Fail),
            other => Err(AppError::generic(format!("未知的任务状态: {}", other))),
        }
    }
}

/// 操作员人工判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UserVerdict {
    Pass,
    Fail,
}

impl FromStr for UserVerdict {
    type Err = AppError;

    /// 只有 `pass` 视为通过，其余输入一律按失败处理
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("pass") {
            Ok(UserVerdict::Pass)
        } else {
            Ok(UserVerdict::Fail)
        }
    }
}

impl From<UserVerdict> for TaskState {
    fn from(verdict: UserVerdict) -> Self {
        match verdict {
            UserVerdict::Pass => TaskState::Pass,
            UserVerdict::Fail => TaskState::Fail,
        }
    }
}

/// 测试序列状态机
///
/// - `Idle`: 尚未开始作业
/// - `Starting`: 已受理开始作业，正在连接设备
/// - `Running(i)`: 第 i 个测试正在执行，后续测试会继续启动
/// - `Draining(i)`: 已调用 stop()，第 i 个测试完成后不再启动新测试
/// - `Finishing`: 序列已结束，正在写汇总日志
/// - `Done`: 本次作业已结束，结论已发布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SequenceState {
    #[default]
    Idle,
    Starting,
    Running(usize),
    Draining(usize),
    Finishing,
    Done,
}

impl SequenceState {
    /// 当前在途测试的序号
    pub fn in_flight(self) -> Option<usize> {
        match self {
            SequenceState::Running(i) | SequenceState::Draining(i) => Some(i),
            _ => None,
        }
    }

    /// 作业是否正在进行（此时不能开始新作业）
    pub fn is_busy(self) -> bool {
        !matches!(self, SequenceState::Idle | SequenceState::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_transitions_are_monotonic() {
        assert!(TaskState::Pending.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Pass));
        assert!(TaskState::Running.can_transition_to(TaskState::Fail));

        assert!(!TaskState::Pass.can_transition_to(TaskState::Running));
        assert!(!TaskState::Fail.can_transition_to(TaskState::Pending));
        assert!(!TaskState::Pass.can_transition_to(TaskState::Fail));
        assert!(!TaskState::Running.can_transition_to(TaskState::Pending));
    }

    #[test]
    fn test_user_verdict_parsing_defaults_to_fail() {
        assert_eq!("pass".parse::<UserVerdict>().unwrap(), UserVerdict::Pass);
        assert_eq!(" PASS ".parse::<UserVerdict>().unwrap(), UserVerdict::Pass);
        assert_eq!("fail".parse::<UserVerdict>().unwrap(), UserVerdict::Fail);
        assert_eq!("".parse::<UserVerdict>().unwrap(), UserVerdict::Fail);
    }

    #[test]
    fn test_sequence_state_busy_covers_start_and_finish() {
        assert!(!SequenceState::Idle.is_busy());
        assert!(!SequenceState::Done.is_busy());
        assert!(SequenceState::Starting.is_busy());
        assert!(SequenceState::Finishing.is_busy());
        assert!(SequenceState::Draining(2).is_busy());
        assert_eq!(SequenceState::Starting.in_flight(), None);
        assert_eq!(SequenceState::Running(1).in_flight(), Some(1));
    }

    #[test]
    fn test_task_state_serde_lowercase() {
        assert_eq!(serde_json::to_string(&TaskState::Running).unwrap(), "\"running\"");
        assert_eq!("fail".parse::<TaskState>().unwrap(), TaskState::Fail);
    }
}
