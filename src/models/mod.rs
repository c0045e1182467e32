//! 数据模型：测试任务状态、状态快照与显示用双语文本

pub mod enums;
pub mod structs;

pub use enums::{TaskState, UserVerdict, SequenceState, BilingualLabel};
pub use structs::{BilingualText, TestInfo, TaskUpdate};
