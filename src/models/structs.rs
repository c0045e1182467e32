use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use crate::models::enums::TaskState;

/// 双语文本（英文 / 简体中文）
///
/// 显示层通过语言序号选择：0 = English，1 = 简体中文。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BilingualText {
    pub en: String,
    pub zh: String,
}

impl BilingualText {
    pub fn new(en: impl Into<String>, zh: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            zh: zh.into(),
        }
    }

    /// 两种语言使用同一文本
    pub fn same(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            en: text.clone(),
            zh: text,
        }
    }

    /// 按语言序号取文本，超出范围时回退到英文
    pub fn get(&self, lang_idx: usize) -> &str {
        match lang_idx {
            1 => &self.zh,
            _ => &self.en,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.en.is_empty() && self.zh.is_empty()
    }
}

impl fmt::Display for BilingualText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.en)
    }
}

/// 测试项描述（用于预先填充显示列表）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInfo {
    /// 稳定的测试ID
    pub id: String,
    /// 双语显示名
    pub name: BilingualText,
    /// 预计耗时（用于进度估计）
    #[serde(with = "duration_secs")]
    pub expected_duration: Duration,
}

/// 测试任务状态变化快照
///
/// 由执行测试的任务生成，经跨线程队列交给显示层，显示层不会接触任务本身。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub test_id: String,
    pub name: BilingualText,
    pub state: TaskState,
    pub message: Option<BilingualText>,
    pub data: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
