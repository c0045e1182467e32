//! 控制台显示层
//!
//! 把测试状态变化打印到终端，人工判定从标准输入读取（输入 `pass` 通过，其余任何输入都判失败）。
//! 设置了自动判定时不读取标准输入，便于无人值守运行。

use crate::models::{TaskState, TaskUpdate, TestInfo, UserVerdict};
use crate::services::infrastructure::event_bridge::PassFailQuery;
use crate::services::traits::IStationView;
use std::collections::BTreeMap;
use std::io::BufRead;
use log::warn;

pub struct ConsoleView {
    lang_idx: usize,
    auto_verdict: Option<UserVerdict>,
    tests: Vec<TestInfo>,
    states: BTreeMap<String, TaskState>,
    verify_state: Option<TaskState>,
    errors: Vec<String>,
    verdict: Option<bool>,
}

impl ConsoleView {
    /// `lang_idx`: 0 = English，1 = 简体中文
    pub fn new(tests: Vec<TestInfo>, lang_idx: usize) -> Self {
        let states = tests
            .iter()
            .map(|t| (t.id.clone(), TaskState::Pending))
            .collect();
        Self {
            lang_idx,
            auto_verdict: None,
            tests,
            states,
            verify_state: None,
            errors: Vec::new(),
            verdict: None,
        }
    }

    pub fn with_auto_verdict(mut self, verdict: Option<UserVerdict>) -> Self {
        self.auto_verdict = verdict;
        self
    }

    pub fn print_test_list(&self) {
        for (i, test) in self.tests.iter().enumerate() {
            println!("  {:>2}. {} ({:.1}s)", i + 1, test.name.get(self.lang_idx), test.expected_duration.as_secs_f64());
        }
    }

    pub fn state_of(&self, test_id: &str) -> Option<TaskState> {
        self.states.get(test_id).copied()
    }

    pub fn verify_state(&self) -> Option<TaskState> {
        self.verify_state
    }

    /// 作业结论，作业未结束时为 `None`
    pub fn verdict(&self) -> Option<bool> {
        self.verdict
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn label(&self, state: TaskState) -> &'static str {
        let (en, zh) = state.label();
        if self.lang_idx == 1 { zh } else { en }
    }

    fn print_update(&self, prefix: &str, update: &TaskUpdate) {
        let mut line = format!("{}[{}] {}", prefix, self.label(update.state), update.name.get(self.lang_idx));
        if let Some(message) = &update.message {
            line.push_str(&format!(" - {}", message.get(self.lang_idx)));
        }
        if let Some(data) = &update.data {
            line.push_str(&format!(" ({})", data));
        }
        println!("{}", line);
    }
}

impl IStationView for ConsoleView {
    fn on_test_state(&mut self, update: &TaskUpdate) {
        self.states.insert(update.test_id.clone(), update.state);
        self.print_update("", update);
    }

    fn on_verify_state(&mut self, update: &TaskUpdate) {
        self.verify_state = Some(update.state);
        self.print_update("[Verify] ", update);
    }

    fn on_procedure_complete(&mut self, passed: bool) {
        self.verdict = Some(passed);
        if passed {
            println!("========== PASS ==========");
        } else {
            println!("========== FAIL ==========");
        }
    }

    fn on_pass_fail_query(&mut self, query: PassFailQuery) {
        if let Some(verdict) = self.auto_verdict {
            println!("{} -> {:?}", query.prompt.get(self.lang_idx), verdict);
            query.responder.user_response(verdict);
            return;
        }

        println!("{} [pass/fail]", query.prompt.get(self.lang_idx));
        let responder = query.responder;
        // 读取标准输入会阻塞，放到阻塞线程池中，显示循环继续运行
        tokio::task::spawn_blocking(move || {
            let mut input = String::new();
            if let Err(e) = std::io::stdin().lock().read_line(&mut input) {
                warn!("[Console] 读取操作员输入失败: {}", e);
            }
            let verdict = input.parse::<UserVerdict>().unwrap_or(UserVerdict::Fail);
            responder.user_response(verdict);
        });
    }

    fn on_test_error(&mut self, test_name: &str, message: &str) {
        eprintln!("Thread Exception in {}: {}", test_name, message);
        self.errors.push(format!("{}: {}", test_name, message));
    }

    fn is_finished(&self) -> bool {
        self.verdict.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BilingualText;
    use crate::services::infrastructure::event_bridge::UserResponder;
    use std::time::Duration;

    fn tests() -> Vec<TestInfo> {
        vec![TestInfo {
            id: "passtest".to_string(),
            name: BilingualText::new("Pass Test", "通过测试"),
            expected_duration: Duration::from_millis(100),
        }]
    }

    fn update(state: TaskState) -> TaskUpdate {
        TaskUpdate {
            test_id: "passtest".to_string(),
            name: BilingualText::new("Pass Test", "通过测试"),
            state,
            message: None,
            data: Some("3.30 V".to_string()),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_tracks_state_and_verdict() {
        let mut view = ConsoleView::new(tests(), 1);
        assert_eq!(view.state_of("passtest"), Some(TaskState::Pending));

        view.on_test_state(&update(TaskState::Running));
        view.on_test_state(&update(TaskState::Pass));
        assert_eq!(view.state_of("passtest"), Some(TaskState::Pass));
        assert!(!view.is_finished());

        view.on_procedure_complete(true);
        assert_eq!(view.verdict(), Some(true));
        assert!(view.is_finished());
    }

    #[tokio::test]
    async fn test_auto_verdict_answers_query() {
        let mut view = ConsoleView::new(tests(), 0).with_auto_verdict(Some(UserVerdict::Pass));
        let (responder, receiver) = UserResponder::new();
        view.on_pass_fail_query(PassFailQuery {
            update: update(TaskState::Running),
            prompt: BilingualText::same("choose"),
            responder,
        });
        assert_eq!(receiver.await.unwrap(), UserVerdict::Pass);
    }

    #[test]
    fn test_records_errors() {
        let mut view = ConsoleView::new(tests(), 0);
        view.on_test_error("Pass Test", "boom");
        assert_eq!(view.errors(), &["Pass Test: boom".to_string()]);
    }
}
