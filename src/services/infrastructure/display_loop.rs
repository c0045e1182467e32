/// 显示层更新循环
///
/// 按固定的短间隔（默认 10ms）取出事件桥中的全部事件并分发给 `IStationView`。
/// 这个循环是界面状态唯一的读写者，测试任务永远不会直接接触显示层。

use crate::services::infrastructure::event_bridge::{EventReceiver, StationEvent};
use crate::services::traits::IStationView;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use log::{debug, info};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct DisplayLoop<V: IStationView> {
    view: V,
    receiver: EventReceiver,
    poll_interval: Duration,
    closed: bool,
}

impl<V: IStationView> DisplayLoop<V> {
    pub fn new(view: V, receiver: EventReceiver, poll_interval: Duration) -> Self {
        Self {
            view,
            receiver,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            closed: false,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn into_view(self) -> V {
        self.view
    }

    /// 事件桥的发布端是否已全部关闭
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 分发当前队列中的全部事件，返回分发数量
    pub fn drain_once(&mut self) -> usize {
        let (events, closed) = self.receiver.drain();
        self.closed = closed;
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    fn dispatch(&mut self, event: StationEvent) {
        match event {
            StationEvent::TestStateChanged(update) => self.view.on_test_state(&update),
            StationEvent::VerifyStateChanged(update) => self.view.on_verify_state(&update),
            StationEvent::ProcedureCompleted { passed } => self.view.on_procedure_complete(passed),
            StationEvent::PassFailQuery(query) => self.view.on_pass_fail_query(query),
            StationEvent::TestError { test_name, message } => {
                self.view.on_test_error(&test_name.en, &message)
            }
        }
    }

    /// 运行循环，直到显示层表示结束或事件桥关闭，返回显示层
    pub async fn run(mut self) -> V {
        info!("[Display] 显示循环启动，轮询间隔 {:?}", self.poll_interval);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let count = self.drain_once();
            if count > 0 {
                debug!("[Display] 分发 {} 个事件", count);
            }
            if self.view.is_finished() || self.closed {
                break;
            }
        }

        info!("[Display] 显示循环结束");
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BilingualText, TaskState, TaskUpdate, UserVerdict};
    use crate::services::infrastructure::event_bridge::{EventBridge, PassFailQuery, UserResponder};
    use mockall::predicate::eq;
    use mockall::{mock, Sequence};

    mock! {
        pub View {}
        impl IStationView for View {
            fn on_test_state(&mut self, update: &TaskUpdate);
            fn on_verify_state(&mut self, update: &TaskUpdate);
            fn on_procedure_complete(&mut self, passed: bool);
            fn on_pass_fail_query(&mut self, query: PassFailQuery);
            fn on_test_error(&mut self, test_name: &str, message: &str);
            fn is_finished(&self) -> bool;
        }
    }

    fn update(state: TaskState) -> TaskUpdate {
        TaskUpdate {
            test_id: "passtest".to_string(),
            name: BilingualText::new("Pass Test", "通过测试"),
            state,
            message: None,
            data: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_drain_dispatches_in_emission_order() {
        let (bridge, receiver) = EventBridge::new();
        let mut view = MockView::new();
        let mut seq = Sequence::new();
        view.expect_on_test_state()
            .withf(|u| u.state == TaskState::Running)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        view.expect_on_test_state()
            .withf(|u| u.state == TaskState::Pass)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        view.expect_on_procedure_complete()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        bridge.publish(StationEvent::TestStateChanged(update(TaskState::Running)));
        bridge.publish(StationEvent::TestStateChanged(update(TaskState::Pass)));
        bridge.publish(StationEvent::ProcedureCompleted { passed: true });

        let mut display = DisplayLoop::new(view, receiver, Duration::from_millis(10));
        assert_eq!(display.drain_once(), 3);
        assert_eq!(display.drain_once(), 0);
        assert!(!display.is_closed());
    }

    #[test]
    fn test_verify_and_error_events_reach_view() {
        let (bridge, receiver) = EventBridge::new();
        let mut view = MockView::new();
        view.expect_on_verify_state()
            .withf(|u| u.state == TaskState::Fail)
            .times(1)
            .return_const(());
        view.expect_on_test_error()
            .withf(|name: &str, message: &str| name == "Pass Test" && message.contains("boom"))
            .times(1)
            .return_const(());

        bridge.publish(StationEvent::VerifyStateChanged(update(TaskState::Fail)));
        bridge.publish(StationEvent::TestError {
            test_name: BilingualText::new("Pass Test", "通过测试"),
            message: "boom".to_string(),
        });

        let mut display = DisplayLoop::new(view, receiver, Duration::from_millis(10));
        assert_eq!(display.drain_once(), 2);
    }

    #[tokio::test]
    async fn test_pass_fail_query_is_answered_from_view() {
        let (bridge, receiver) = EventBridge::new();
        let mut view = MockView::new();
        view.expect_on_pass_fail_query()
            .times(1)
            .returning(|query: PassFailQuery| query.responder.user_response(UserVerdict::Fail));

        let (responder, verdict) = UserResponder::new();
        bridge.publish(StationEvent::PassFailQuery(PassFailQuery {
            update: update(TaskState::Running),
            prompt: BilingualText::same("choose"),
            responder,
        }));

        let mut display = DisplayLoop::new(view, receiver, Duration::from_millis(10));
        display.drain_once();
        assert_eq!(verdict.await.unwrap(), UserVerdict::Fail);
    }

    #[tokio::test]
    async fn test_run_exits_when_view_finished() {
        let (bridge, receiver) = EventBridge::new();
        let mut view = MockView::new();
        view.expect_on_procedure_complete().with(eq(false)).times(1).return_const(());
        view.expect_is_finished().return_const(true);

        bridge.publish(StationEvent::ProcedureCompleted { passed: false });
        let display = DisplayLoop::new(view, receiver, Duration::from_millis(5));
        let result = tokio::time::timeout(Duration::from_secs(2), display.run()).await;
        assert!(result.is_ok());
        drop(bridge);
    }

    #[tokio::test]
    async fn test_run_exits_when_bridge_closed() {
        let (bridge, receiver) = EventBridge::new();
        let mut view = MockView::new();
        view.expect_is_finished().return_const(false);
        drop(bridge);

        let display = DisplayLoop::new(view, receiver, Duration::ZERO);
        let result = tokio::time::timeout(Duration::from_secs(2), display.run()).await;
        assert!(result.is_ok());
    }
}
