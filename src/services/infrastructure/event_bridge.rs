/// 跨线程事件桥
///
/// 测试任务在各自的 tokio 任务中执行，状态变化通过线程安全队列交给显示层，
/// 显示层在自己的循环中定期取出事件，是界面状态的唯一读写者。
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TryRecvError;
use log::{debug, warn};
use crate::models::{BilingualText, TaskUpdate, UserVerdict};

/// 测试站事件
#[derive(Debug)]
pub enum StationEvent {
    /// 顺序测试状态变化
    TestStateChanged(TaskUpdate),
    /// 夹具检验状态变化
    VerifyStateChanged(TaskUpdate),
    /// 测试流程结束
    ProcedureCompleted { passed: bool },
    /// 请求人工判定
    PassFailQuery(PassFailQuery),
    /// 测试执行中的意外错误
    TestError { test_name: BilingualText, message: String },
}

impl StationEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            StationEvent::TestStateChanged(_) => "test-state-changed",
            StationEvent::VerifyStateChanged(_) => "verify-state-changed",
            StationEvent::ProcedureCompleted { .. } => "procedure-completed",
            StationEvent::PassFailQuery(_) => "pass-fail-query",
            StationEvent::TestError { .. } => "test-error",
        }
    }
}

/// 人工判定请求
#[derive(Debug)]
pub struct PassFailQuery {
    /// 发起请求时的任务快照
    pub update: TaskUpdate,
    /// 显示给操作员的提示
    pub prompt: BilingualText,
    /// 一次性回复通道
    pub responder: UserResponder,
}

/// 人工判定的一次性回复句柄
///
/// `user_response` 消耗自身，保证每个请求只能回复一次。
/// 句柄被丢弃而未回复时，等待方按失败处理。
#[derive(Debug)]
pub struct UserResponder {
    sender: oneshot::Sender<UserVerdict>,
}

impl UserResponder {
    pub fn new() -> (Self, oneshot::Receiver<UserVerdict>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// 回复判定结果
    pub fn user_response(self, verdict: UserVerdict) {
        if self.sender.send(verdict).is_err() {
            warn!("[Bridge] 人工判定已无人等待，忽略回复: {:?}", verdict);
        }
    }
}

/// 事件发布端，可在任意线程克隆和使用
#[derive(Debug, Clone)]
pub struct EventBridge {
    sender: mpsc::UnboundedSender<StationEvent>,
}

/// 事件接收端，只属于显示层
#[derive(Debug)]
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<StationEvent>,
}

impl EventBridge {
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, EventReceiver { receiver })
    }

    /// 发布事件；显示层已关闭时只记录警告
    pub fn publish(&self, event: StationEvent) {
        let name = event.event_name();
        if self.sender.send(event).is_err() {
            warn!("[Bridge] 显示层已关闭，丢弃事件: {}", name);
        } else {
            debug!("[Bridge] 发布事件: {}", name);
        }
    }
}

impl EventReceiver {
    /// 非阻塞地取出当前队列中的全部事件
    ///
    /// 返回 `(事件, 发布端是否已全部关闭)`。
    pub fn drain(&mut self) -> (Vec<StationEvent>, bool) {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => return (events, false),
                Err(TryRecvError::Disconnected) => return (events, true),
            }
        }
    }

    /// 等待下一个事件
    pub async fn recv(&mut self) -> Option<StationEvent> {
        self.receiver.recv().await
    }
}
