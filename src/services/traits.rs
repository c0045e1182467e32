/// 服务层基础trait定义
/// 测试站核心与外部协作者之间的接口：测试设备与显示层

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use crate::models::TaskUpdate;
use crate::services::infrastructure::event_bridge::PassFailQuery;
use crate::utils::error::AppResult;

/// 测试设备接口
///
/// 扫码枪、RFID读写器、电源、万用表、频谱仪等设备只需要向核心暴露
/// 名称、连接状态和连接/断开操作；具体的通信协议由各设备驱动自己实现。
#[async_trait]
pub trait Equipment: Send {
    /// 设备名称（用于日志与错误提示）
    fn name(&self) -> &str;

    /// 是否已连接
    fn is_connected(&self) -> bool;

    /// 连接设备，失败时返回传输层错误
    async fn connect(&mut self) -> AppResult<()>;

    /// 断开设备
    async fn disconnect(&mut self) -> AppResult<()>;
}

/// 跨作业、跨测试共享的设备实例
///
/// 设备本身不可重入；核心只保证同一时刻只有一个测试在运行，不额外串行化设备访问。
pub type SharedEquipment = Arc<Mutex<Box<dyn Equipment>>>;

/// 显示层接口
///
/// 所有方法都只在显示层自己的单线程循环中调用（见 `DisplayLoop`），
/// 因此实现者可以直接修改自己的界面状态而不需要加锁。
pub trait IStationView: Send {
    /// 顺序测试的状态变化
    fn on_test_state(&mut self, update: &TaskUpdate);

    /// 夹具检验的状态变化
    fn on_verify_state(&mut self, update: &TaskUpdate);

    /// 整个测试流程结束，`passed` 为汇总结论
    fn on_procedure_complete(&mut self, passed: bool);

    /// 请求操作员人工判定，通过 `query.responder` 回复
    fn on_pass_fail_query(&mut self, query: PassFailQuery);

    /// 测试执行中出现意外错误
    fn on_test_error(&mut self, test_name: &str, message: &str);

    /// 显示循环是否可以退出
    fn is_finished(&self) -> bool {
        false
    }
}
