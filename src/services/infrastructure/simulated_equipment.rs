/// 模拟测试设备
///
/// 没有真实硬件时（演示、离线调试、自动化测试）代替扫码枪、电源等设备使用。
/// 可以配置连接失败和连接耗时，并统计连接/断开次数。

use crate::services::traits::Equipment;
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use log::debug;

#[derive(Debug)]
pub struct SimulatedEquipment {
    name: String,
    connected: bool,
    fail_connect: Option<String>,
    connect_delay: Duration,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl SimulatedEquipment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: false,
            fail_connect: None,
            connect_delay: Duration::ZERO,
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 连接总是失败，返回给定的传输错误
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_connect = Some(message.into());
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// 成功连接次数计数器
    pub fn connect_counter(&self) -> Arc<AtomicUsize> {
        self.connects.clone()
    }

    pub fn disconnect_counter(&self) -> Arc<AtomicUsize> {
        self.disconnects.clone()
    }

    /// 演示测试站使用的设备清单：(键, 设备)
    pub fn demo_station() -> Vec<(&'static str, SimulatedEquipment)> {
        vec![
            ("barcode", SimulatedEquipment::new("Honeywell Barcode Reader")),
            ("rfid", SimulatedEquipment::new("RFID Reader")),
            ("psu", SimulatedEquipment::new("Keithley 2200 Power Supply")),
            ("dmm", SimulatedEquipment::new("Keysight Multimeter")),
        ]
    }
}

#[async_trait]
impl Equipment for SimulatedEquipment {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> AppResult<()> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if let Some(message) = &self.fail_connect {
            return Err(AppError::equipment_communication_error(message.clone()));
        }
        self.connected = true;
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!("[SimEquipment] {} 已连接", self.name);
        Ok(())
    }

    async fn disconnect(&mut self) -> AppResult<()> {
        self.connected = false;
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        debug!("[SimEquipment] {} 已断开", self.name);
        Ok(())
    }
}
