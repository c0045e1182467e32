/// 测试设备注册表
///
/// 按注册顺序保存测试站的全部设备。设备在整个进程生命周期内只创建一次，
/// 不同部件号的测试流程共享同一个注册表（克隆共享同一份设备列表）。

use crate::services::traits::{Equipment, SharedEquipment};
use crate::utils::error::EquipmentFailure;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use log::{debug, error, info, warn};

#[derive(Clone, Default)]
pub struct EquipmentRegistry {
    entries: Arc<RwLock<Vec<(String, SharedEquipment)>>>,
}

impl EquipmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册设备，同名设备会被替换（保留原位置）
    pub fn register<E>(&self, key: impl Into<String>, equipment: E) -> SharedEquipment
    where
        E: Equipment + 'static,
    {
        let boxed: Box<dyn Equipment> = Box::new(equipment);
        let shared: SharedEquipment = Arc::new(Mutex::new(boxed));
        self.register_shared(key, shared.clone());
        shared
    }

    pub fn register_shared(&self, key: impl Into<String>, equipment: SharedEquipment) {
        let key = key.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => {
                warn!("[Equipment] 替换已注册的设备: {}", key);
                entry.1 = equipment;
            }
            None => {
                debug!("[Equipment] 注册设备: {}", key);
                entries.push((key, equipment));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<SharedEquipment> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, eq)| eq.clone())
    }

    /// 注册顺序的设备键列表
    pub fn keys(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|(k, _)| k).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<(String, SharedEquipment)> {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 按注册顺序连接所有未连接的设备
    ///
    /// 遇到第一个失败立即返回，之前已连接的设备保持连接。
    pub async fn connect_all(&self) -> Result<(), EquipmentFailure> {
        for (key, equipment) in self.snapshot() {
            let mut eq = equipment.lock().await;
            if eq.is_connected() {
                continue;
            }

            info!("🔗 连接设备: {} ({})", eq.name(), key);
            if let Err(e) = eq.connect().await {
                let failure = EquipmentFailure::new(eq.name(), e.to_string());
                crate::log_equipment_failure!("{}", failure);
                return Err(failure);
            }
            info!("✅ 设备已连接: {}", eq.name());
        }
        Ok(())
    }

    /// 断开所有已连接的设备，单个设备断开失败只记录日志
    pub async fn disconnect_all(&self) {
        for (_, equipment) in self.snapshot() {
            let mut eq = equipment.lock().await;
            if !eq.is_connected() {
                continue;
            }
            match eq.disconnect().await {
                Ok(()) => info!("🔌 设备已断开: {}", eq.name()),
                Err(e) => error!("❌ 断开设备失败: {} - {}", eq.name(), e),
            }
        }
    }

    /// 各设备的连接状态（注册顺序）
    pub async fn connection_status(&self) -> Vec<(String, bool)> {
        let mut status = Vec::new();
        for (key, equipment) in self.snapshot() {
            status.push((key, equipment.lock().await.is_connected()));
        }
        status
    }
}
