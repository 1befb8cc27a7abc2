// ==========================================
// 能源灵活性市场 Planboard - 计量组合输入
// ==========================================
// 职责: 外部协作方提供的、已按 PTU 切片的计量/预测功率
// 说明: 本核心不抓取原始计量数据，只消费此内存结构
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// PowerData - 一组功率读数
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerData {
    pub uncontrolled_load: Option<i64>,
    pub average_consumption: Option<i64>,
    pub average_production: Option<i64>,
}

impl PowerData {
    pub fn load(uncontrolled_load: i64) -> Self {
        Self {
            uncontrolled_load: Some(uncontrolled_load),
            ..Default::default()
        }
    }

    pub fn device(average_consumption: i64, average_production: i64) -> Self {
        Self {
            uncontrolled_load: None,
            average_consumption: Some(average_consumption),
            average_production: Some(average_production),
        }
    }

    fn is_empty(&self) -> bool {
        self.uncontrolled_load.is_none()
            && self.average_consumption.is_none()
            && self.average_production.is_none()
    }

    /// 用电减发电
    pub fn net_device_power(&self) -> i64 {
        self.average_consumption
            .unwrap_or(0)
            .saturating_sub(self.average_production.unwrap_or(0))
    }
}

// ==========================================
// PowerContainer - 单个时间片的三类数据
// ==========================================
// 精度: observed > forecast > profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerContainer {
    pub profile: Option<PowerData>,
    pub forecast: Option<PowerData>,
    pub observed: Option<PowerData>,
}

impl PowerContainer {
    pub fn observed(data: PowerData) -> Self {
        Self {
            observed: Some(data),
            ..Default::default()
        }
    }

    pub fn forecast(data: PowerData) -> Self {
        Self {
            forecast: Some(data),
            ..Default::default()
        }
    }

    /// 取最精确的数据
    pub fn most_accurate(&self) -> Option<&PowerData> {
        [&self.observed, &self.forecast, &self.profile]
            .into_iter()
            .flatten()
            .find(|d| !d.is_empty())
    }
}

// ==========================================
// UdiPortfolio - 可控设备 (UDI)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdiPortfolio {
    pub endpoint: String,
    pub dtu_size_minutes: u32,                     // DTU 长度（分钟）
    pub dtus: BTreeMap<i32, PowerContainer>,       // DTU 序号 (从 1 开始) → 数据
}

// ==========================================
// ConnectionPortfolio - 单个连接的组合数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPortfolio {
    pub entity_address: String,
    pub ptus: BTreeMap<i32, PowerContainer>,       // 连接级 PTU 数据
    pub udis: Vec<UdiPortfolio>,
}

impl ConnectionPortfolio {
    pub fn new(entity_address: impl Into<String>) -> Self {
        Self {
            entity_address: entity_address.into(),
            ptus: BTreeMap::new(),
            udis: Vec::new(),
        }
    }
}

// ==========================================
// MeteredPortfolio - 一个日期的完整组合
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteredPortfolio {
    pub connections: Vec<ConnectionPortfolio>,
}

impl MeteredPortfolio {
    /// 只保留指定连接
    pub fn restricted_to(&self, entity_addresses: &[String]) -> MeteredPortfolio {
        MeteredPortfolio {
            connections: self
                .connections
                .iter()
                .filter(|c| entity_addresses.contains(&c.entity_address))
                .cloned()
                .collect(),
        }
    }
}
