// ==========================================
// 能源灵活性市场 Planboard - PTU 容器
// ==========================================
// 每个 (日期, PTU序号) 一条记录，记录当前所处阶段
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::types::PhaseType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtuContainer {
    pub period: NaiveDate,
    pub ptu_index: i32,
    pub phase: PhaseType,
}

impl PtuContainer {
    pub fn new(period: NaiveDate, ptu_index: i32) -> Self {
        Self {
            period,
            ptu_index,
            phase: PhaseType::Plan,
        }
    }

    /// 是否仍可修改（未进入结算阶段）
    pub fn is_mutable(&self) -> bool {
        self.phase != PhaseType::Settlement
    }
}

/// 阶段推进过滤条件
///
/// - `ptu_index`: 只推进单个 PTU（None 表示整天）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PtuFilter {
    pub ptu_index: Option<i32>,
}

impl PtuFilter {
    pub fn all() -> Self {
        Self { ptu_index: None }
    }

    pub fn single(ptu_index: i32) -> Self {
        Self {
            ptu_index: Some(ptu_index),
        }
    }
}
