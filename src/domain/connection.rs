// ==========================================
// 能源灵活性市场 Planboard - 连接与连接组
// ==========================================
// 职责: 物理连接、连接组（阻塞点/BRP/聚合商）及随时间变化的归属关系
// 约定: valid_until 为开区间上界 [valid_from, valid_until)
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::types::ConnectionGroupType;

// ==========================================
// Connection - 物理连接
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: i64,
    pub entity_address: String, // EAN 地址
}

// ==========================================
// ConnectionGroup - 连接组
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionGroup {
    pub id: i64,
    pub group_id: String,                // 业务标识（阻塞点 EAN / BRP 域名 / 聚合商域名）
    pub group_type: ConnectionGroupType,
}

// ==========================================
// ConnectionGroupState - 归属区间
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionGroupState {
    pub connection_entity_address: String,
    pub connection_group_id: String,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate, // 不含
}

impl ConnectionGroupState {
    pub fn new(
        connection_entity_address: impl Into<String>,
        connection_group_id: impl Into<String>,
        valid_from: NaiveDate,
        valid_until: NaiveDate,
    ) -> Self {
        Self {
            connection_entity_address: connection_entity_address.into(),
            connection_group_id: connection_group_id.into(),
            valid_from,
            valid_until,
        }
    }

    /// 指定日期是否落在区间内
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date < self.valid_until
    }

    /// 区间是否合法（非空）
    pub fn is_well_formed(&self) -> bool {
        self.valid_from < self.valid_until
    }

    /// 同一连接/组的两个区间是否重叠
    pub fn overlaps(&self, other: &ConnectionGroupState) -> bool {
        self.connection_entity_address == other.connection_entity_address
            && self.connection_group_id == other.connection_group_id
            && self.valid_from < other.valid_until
            && other.valid_from < self.valid_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    #[test]
    fn test_valid_until_is_exclusive() {
        let state = ConnectionGroupState::new("ean.1", "cp.1", d(1), d(10));
        assert!(state.is_valid_on(d(1)));
        assert!(state.is_valid_on(d(9)));
        assert!(!state.is_valid_on(d(10)));
    }

    #[test]
    fn test_adjacent_intervals_do_not_overlap() {
        let first = ConnectionGroupState::new("ean.1", "cp.1", d(1), d(10));
        let second = ConnectionGroupState::new("ean.1", "cp.1", d(10), d(20));
        let third = ConnectionGroupState::new("ean.1", "cp.1", d(5), d(12));
        let other_group = ConnectionGroupState::new("ean.1", "cp.2", d(5), d(12));

        assert!(!first.overlaps(&second));
        assert!(first.overlaps(&third));
        assert!(second.overlaps(&third));
        assert!(!first.overlaps(&other_group));
    }
}
