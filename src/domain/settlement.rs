// ==========================================
// 能源灵活性市场 Planboard - 结算领域模型
// ==========================================
// 职责: 单个灵活性订单在一个日期上的结算结果
// 说明: 由结算分摊引擎派生，落库由独立的幂等写入步骤完成
// ==========================================

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::types::SettlementVerdict;

// ==========================================
// PtuSettlement - 单 PTU 结算
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtuSettlement {
    pub ptu_index: i32,

    // ===== 功率 (W) =====
    pub actual_power: i64,         // 计量实际功率
    pub prognosis_power: i64,      // 预测功率
    pub ordered_flex_power: i64,   // 订购灵活性
    pub delivered_flex_power: i64, // 交付灵活性
    pub power_deficiency: i64,     // 功率缺口

    // ===== 金额（由定价协作方填写） =====
    pub price: Decimal,
    pub penalty: Decimal,
    pub net_settlement: Decimal,
}

impl PtuSettlement {
    pub fn new(
        ptu_index: i32,
        actual_power: i64,
        prognosis_power: i64,
        ordered_flex_power: i64,
        power_deficiency: i64,
    ) -> Self {
        Self {
            ptu_index,
            actual_power,
            prognosis_power,
            ordered_flex_power,
            delivered_flex_power: ordered_flex_power + power_deficiency,
            power_deficiency,
            price: Decimal::ZERO,
            penalty: Decimal::ZERO,
            net_settlement: Decimal::ZERO,
        }
    }
}

// ==========================================
// FlexOrderSettlement - 订单结算
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexOrderSettlement {
    pub order_sequence: i64,
    pub participant_domain: String,
    pub connection_group_id: String,
    pub period: NaiveDate,
    pub prognosis_sequence: Option<i64>,        // 结算所依据的预测
    pub verdict: Option<SettlementVerdict>,     // 确认/争议标注
    pub ptus: Vec<PtuSettlement>,
}

impl FlexOrderSettlement {
    pub fn ptu(&self, ptu_index: i32) -> Option<&PtuSettlement> {
        self.ptus.iter().find(|p| p.ptu_index == ptu_index)
    }

    pub fn total_power_deficiency(&self) -> i64 {
        self.ptus.iter().map(|p| p.power_deficiency).sum()
    }

    pub fn total_delivered_flex_power(&self) -> i64 {
        self.ptus.iter().map(|p| p.delivered_flex_power).sum()
    }

    pub fn total_net_settlement(&self) -> Decimal {
        self.ptus.iter().map(|p| p.net_settlement).sum()
    }
}
