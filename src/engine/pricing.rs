// ==========================================
// 能源灵活性市场 Planboard - 结算定价
// ==========================================
// 职责: 为分摊结果填写 price / penalty / netSettlement
// 约定: netSettlement = price - penalty
// ==========================================

use crate::domain::document::PlanboardDocument;
use crate::domain::settlement::FlexOrderSettlement;
use rust_decimal::Decimal;

/// 定价协作方接口
pub trait SettlementPricer: Send + Sync {
    /// 为一条订单结算定价（原地修改）
    fn price(&self, order: &PlanboardDocument, settlement: &mut FlexOrderSettlement);
}

/// 默认定价: 价格取订单 PTU 价格，无罚金
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedPricePricer;

impl SettlementPricer for OrderedPricePricer {
    fn price(&self, order: &PlanboardDocument, settlement: &mut FlexOrderSettlement) {
        for ptu in settlement.ptus.iter_mut() {
            ptu.price = order.price_at(ptu.ptu_index).unwrap_or(Decimal::ZERO);
            ptu.penalty = Decimal::ZERO;
            ptu.net_settlement = ptu.price - ptu.penalty;
        }
    }
}
