// ==========================================
// 能源灵活性市场 Planboard - 结算分摊引擎
// ==========================================
// 职责: 把 (实际功率 - 预测功率) 的偏差按优先级分摊到订单上
// 规则:
//   1) 订单按序号降序（后下的订单优先认领偏差）
//   2) totalDeficiency = actual - prognosis
//   3) 对每个订单:
//      flex >= 0 且 total < 0 → orderDeficiency = max(total, -flex)
//      flex <  0 且 total >= 0 → orderDeficiency = min(total, |flex|)
//      其他                    → 0
//      delivered = flex + orderDeficiency; total -= orderDeficiency
// 范围: 功率为 i64 瓦特；actual - prognosis 超出 i64 时饱和到边界
// 红线: 纯计算，无副作用，不持锁，不跨事务
// ==========================================

use crate::domain::document::PlanboardDocument;
use crate::domain::portfolio::MeteredPortfolio;
use crate::domain::settlement::{FlexOrderSettlement, PtuSettlement};
use crate::engine::portfolio::PortfolioPowerCalculator;
use crate::engine::time_index::PtuTimeIndex;
use chrono::NaiveDate;
use tracing::instrument;

/// 单个 PTU 的总缺口 (actual - prognosis)，越界时饱和
pub fn total_deficiency(actual_power: i64, prognosis_power: i64) -> i64 {
    actual_power.saturating_sub(prognosis_power)
}

/// 单个订单在单个 PTU 上认领的缺口
///
/// 结果与 total_deficiency 同号且绝对值不超过它，调用方扣减剩余缺口不会溢出
pub fn order_deficiency(flex_power: i64, total_deficiency: i64) -> i64 {
    if flex_power >= 0 && total_deficiency < 0 {
        total_deficiency.max(-flex_power)
    } else if flex_power < 0 && total_deficiency >= 0 {
        // i64::MIN 的绝对值饱和为 i64::MAX，不影响 min 的结果
        total_deficiency.min(flex_power.saturating_neg())
    } else {
        0
    }
}

/// 按优先级顺序分摊一个 PTU 的缺口
///
/// `flex_powers` 必须已按优先级排列；返回值与之一一对应
pub fn allocate_deficiency(total_deficiency: i64, flex_powers: &[i64]) -> Vec<i64> {
    let mut remaining = total_deficiency;
    flex_powers
        .iter()
        .map(|&flex| {
            let deficiency = order_deficiency(flex, remaining);
            remaining -= deficiency;
            deficiency
        })
        .collect()
}

// ==========================================
// SettlementAllocationEngine
// ==========================================
pub struct SettlementAllocationEngine {
    time_index: PtuTimeIndex,
    calculator: PortfolioPowerCalculator,
}

impl SettlementAllocationEngine {
    pub fn new(time_index: PtuTimeIndex) -> Self {
        Self {
            calculator: PortfolioPowerCalculator::new(time_index.ptu_duration_minutes()),
            time_index,
        }
    }

    /// 计算一个 (连接组, 参与方, 日期) 的订单结算
    ///
    /// # 参数
    /// - `orders`: 该组的 ACCEPTED 订单（顺序不限）
    /// - `prognosis`: 已解析的权威预测
    /// - `portfolio`: 已按连接组归属过滤的计量组合
    ///
    /// # 返回
    /// 每个订单一条结算，按优先级（序号降序）排列；金额字段为 0，由定价协作方填写
    ///
    /// 功率取值范围为 i64；偏差超出范围时按饱和值分摊
    #[instrument(skip_all, fields(
        period = %period,
        connection_group = %connection_group_id,
        participant = %participant_domain,
        orders_count = orders.len(),
        prognosis_sequence = prognosis.sequence_number
    ))]
    pub fn compute_settlement(
        &self,
        period: NaiveDate,
        connection_group_id: &str,
        participant_domain: &str,
        orders: &[PlanboardDocument],
        prognosis: &PlanboardDocument,
        portfolio: &MeteredPortfolio,
    ) -> Vec<FlexOrderSettlement> {
        let mut ordered: Vec<&PlanboardDocument> = orders.iter().collect();
        ordered.sort_by(|a, b| b.sequence_number.cmp(&a.sequence_number));

        let mut settlements: Vec<FlexOrderSettlement> = ordered
            .iter()
            .map(|order| FlexOrderSettlement {
                order_sequence: order.sequence_number,
                participant_domain: participant_domain.to_string(),
                connection_group_id: connection_group_id.to_string(),
                period,
                prognosis_sequence: Some(prognosis.sequence_number),
                verdict: None,
                ptus: Vec::new(),
            })
            .collect();

        for ptu_index in self.time_index.ptu_indices(period) {
            let actual = self.calculator.actual_power(portfolio, ptu_index);
            let prognosis_power = prognosis.power_at(ptu_index);
            let flex_powers: Vec<i64> = ordered.iter().map(|o| o.power_at(ptu_index)).collect();
            let deficiencies =
                allocate_deficiency(total_deficiency(actual, prognosis_power), &flex_powers);

            for ((settlement, flex), deficiency) in settlements
                .iter_mut()
                .zip(flex_powers.iter())
                .zip(deficiencies.iter())
            {
                settlement.ptus.push(PtuSettlement::new(
                    ptu_index,
                    actual,
                    prognosis_power,
                    *flex,
                    *deficiency,
                ));
            }
        }

        tracing::debug!(settlements = settlements.len(), "结算分摊完成");
        settlements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::{ConnectionPortfolio, PowerContainer, PowerData};
    use crate::domain::types::DocumentType;
    use crate::domain::PtuDocumentRow;

    fn period() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn document(document_type: DocumentType, seq: i64, power: i64, ptus: i32) -> PlanboardDocument {
        PlanboardDocument::new(
            document_type,
            seq,
            "dso1",
            "cp1",
            period(),
            period().and_hms_opt(0, 0, 0).unwrap(),
        )
        .with_ptus((1..=ptus).map(|i| PtuDocumentRow::power(i, power)).collect())
    }

    fn flat_portfolio(load: i64, ptus: i32) -> MeteredPortfolio {
        let mut connection = ConnectionPortfolio::new("ean.1");
        for i in 1..=ptus {
            connection.ptus.insert(i, PowerContainer::observed(PowerData::load(load)));
        }
        MeteredPortfolio {
            connections: vec![connection],
        }
    }

    #[test]
    fn test_priority_respected_for_surplus() {
        // 序号 2 先认领自身容量，序号 1 认领剩余
        assert_eq!(allocate_deficiency(-1200, &[1000, 500]), vec![-1000, -200]);
    }

    #[test]
    fn test_priority_respected_for_shortfall() {
        assert_eq!(allocate_deficiency(1200, &[-1000, -500]), vec![1000, 200]);
    }

    #[test]
    fn test_same_sign_deficiency_is_not_allocated() {
        // 订单 -1000 / -500 与缺口 -1200 同号: 两单都不认领
        assert_eq!(allocate_deficiency(-1200, &[-1000, -500]), vec![0, 0]);
    }

    #[test]
    fn test_extreme_powers_do_not_overflow() {
        assert_eq!(total_deficiency(i64::MAX, -1), i64::MAX);
        assert_eq!(total_deficiency(i64::MIN, 1), i64::MIN);
        assert_eq!(order_deficiency(i64::MIN, i64::MAX), i64::MAX);
        assert_eq!(order_deficiency(i64::MAX, i64::MIN), -i64::MAX);
        assert_eq!(
            allocate_deficiency(i64::MAX, &[i64::MIN, -1]),
            vec![i64::MAX, 0]
        );
    }

    #[test]
    fn test_mismatched_sign_absorbs_nothing() {
        assert_eq!(order_deficiency(-1000, -940), 0);
        assert_eq!(order_deficiency(1000, 940), 0);
        assert_eq!(order_deficiency(0, 500), 0);
        assert_eq!(order_deficiency(0, -500), 0);
    }

    #[test]
    fn test_deficiency_conservation() {
        let cases: Vec<(i64, Vec<i64>)> = vec![
            (-1200, vec![1000, 500]),
            (-300, vec![1000, 500]),
            (-5000, vec![1000, 500, 250]),
            (800, vec![-300, -300, -300]),
            (2000, vec![-300, -300]),
            (0, vec![-300, 300]),
        ];

        for (total, flex) in cases {
            let allocated = allocate_deficiency(total, &flex);
            let sum: i64 = allocated.iter().sum();
            let capacity: i64 = flex
                .iter()
                .filter(|f| if total < 0 { **f >= 0 } else { **f < 0 })
                .map(|f| f.abs())
                .sum();
            assert_eq!(sum.abs(), total.abs().min(capacity), "total={}, flex={:?}", total, flex);
            assert!(allocated.iter().all(|d| d.signum() == 0 || d.signum() == total.signum()));
        }
    }

    #[test]
    fn test_reference_boundary_scenario() {
        // actual 2060 / prognosis 3000 / order -1000
        let engine = SettlementAllocationEngine::new(PtuTimeIndex::new(120).unwrap());
        let order = document(DocumentType::FlexOrder, 1, -1000, 12);
        let prognosis = document(DocumentType::Prognosis, 1, 3000, 12);
        let portfolio = flat_portfolio(2060, 12);

        let settlements =
            engine.compute_settlement(period(), "cp1", "dso1", &[order], &prognosis, &portfolio);
        assert_eq!(settlements.len(), 1);
        let settlement = &settlements[0];
        assert_eq!(settlement.ptus.len(), 12);
        for ptu in &settlement.ptus {
            assert_eq!(ptu.actual_power, 2060);
            assert_eq!(ptu.prognosis_power, 3000);
            assert_eq!(ptu.ordered_flex_power, -1000);
            assert_eq!(ptu.delivered_flex_power, -1000);
            assert_eq!(ptu.power_deficiency, 0);
        }
    }

    #[test]
    fn test_orders_emitted_in_priority_order() {
        let engine = SettlementAllocationEngine::new(PtuTimeIndex::new(60).unwrap());
        let older = document(DocumentType::FlexOrder, 1, 500, 24);
        let newer = document(DocumentType::FlexOrder, 2, 1000, 24);
        let prognosis = document(DocumentType::Prognosis, 9, 3000, 24);
        let portfolio = flat_portfolio(1800, 24);

        let settlements = engine.compute_settlement(
            period(),
            "cp1",
            "dso1",
            &[older, newer],
            &prognosis,
            &portfolio,
        );
        assert_eq!(settlements[0].order_sequence, 2);
        assert_eq!(settlements[1].order_sequence, 1);

        let first = settlements[0].ptu(1).unwrap();
        let second = settlements[1].ptu(1).unwrap();
        assert_eq!(first.power_deficiency, -1000);
        assert_eq!(first.delivered_flex_power, 0);
        assert_eq!(second.power_deficiency, -200);
        assert_eq!(second.delivered_flex_power, 300);
        assert_eq!(settlements[0].prognosis_sequence, Some(9));
    }
}
