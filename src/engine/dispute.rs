// ==========================================
// 能源灵活性市场 Planboard - 结算争议校验
// ==========================================
// 职责: 比较对方提交的结算与本地准备的结算
// 规则:
//   - 本地无对应结算 → DISPUTED（未在本地准备）
//   - PTU 个数不一致、序号重复或序号未知 → 协议错误（不是争议）
//     三项检查通过后，双方的 PTU 序号集合相同
//   - 逐 PTU 比较 actual / ordered / prognosis 功率与 price:
//     |received - prepared| >= tolerance × |prepared| 记为争议
//     （两值相等时永不争议）
//   - 任一字段争议 → DISPUTED；全部 PTU 都会扫描，便于诊断
// 红线: 纯计算，无副作用
// ==========================================

use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::settlement::{FlexOrderSettlement, PtuSettlement};
use crate::domain::types::SettlementVerdict;

// ==========================================
// 错误（协议级，区别于争议）
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementProtocolError {
    #[error("PTU 个数不一致: order={order_sequence}, received={received}, prepared={prepared}")]
    PtuCountMismatch {
        order_sequence: i64,
        received: usize,
        prepared: usize,
    },

    #[error("PTU 序号在本地结算中不存在: order={order_sequence}, ptu_index={ptu_index}")]
    UnknownPtu { order_sequence: i64, ptu_index: i32 },

    #[error("PTU 序号重复: order={order_sequence}, ptu_index={ptu_index}")]
    DuplicatePtu { order_sequence: i64, ptu_index: i32 },
}

// ==========================================
// 报告
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementField {
    ActualPower,
    OrderedFlexPower,
    PrognosisPower,
    Price,
}

impl fmt::Display for SettlementField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettlementField::ActualPower => "ACTUAL_POWER",
            SettlementField::OrderedFlexPower => "ORDERED_FLEX_POWER",
            SettlementField::PrognosisPower => "PROGNOSIS_POWER",
            SettlementField::Price => "PRICE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDispute {
    pub ptu_index: i32,
    pub field: SettlementField,
    pub received: Decimal,
    pub prepared: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementValidationReport {
    pub order_sequence: i64,
    pub participant_domain: String,
    pub verdict: SettlementVerdict,
    pub prepared_locally: bool,
    pub disputes: Vec<FieldDispute>,
}

impl SettlementValidationReport {
    pub fn is_accepted(&self) -> bool {
        self.verdict == SettlementVerdict::Accepted
    }
}

/// 单字段是否争议
pub fn is_disputed(received: Decimal, prepared: Decimal, tolerance: Decimal) -> bool {
    if received == prepared {
        return false;
    }
    (received - prepared).abs() >= tolerance * prepared.abs()
}

// ==========================================
// SettlementDisputeValidator
// ==========================================
pub struct SettlementDisputeValidator {
    tolerance: Decimal,
}

impl SettlementDisputeValidator {
    /// `tolerance` 为相对容差，如 0.2 表示 20%
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    pub fn validate(
        &self,
        received: &FlexOrderSettlement,
        prepared: Option<&FlexOrderSettlement>,
    ) -> Result<SettlementValidationReport, SettlementProtocolError> {
        let mut report = SettlementValidationReport {
            order_sequence: received.order_sequence,
            participant_domain: received.participant_domain.clone(),
            verdict: SettlementVerdict::Accepted,
            prepared_locally: prepared.is_some(),
            disputes: Vec::new(),
        };

        let prepared = match prepared {
            Some(prepared) => prepared,
            None => {
                info!(
                    order_sequence = received.order_sequence,
                    participant = %received.participant_domain,
                    "结算未在本地准备，判定为争议"
                );
                report.verdict = SettlementVerdict::Disputed;
                return Ok(report);
            }
        };

        if received.ptus.len() != prepared.ptus.len() {
            return Err(SettlementProtocolError::PtuCountMismatch {
                order_sequence: received.order_sequence,
                received: received.ptus.len(),
                prepared: prepared.ptus.len(),
            });
        }

        let prepared_by_index: HashMap<i32, &PtuSettlement> =
            prepared.ptus.iter().map(|p| (p.ptu_index, p)).collect();

        let mut seen = HashSet::new();
        for received_ptu in &received.ptus {
            if !seen.insert(received_ptu.ptu_index) {
                return Err(SettlementProtocolError::DuplicatePtu {
                    order_sequence: received.order_sequence,
                    ptu_index: received_ptu.ptu_index,
                });
            }
            if !prepared_by_index.contains_key(&received_ptu.ptu_index) {
                return Err(SettlementProtocolError::UnknownPtu {
                    order_sequence: received.order_sequence,
                    ptu_index: received_ptu.ptu_index,
                });
            }
        }

        for received_ptu in &received.ptus {
            let prepared_ptu = prepared_by_index.get(&received_ptu.ptu_index).ok_or(
                SettlementProtocolError::UnknownPtu {
                    order_sequence: received.order_sequence,
                    ptu_index: received_ptu.ptu_index,
                },
            )?;

            let fields = [
                (
                    SettlementField::ActualPower,
                    Decimal::from(received_ptu.actual_power),
                    Decimal::from(prepared_ptu.actual_power),
                ),
                (
                    SettlementField::OrderedFlexPower,
                    Decimal::from(received_ptu.ordered_flex_power),
                    Decimal::from(prepared_ptu.ordered_flex_power),
                ),
                (
                    SettlementField::PrognosisPower,
                    Decimal::from(received_ptu.prognosis_power),
                    Decimal::from(prepared_ptu.prognosis_power),
                ),
                (SettlementField::Price, received_ptu.price, prepared_ptu.price),
            ];

            for (field, received_value, prepared_value) in fields {
                if is_disputed(received_value, prepared_value, self.tolerance) {
                    debug!(
                        order_sequence = received.order_sequence,
                        ptu_index = received_ptu.ptu_index,
                        field = %field,
                        received = %received_value,
                        prepared = %prepared_value,
                        "结算字段超出容差"
                    );
                    report.disputes.push(FieldDispute {
                        ptu_index: received_ptu.ptu_index,
                        field,
                        received: received_value,
                        prepared: prepared_value,
                    });
                }
            }
        }

        if !report.disputes.is_empty() {
            report.verdict = SettlementVerdict::Disputed;
        }

        info!(
            order_sequence = received.order_sequence,
            participant = %received.participant_domain,
            verdict = %report.verdict,
            disputes = report.disputes.len(),
            "结算校验完成"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn settlement(prognosis_power: i64, price: Decimal) -> FlexOrderSettlement {
        let mut ptu = PtuSettlement::new(1, 2060, prognosis_power, -1000, 0);
        ptu.price = price;
        ptu.net_settlement = price;
        FlexOrderSettlement {
            order_sequence: 1,
            participant_domain: "dso1".to_string(),
            connection_group_id: "cp1".to_string(),
            period: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            prognosis_sequence: Some(1),
            verdict: None,
            ptus: vec![ptu],
        }
    }

    #[test]
    fn test_identical_settlements_never_dispute() {
        let x = settlement(100, Decimal::new(5, 1));
        for tolerance in [Decimal::ZERO, Decimal::new(2, 1), Decimal::ONE] {
            let report = SettlementDisputeValidator::new(tolerance)
                .validate(&x, Some(&x))
                .unwrap();
            assert!(report.is_accepted());
            assert!(report.disputes.is_empty());
        }
    }

    #[test]
    fn test_prognosis_mismatch_disputes() {
        let received = settlement(200, Decimal::ONE);
        let prepared = settlement(100, Decimal::ONE);
        let report = SettlementDisputeValidator::new(Decimal::new(2, 1))
            .validate(&received, Some(&prepared))
            .unwrap();
        assert_eq!(report.verdict, SettlementVerdict::Disputed);
        assert_eq!(report.disputes.len(), 1);
        assert_eq!(report.disputes[0].field, SettlementField::PrognosisPower);
    }

    #[test]
    fn test_within_tolerance_is_accepted() {
        let received = settlement(110, Decimal::ONE);
        let prepared = settlement(100, Decimal::ONE);
        let report = SettlementDisputeValidator::new(Decimal::new(2, 1))
            .validate(&received, Some(&prepared))
            .unwrap();
        assert!(report.is_accepted());
    }

    #[test]
    fn test_missing_prepared_disputes() {
        let received = settlement(100, Decimal::ONE);
        let report = SettlementDisputeValidator::new(Decimal::new(2, 1))
            .validate(&received, None)
            .unwrap();
        assert_eq!(report.verdict, SettlementVerdict::Disputed);
        assert!(!report.prepared_locally);
    }

    #[test]
    fn test_ptu_count_mismatch_is_protocol_error() {
        let received = settlement(100, Decimal::ONE);
        let mut prepared = settlement(100, Decimal::ONE);
        prepared.ptus.push(PtuSettlement::new(2, 0, 0, 0, 0));
        let err = SettlementDisputeValidator::new(Decimal::new(2, 1))
            .validate(&received, Some(&prepared))
            .unwrap_err();
        assert!(matches!(err, SettlementProtocolError::PtuCountMismatch { received: 1, prepared: 2, .. }));
    }

    #[test]
    fn test_repeated_ptu_hiding_a_missing_one_is_protocol_error() {
        let mut prepared = settlement(100, Decimal::ONE);
        prepared.ptus.push(PtuSettlement::new(2, 9999, 100, -1000, 0));
        let mut received = settlement(100, Decimal::ONE);
        received.ptus.push(received.ptus[0].clone());

        let err = SettlementDisputeValidator::new(Decimal::new(2, 1))
            .validate(&received, Some(&prepared))
            .unwrap_err();
        assert_eq!(
            err,
            SettlementProtocolError::DuplicatePtu {
                order_sequence: 1,
                ptu_index: 1
            }
        );
    }

    #[test]
    fn test_unknown_ptu_index_is_protocol_error() {
        let prepared = settlement(100, Decimal::ONE);
        let mut received = settlement(100, Decimal::ONE);
        received.ptus[0].ptu_index = 7;

        let err = SettlementDisputeValidator::new(Decimal::new(2, 1))
            .validate(&received, Some(&prepared))
            .unwrap_err();
        assert!(matches!(err, SettlementProtocolError::UnknownPtu { ptu_index: 7, .. }));
    }
}
