// ==========================================
// 能源灵活性市场 Planboard - 领域类型定义
// ==========================================
// 职责: 文档类型、文档状态、PTU 阶段、连接组类型等封闭枚举
// 约定: 数据库存储使用 SCREAMING_SNAKE_CASE
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 文档类型 (Document Type)
// ==========================================
// 单表 + document_type 判别列，解码时强类型化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Prognosis,      // 预测 (A-Plan / D-Prognosis)
    FlexRequest,    // 灵活性请求
    FlexOffer,      // 灵活性报价
    FlexOrder,      // 灵活性订单
    SettlementItem, // 结算项
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl DocumentType {
    /// 从字符串解析文档类型
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PROGNOSIS" => Some(DocumentType::Prognosis),
            "FLEX_REQUEST" => Some(DocumentType::FlexRequest),
            "FLEX_OFFER" => Some(DocumentType::FlexOffer),
            "FLEX_ORDER" => Some(DocumentType::FlexOrder),
            "SETTLEMENT_ITEM" => Some(DocumentType::SettlementItem),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DocumentType::Prognosis => "PROGNOSIS",
            DocumentType::FlexRequest => "FLEX_REQUEST",
            DocumentType::FlexOffer => "FLEX_OFFER",
            DocumentType::FlexOrder => "FLEX_ORDER",
            DocumentType::SettlementItem => "SETTLEMENT_ITEM",
        }
    }

    /// 文档链中的上游文档类型（订单 → 报价 → 请求 → 预测）
    pub fn origin_type(&self) -> Option<DocumentType> {
        match self {
            DocumentType::FlexOrder => Some(DocumentType::FlexOffer),
            DocumentType::FlexOffer => Some(DocumentType::FlexRequest),
            DocumentType::FlexRequest => Some(DocumentType::Prognosis),
            DocumentType::Prognosis | DocumentType::SettlementItem => None,
        }
    }

    /// 每个 PTU 行是否携带价格
    pub fn carries_price(&self) -> bool {
        matches!(self, DocumentType::FlexOffer | DocumentType::FlexOrder)
    }
}

// ==========================================
// 预测类型 (Prognosis Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrognosisType {
    APlan,       // BRP 侧
    DPrognosis,  // DSO 侧
}

impl fmt::Display for PrognosisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PrognosisType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "A_PLAN" => Some(PrognosisType::APlan),
            "D_PROGNOSIS" => Some(PrognosisType::DPrognosis),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PrognosisType::APlan => "A_PLAN",
            PrognosisType::DPrognosis => "D_PROGNOSIS",
        }
    }
}

// ==========================================
// 文档状态 (Document Status)
// ==========================================
// 红线: 状态只能前进，REJECTED / ARCHIVED 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    New,       // 本地新建，未发送
    Received,  // 已接收
    Sent,      // 已发送
    Accepted,  // 已接受（参与匹配的当前文档）
    Processed, // 已处理
    Final,     // 已定稿
    Disputed,  // 有争议
    Rejected,  // 已拒绝
    Archived,  // 已归档（被新文档取代）
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl DocumentStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NEW" => Some(DocumentStatus::New),
            "RECEIVED" => Some(DocumentStatus::Received),
            "SENT" => Some(DocumentStatus::Sent),
            "ACCEPTED" => Some(DocumentStatus::Accepted),
            "PROCESSED" => Some(DocumentStatus::Processed),
            "FINAL" => Some(DocumentStatus::Final),
            "DISPUTED" => Some(DocumentStatus::Disputed),
            "REJECTED" => Some(DocumentStatus::Rejected),
            "ARCHIVED" => Some(DocumentStatus::Archived),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            DocumentStatus::New => "NEW",
            DocumentStatus::Received => "RECEIVED",
            DocumentStatus::Sent => "SENT",
            DocumentStatus::Accepted => "ACCEPTED",
            DocumentStatus::Processed => "PROCESSED",
            DocumentStatus::Final => "FINAL",
            DocumentStatus::Disputed => "DISPUTED",
            DocumentStatus::Rejected => "REJECTED",
            DocumentStatus::Archived => "ARCHIVED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Rejected | DocumentStatus::Archived)
    }

    /// 状态转换是否合法（只允许前进，不允许撤销拒绝）
    pub fn can_transition_to(&self, target: DocumentStatus) -> bool {
        use DocumentStatus::*;
        if *self == target {
            return true;
        }
        match self {
            New => !matches!(target, New),
            Received | Sent => !matches!(target, New | Received | Sent),
            Accepted => matches!(target, Processed | Final | Disputed | Archived),
            Processed => matches!(target, Final | Disputed | Archived),
            Final | Disputed => matches!(target, Archived),
            Rejected | Archived => false,
        }
    }
}

// ==========================================
// PTU 阶段 (Phase Type)
// ==========================================
// 顺序: Plan < Validate < Operate < Settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseType {
    Plan,
    Validate,
    Operate,
    Settlement,
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PhaseType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAN" => Some(PhaseType::Plan),
            "VALIDATE" => Some(PhaseType::Validate),
            "OPERATE" => Some(PhaseType::Operate),
            "SETTLEMENT" => Some(PhaseType::Settlement),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PhaseType::Plan => "PLAN",
            PhaseType::Validate => "VALIDATE",
            PhaseType::Operate => "OPERATE",
            PhaseType::Settlement => "SETTLEMENT",
        }
    }

    /// 规划类阶段（只有未来 PTU 可以进入）
    pub fn is_planning(&self) -> bool {
        matches!(self, PhaseType::Plan | PhaseType::Validate)
    }
}

// ==========================================
// 灵活性请求处置 (Disposition)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispositionType {
    Requested, // 该 PTU 请求灵活性
    Available, // 该 PTU 仅提供参考
}

impl fmt::Display for DispositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl DispositionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "REQUESTED" => Some(DispositionType::Requested),
            "AVAILABLE" => Some(DispositionType::Available),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            DispositionType::Requested => "REQUESTED",
            DispositionType::Available => "AVAILABLE",
        }
    }
}

// ==========================================
// 连接组类型 (Connection Group Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionGroupType {
    CongestionPoint,     // 阻塞点 (DSO)
    BrpArea,             // BRP 区域
    AggregatorPortfolio, // 聚合商组合
}

impl fmt::Display for ConnectionGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ConnectionGroupType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CONGESTION_POINT" => Some(ConnectionGroupType::CongestionPoint),
            "BRP_AREA" => Some(ConnectionGroupType::BrpArea),
            "AGGREGATOR_PORTFOLIO" => Some(ConnectionGroupType::AggregatorPortfolio),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConnectionGroupType::CongestionPoint => "CONGESTION_POINT",
            ConnectionGroupType::BrpArea => "BRP_AREA",
            ConnectionGroupType::AggregatorPortfolio => "AGGREGATOR_PORTFOLIO",
        }
    }
}

// ==========================================
// 结算校验结论 (Settlement Verdict)
// ==========================================
// 争议不是错误，是一等业务结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementVerdict {
    Accepted,
    Disputed,
}

impl fmt::Display for SettlementVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl SettlementVerdict {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ACCEPTED" => Some(SettlementVerdict::Accepted),
            "DISPUTED" => Some(SettlementVerdict::Disputed),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            SettlementVerdict::Accepted => "ACCEPTED",
            SettlementVerdict::Disputed => "DISPUTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_is_final() {
        for target in [
            DocumentStatus::Accepted,
            DocumentStatus::Received,
            DocumentStatus::Processed,
            DocumentStatus::Archived,
        ] {
            assert!(!DocumentStatus::Rejected.can_transition_to(target));
        }
    }

    #[test]
    fn test_status_moves_forward_only() {
        assert!(DocumentStatus::Received.can_transition_to(DocumentStatus::Accepted));
        assert!(DocumentStatus::Accepted.can_transition_to(DocumentStatus::Archived));
        assert!(DocumentStatus::Accepted.can_transition_to(DocumentStatus::Disputed));
        assert!(!DocumentStatus::Accepted.can_transition_to(DocumentStatus::Received));
        assert!(!DocumentStatus::Archived.can_transition_to(DocumentStatus::Accepted));
    }

    #[test]
    fn test_phase_order_and_db_roundtrip() {
        assert!(PhaseType::Plan < PhaseType::Validate);
        assert!(PhaseType::Operate < PhaseType::Settlement);
        assert_eq!(PhaseType::from_str("operate"), Some(PhaseType::Operate));
        assert_eq!(DocumentType::from_str("FLEX_ORDER"), Some(DocumentType::FlexOrder));
        assert_eq!(DocumentType::FlexOrder.origin_type(), Some(DocumentType::FlexOffer));
        assert_eq!(DocumentType::Prognosis.origin_type(), None);
    }
}
