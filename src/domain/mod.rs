// ==========================================
// 能源灵活性市场 Planboard - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod connection;
pub mod document;
pub mod portfolio;
pub mod ptu;
pub mod settlement;
pub mod types;

// 重导出核心类型
pub use connection::{Connection, ConnectionGroup, ConnectionGroupState};
pub use document::{DocumentKey, PlanboardDocument, PtuDocumentRow};
pub use portfolio::{
    ConnectionPortfolio, MeteredPortfolio, PowerContainer, PowerData, UdiPortfolio,
};
pub use ptu::{PtuContainer, PtuFilter};
pub use settlement::{FlexOrderSettlement, PtuSettlement};
pub use types::{
    ConnectionGroupType, DispositionType, DocumentStatus, DocumentType, PhaseType,
    PrognosisType, SettlementVerdict,
};
