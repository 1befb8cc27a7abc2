// ==========================================
// 能源灵活性市场 Planboard - 引擎层
// ==========================================
// 职责: 文档链解析、结算分摊、阶段状态机、争议校验
// 红线: Engine 不拼 SQL; 分摊与校验为纯计算
// ==========================================

pub mod chain_resolver;
pub mod dispute;
pub mod phase;
pub mod portfolio;
pub mod pricing;
pub mod repositories;
pub mod settlement;
pub mod settlement_coordinator;
pub mod time_index;

// 重导出核心引擎
pub use chain_resolver::{ChainResolutionError, DocumentChainResolver, DocumentChainSource};
pub use dispute::{
    FieldDispute, SettlementDisputeValidator, SettlementField, SettlementProtocolError,
    SettlementValidationReport,
};
pub use phase::PtuPhaseEngine;
pub use portfolio::PortfolioPowerCalculator;
pub use pricing::{OrderedPricePricer, SettlementPricer};
pub use repositories::PlanboardRepositories;
pub use settlement::SettlementAllocationEngine;
pub use settlement_coordinator::{SettlementCoordinator, SettlementRunReport, SkippedSettlementGroup};
pub use time_index::PtuTimeIndex;
