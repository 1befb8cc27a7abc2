// ==========================================
// 能源灵活性市场 Planboard - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 多方灵活性市场的时间索引文档账本与结算核心
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 文档链 / 结算 / 阶段 / 争议
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 消息处理边界
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ConnectionGroupType, DispositionType, DocumentStatus, DocumentType, PhaseType,
    PrognosisType, SettlementVerdict,
};

// 领域实体
pub use domain::{
    ConnectionGroupState, DocumentKey, FlexOrderSettlement, MeteredPortfolio, PlanboardDocument,
    PtuContainer, PtuDocumentRow, PtuFilter, PtuSettlement,
};

// 引擎
pub use engine::{
    DocumentChainResolver, PtuPhaseEngine, PtuTimeIndex, SettlementAllocationEngine,
    SettlementCoordinator, SettlementDisputeValidator,
};

// API
pub use api::{ApiError, ApiResult, PlanboardApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "能源灵活性市场 Planboard";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}
