// ==========================================
// 能源灵活性市场 Planboard - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod connection_group_repo;
pub mod document_repo;
pub mod error;
pub mod ptu_container_repo;
pub mod settlement_repo;

// 重导出核心仓储
pub use connection_group_repo::ConnectionGroupRepository;
pub use document_repo::PlanboardDocumentRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use ptu_container_repo::{PhaseUpdate, PtuContainerRepository};
pub use settlement_repo::SettlementRepository;
