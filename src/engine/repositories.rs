// ==========================================
// 能源灵活性市场 Planboard - 引擎层仓储聚合
// ==========================================
// 职责: 聚合结算/阶段引擎所需的所有 Repository
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    ConnectionGroupRepository, PlanboardDocumentRepository, PtuContainerRepository,
    SettlementRepository,
};

/// Planboard 仓储集合
///
/// # 包含的仓储
/// - `document_repo`: 文档与 PTU 明细
/// - `ptu_container_repo`: PTU 容器阶段
/// - `connection_group_repo`: 连接组与归属区间
/// - `settlement_repo`: 订单结算
#[derive(Clone)]
pub struct PlanboardRepositories {
    pub document_repo: Arc<PlanboardDocumentRepository>,
    pub ptu_container_repo: Arc<PtuContainerRepository>,
    pub connection_group_repo: Arc<ConnectionGroupRepository>,
    pub settlement_repo: Arc<SettlementRepository>,
}

impl PlanboardRepositories {
    pub fn new(
        document_repo: Arc<PlanboardDocumentRepository>,
        ptu_container_repo: Arc<PtuContainerRepository>,
        connection_group_repo: Arc<ConnectionGroupRepository>,
        settlement_repo: Arc<SettlementRepository>,
    ) -> Self {
        Self {
            document_repo,
            ptu_container_repo,
            connection_group_repo,
            settlement_repo,
        }
    }

    /// 全部仓储共享同一个连接
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            document_repo: Arc::new(PlanboardDocumentRepository::new(conn.clone())),
            ptu_container_repo: Arc::new(PtuContainerRepository::new(conn.clone())),
            connection_group_repo: Arc::new(ConnectionGroupRepository::new(conn.clone())),
            settlement_repo: Arc::new(SettlementRepository::new(conn)),
        }
    }
}
