// ==========================================
// 能源灵活性市场 Planboard - Planboard API
// ==========================================
// 职责: 消息处理边界（文档登记、状态流转、链路解析、结算、阶段、争议）
// 红线: 协议/数据错误以 ApiError 返回，由调用方负责对参与方的拒绝
// 时钟: "当前时间" 全部由调用方传入
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use futures::future::join_all;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigResult, PlanboardConfigReader};
use crate::domain::connection::ConnectionGroupState;
use crate::domain::document::{DocumentKey, PlanboardDocument};
use crate::domain::portfolio::MeteredPortfolio;
use crate::domain::ptu::{PtuContainer, PtuFilter};
use crate::domain::settlement::FlexOrderSettlement;
use crate::domain::types::{ConnectionGroupType, DocumentStatus, DocumentType, PhaseType};
use crate::engine::{
    DocumentChainResolver, OrderedPricePricer, PlanboardRepositories, PtuPhaseEngine,
    PtuTimeIndex, SettlementAllocationEngine, SettlementCoordinator, SettlementDisputeValidator,
    SettlementPricer, SettlementRunReport, SettlementValidationReport,
};
use crate::repository::{
    ConnectionGroupRepository, PlanboardDocumentRepository, PtuContainerRepository,
    SettlementRepository,
};

// ==========================================
// CleanupReport - 过期日期清理结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub horizon: Option<NaiveDate>,
    pub documents_deleted: usize,
    pub settlements_deleted: usize,
    pub containers_deleted: usize,
}

// ==========================================
// PlanboardApi
// ==========================================
pub struct PlanboardApi {
    repos: PlanboardRepositories,
    config: Arc<dyn PlanboardConfigReader>,
    time_index: PtuTimeIndex,
    phase_engine: PtuPhaseEngine,
    coordinator: Arc<SettlementCoordinator>,
}

impl PlanboardApi {
    /// 创建 PlanboardApi（读取 PTU 长度、前瞻、重试次数配置）
    pub async fn new(
        conn: Arc<Mutex<Connection>>,
        config: Arc<dyn PlanboardConfigReader>,
    ) -> ApiResult<Self> {
        let ptu_minutes = config_value(config.get_ptu_duration_minutes().await)?;
        let lookahead = config_value(config.get_phase_lookahead_ptus().await)?;
        let max_retries = config_value(config.get_max_find_or_create_retries().await)?;

        let time_index = PtuTimeIndex::new(ptu_minutes).ok_or_else(|| {
            ApiError::InvalidInput(format!("PTU 长度 {} 分钟不能整除一天", ptu_minutes))
        })?;

        let repos = PlanboardRepositories::new(
            Arc::new(PlanboardDocumentRepository::new(conn.clone())),
            Arc::new(PtuContainerRepository::new(conn.clone())),
            Arc::new(ConnectionGroupRepository::new(conn.clone()).with_max_retries(max_retries)),
            Arc::new(SettlementRepository::new(conn)),
        );

        let phase_engine =
            PtuPhaseEngine::new(repos.ptu_container_repo.clone(), time_index, lookahead);
        let coordinator = Arc::new(SettlementCoordinator::new(
            repos.clone(),
            SettlementAllocationEngine::new(time_index),
            Arc::new(OrderedPricePricer),
        ));

        info!(ptu_minutes, lookahead, max_retries, "PlanboardApi 初始化完成");
        Ok(Self {
            repos,
            config,
            time_index,
            phase_engine,
            coordinator,
        })
    }

    /// 替换定价协作方
    pub fn with_pricer(mut self, pricer: Arc<dyn SettlementPricer>) -> Self {
        self.coordinator = Arc::new(SettlementCoordinator::new(
            self.repos.clone(),
            SettlementAllocationEngine::new(self.time_index),
            pricer,
        ));
        self
    }

    pub fn time_index(&self) -> PtuTimeIndex {
        self.time_index
    }

    pub fn repositories(&self) -> &PlanboardRepositories {
        &self.repos
    }

    // ==========================================
    // 文档登记与状态
    // ==========================================

    /// 登记入站/本地产生的文档
    ///
    /// # 返回
    /// - `Ok(id)`: 文档数据库ID
    /// - `Err(InvalidInput)`: PTU 明细越界/重复，或参与方为空
    /// - `Err(PeriodNotMutable)`: 日期已整体进入结算阶段（结算项除外）
    /// - `Err(DuplicateDocument)`: 业务主键 (类型, 序号, 参与方) 重复
    #[instrument(skip(self, document), fields(key = %document.key(), period = %document.period))]
    pub fn register_document(&self, document: PlanboardDocument) -> ApiResult<i64> {
        if document.participant_domain.trim().is_empty() {
            return Err(ApiError::InvalidInput("participant_domain 不能为空".to_string()));
        }
        if document.connection_group_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("connection_group_id 不能为空".to_string()));
        }
        document
            .validate_ptus(self.time_index.ptus_per_day(document.period))
            .map_err(ApiError::InvalidInput)?;

        if document.document_type != DocumentType::SettlementItem {
            self.ensure_period_mutable(document.period)?;
        }

        let key = document.key();
        if self.repos.document_repo.find_by_key(&key)?.is_some() {
            return Err(ApiError::DuplicateDocument(key.to_string()));
        }

        let id = if document.document_type == DocumentType::Prognosis
            && document.status == DocumentStatus::Accepted
        {
            let (id, archived) = self.repos.document_repo.insert_superseding(&document)?;
            if archived > 0 {
                info!(archived, "原 ACCEPTED 预测已归档");
            }
            id
        } else {
            self.repos.document_repo.insert(&document)?
        };

        info!(id, status = %document.status, ptus = document.ptus.len(), "文档登记完成");
        Ok(id)
    }

    /// 更新文档状态（单调前进；REJECTED / ARCHIVED 不可再变）
    ///
    /// # 返回
    /// - `Ok(previous_status)`
    #[instrument(skip(self), fields(key = %key, status = %status))]
    pub fn update_document_status(
        &self,
        key: &DocumentKey,
        status: DocumentStatus,
    ) -> ApiResult<DocumentStatus> {
        let previous = if key.document_type == DocumentType::Prognosis {
            let (previous, archived) = self
                .repos
                .document_repo
                .update_status_superseding(key, status)?;
            if archived > 0 {
                info!(archived, "原 ACCEPTED 预测已归档");
            }
            previous
        } else {
            self.repos.document_repo.update_status(key, status)?
        };
        info!(previous = %previous, "文档状态已更新");
        Ok(previous)
    }

    pub fn find_document(&self, key: &DocumentKey) -> ApiResult<Option<PlanboardDocument>> {
        Ok(self.repos.document_repo.find_by_key(key)?)
    }

    /// 解析订单对应的权威预测
    ///
    /// # 返回
    /// - `Err(ChainBroken)`: 任一跳候选数不为 1
    pub fn resolve_prognosis_for_order(
        &self,
        order_sequence: i64,
        participant_domain: &str,
    ) -> ApiResult<PlanboardDocument> {
        let resolver = DocumentChainResolver::new(self.repos.document_repo.as_ref());
        Ok(resolver.resolve_prognosis_for_order(order_sequence, participant_domain)?)
    }

    // ==========================================
    // 连接组归属
    // ==========================================

    /// 登记连接在区间 [valid_from, valid_until) 内属于连接组
    ///
    /// 连接与连接组首次出现时 find-or-create
    pub fn register_membership(
        &self,
        entity_address: &str,
        connection_group_id: &str,
        group_type: ConnectionGroupType,
        valid_from: NaiveDate,
        valid_until: NaiveDate,
    ) -> ApiResult<()> {
        let repo = &self.repos.connection_group_repo;
        repo.find_or_create_connection(entity_address)?;
        repo.find_or_create_group(connection_group_id, group_type)?;
        repo.add_state(&ConnectionGroupState::new(
            entity_address,
            connection_group_id,
            valid_from,
            valid_until,
        ))?;
        Ok(())
    }

    // ==========================================
    // PTU 阶段
    // ==========================================

    /// 批量推进阶段
    pub fn advance_phase(
        &self,
        target: PhaseType,
        period: NaiveDate,
        filter: PtuFilter,
        now: NaiveDateTime,
    ) -> ApiResult<usize> {
        Ok(self.phase_engine.advance_phase(target, period, filter, now)?)
    }

    /// 启动时初始化某日期的阶段（幂等）
    pub fn initialize_phases(&self, period: NaiveDate, now: NaiveDateTime) -> ApiResult<usize> {
        Ok(self.phase_engine.initialize_phases(period, now)?)
    }

    pub fn ptu_containers(&self, period: NaiveDate) -> ApiResult<Vec<PtuContainer>> {
        Ok(self.repos.ptu_container_repo.find_by_period(period)?)
    }

    // ==========================================
    // 结算
    // ==========================================

    /// 计算某日期的结算（不落库）
    pub fn prepare_settlement(
        &self,
        period: NaiveDate,
        portfolio: &MeteredPortfolio,
    ) -> ApiResult<SettlementRunReport> {
        Ok(self.coordinator.prepare_period(period, portfolio)?)
    }

    /// 计算并覆盖写入某日期的结算
    pub fn settle_period(
        &self,
        period: NaiveDate,
        portfolio: &MeteredPortfolio,
    ) -> ApiResult<SettlementRunReport> {
        Ok(self.coordinator.settle_period(period, portfolio)?)
    }

    /// 并发结算多个日期
    ///
    /// 每个日期在独立的阻塞任务中执行；返回顺序与输入一致
    pub async fn settle_periods(
        &self,
        inputs: Vec<(NaiveDate, MeteredPortfolio)>,
    ) -> ApiResult<Vec<SettlementRunReport>> {
        let tasks = inputs.into_iter().map(|(period, portfolio)| {
            let coordinator = self.coordinator.clone();
            tokio::task::spawn_blocking(move || coordinator.settle_period(period, &portfolio))
        });

        let mut reports = Vec::new();
        for joined in join_all(tasks).await {
            let report = joined
                .map_err(|e| ApiError::InternalError(format!("结算任务异常退出: {}", e)))??;
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn find_settlement(
        &self,
        order_sequence: i64,
        participant_domain: &str,
    ) -> ApiResult<Option<FlexOrderSettlement>> {
        Ok(self
            .repos
            .settlement_repo
            .find_by_order(order_sequence, participant_domain)?)
    }

    /// 处理对方提交的结算: 与本地结算比较并记录结论
    ///
    /// # 参数
    /// - `tolerance`: 相对容差；None 时读取配置
    ///
    /// # 返回
    /// - `Ok(report)`: ACCEPTED / DISPUTED 及全部争议字段
    /// - `Err(PtuCountMismatch)`: 对方消息格式错误
    #[instrument(skip(self, received), fields(
        order_sequence = received.order_sequence,
        participant = %received.participant_domain
    ))]
    pub async fn handle_received_settlement(
        &self,
        received: &FlexOrderSettlement,
        tolerance: Option<Decimal>,
    ) -> ApiResult<SettlementValidationReport> {
        let tolerance = match tolerance {
            Some(t) => t,
            None => config_value(self.config.get_settlement_tolerance().await)?,
        };

        let prepared = self
            .repos
            .settlement_repo
            .find_by_order(received.order_sequence, &received.participant_domain)?;

        let report = SettlementDisputeValidator::new(tolerance).validate(received, prepared.as_ref())?;

        if prepared.is_some() {
            self.repos.settlement_repo.mark_verdict(
                received.order_sequence,
                &received.participant_domain,
                report.verdict,
            )?;
        } else {
            warn!("本地无对应结算，结论不落库");
        }
        Ok(report)
    }

    // ==========================================
    // 清理
    // ==========================================

    /// 删除超过结算保留期的日期数据
    pub async fn cleanup_expired_periods(&self, today: NaiveDate) -> ApiResult<CleanupReport> {
        let horizon_days = config_value(self.config.get_settlement_horizon_days().await)?;
        let horizon = today - Duration::days(horizon_days.max(0));

        let report = CleanupReport {
            horizon: Some(horizon),
            settlements_deleted: self.repos.settlement_repo.delete_periods_before(horizon)?,
            documents_deleted: self.repos.document_repo.delete_periods_before(horizon)?,
            containers_deleted: self.repos.ptu_container_repo.delete_periods_before(horizon)?,
        };
        info!(
            horizon = %horizon,
            documents = report.documents_deleted,
            settlements = report.settlements_deleted,
            containers = report.containers_deleted,
            "过期日期清理完成"
        );
        Ok(report)
    }

    // ==========================================
    // 内部
    // ==========================================

    fn ensure_period_mutable(&self, period: NaiveDate) -> ApiResult<()> {
        let containers = self.repos.ptu_container_repo.find_by_period(period)?;
        if !containers.is_empty() && containers.iter().all(|c| !c.is_mutable()) {
            return Err(ApiError::PeriodNotMutable(period.to_string()));
        }
        Ok(())
    }
}

fn config_value<T>(result: ConfigResult<T>) -> ApiResult<T> {
    result.map_err(|e| ApiError::InternalError(format!("配置读取失败: {}", e)))
}
