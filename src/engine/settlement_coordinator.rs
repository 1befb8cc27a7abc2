// ==========================================
// 能源灵活性市场 Planboard - 结算编排
// ==========================================
// 流程（单个日期）:
//   1) 读取该日期全部 ACCEPTED 订单，按 (连接组, 参与方) 分组
//   2) 每组: 逐单解析文档链，取序号最大的预测作为权威预测
//   3) 按连接组归属过滤计量组合
//   4) 分摊 + 定价
//   5) 覆盖写入（可选，见 settle_period）
// 容错: 链路断裂/缺预测的组跳过并记录，不影响其他组
// ==========================================

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::document::PlanboardDocument;
use crate::domain::portfolio::MeteredPortfolio;
use crate::domain::settlement::FlexOrderSettlement;
use crate::domain::types::DocumentType;
use crate::engine::chain_resolver::{ChainResolutionError, DocumentChainResolver};
use crate::engine::pricing::SettlementPricer;
use crate::engine::repositories::PlanboardRepositories;
use crate::engine::settlement::SettlementAllocationEngine;
use crate::repository::error::RepositoryResult;
use crate::repository::PlanboardDocumentRepository;

// ==========================================
// 运行报告
// ==========================================

/// 被跳过的结算组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSettlementGroup {
    pub connection_group_id: String,
    pub participant_domain: String,
    pub order_sequences: Vec<i64>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRunReport {
    pub period: NaiveDate,
    pub settlements: Vec<FlexOrderSettlement>,
    pub skipped_groups: Vec<SkippedSettlementGroup>,
}

impl SettlementRunReport {
    pub fn new(period: NaiveDate) -> Self {
        Self {
            period,
            settlements: Vec::new(),
            skipped_groups: Vec::new(),
        }
    }

    pub fn settlement_for(&self, order_sequence: i64, participant_domain: &str) -> Option<&FlexOrderSettlement> {
        self.settlements
            .iter()
            .find(|s| s.order_sequence == order_sequence && s.participant_domain == participant_domain)
    }
}

// ==========================================
// SettlementCoordinator
// ==========================================
pub struct SettlementCoordinator {
    repos: PlanboardRepositories,
    engine: SettlementAllocationEngine,
    pricer: Arc<dyn SettlementPricer>,
}

impl SettlementCoordinator {
    pub fn new(
        repos: PlanboardRepositories,
        engine: SettlementAllocationEngine,
        pricer: Arc<dyn SettlementPricer>,
    ) -> Self {
        Self {
            repos,
            engine,
            pricer,
        }
    }

    /// 计算某日期的结算（不落库）
    #[instrument(skip(self, portfolio), fields(period = %period))]
    pub fn prepare_period(
        &self,
        period: NaiveDate,
        portfolio: &MeteredPortfolio,
    ) -> RepositoryResult<SettlementRunReport> {
        let orders = self.repos.document_repo.find_accepted_flex_orders(period)?;

        let mut groups: BTreeMap<(String, String), Vec<PlanboardDocument>> = BTreeMap::new();
        for order in orders {
            groups
                .entry((order.connection_group_id.clone(), order.participant_domain.clone()))
                .or_default()
                .push(order);
        }

        let mut report = SettlementRunReport::new(period);
        let resolver = DocumentChainResolver::new(self.repos.document_repo.as_ref());

        for ((connection_group_id, participant_domain), group_orders) in groups {
            let prognosis = match self.resolve_group_prognosis(&resolver, &group_orders) {
                Ok(prognosis) => prognosis,
                Err(ChainResolutionError::Repository(e)) => return Err(e),
                Err(e) => {
                    let order_sequences: Vec<i64> =
                        group_orders.iter().map(|o| o.sequence_number).collect();
                    warn!(
                        connection_group = %connection_group_id,
                        participant = %participant_domain,
                        period = %period,
                        order_sequences = ?order_sequences,
                        error = %e,
                        "无法解析权威预测，跳过该结算组"
                    );
                    report.skipped_groups.push(SkippedSettlementGroup {
                        connection_group_id,
                        participant_domain,
                        order_sequences,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let members = self
                .repos
                .connection_group_repo
                .find_connections_of_group(&connection_group_id, period)?;
            if members.is_empty() {
                warn!(
                    connection_group = %connection_group_id,
                    period = %period,
                    "连接组在该日期无有效归属连接，实际功率按 0 计"
                );
            }
            let group_portfolio = portfolio.restricted_to(&members);

            let mut settlements = self.engine.compute_settlement(
                period,
                &connection_group_id,
                &participant_domain,
                &group_orders,
                &prognosis,
                &group_portfolio,
            );

            for settlement in settlements.iter_mut() {
                if let Some(order) = group_orders
                    .iter()
                    .find(|o| o.sequence_number == settlement.order_sequence)
                {
                    self.pricer.price(order, settlement);
                }
            }
            report.settlements.extend(settlements);
        }

        info!(
            period = %period,
            settlements = report.settlements.len(),
            skipped_groups = report.skipped_groups.len(),
            "结算计算完成"
        );
        Ok(report)
    }

    /// 计算并覆盖写入某日期的结算
    pub fn settle_period(
        &self,
        period: NaiveDate,
        portfolio: &MeteredPortfolio,
    ) -> RepositoryResult<SettlementRunReport> {
        let report = self.prepare_period(period, portfolio)?;
        self.repos
            .settlement_repo
            .replace_for_period(period, &report.settlements)?;
        Ok(report)
    }

    /// 组内逐单解析，序号最大的预测胜出
    fn resolve_group_prognosis(
        &self,
        resolver: &DocumentChainResolver<'_, PlanboardDocumentRepository>,
        orders: &[PlanboardDocument],
    ) -> Result<PlanboardDocument, ChainResolutionError> {
        let mut best: Option<PlanboardDocument> = None;
        for order in orders {
            let prognosis = resolver.resolve_prognosis_from(order)?;
            let replace = best
                .as_ref()
                .map_or(true, |b| prognosis.sequence_number > b.sequence_number);
            if replace {
                best = Some(prognosis);
            }
        }
        best.ok_or_else(|| ChainResolutionError::Broken {
            hop: DocumentType::Prognosis,
            sequence: 0,
            participant: String::new(),
            candidates: 0,
        })
    }
}
