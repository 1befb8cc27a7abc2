// ==========================================
// 能源灵活性市场 Planboard - 文档领域模型
// ==========================================
// 职责: Planboard 文档（预测/请求/报价/订单/结算项）及其 PTU 明细
// 红线: REJECTED 文档不参与任何匹配查询
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::types::{DispositionType, DocumentStatus, DocumentType, PrognosisType};

// ==========================================
// PtuDocumentRow - 文档的单个 PTU 明细
// ==========================================
// 功率符号约定: 用电为正，发电为负
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtuDocumentRow {
    pub ptu_index: i32,                        // PTU 序号 (从 1 开始)
    pub power: i64,                            // 功率 (W)
    pub price: Option<Decimal>,                // 价格 (仅报价/订单)
    pub disposition: Option<DispositionType>,  // 处置 (仅请求)
}

impl PtuDocumentRow {
    pub fn power(ptu_index: i32, power: i64) -> Self {
        Self {
            ptu_index,
            power,
            price: None,
            disposition: None,
        }
    }

    pub fn priced(ptu_index: i32, power: i64, price: Decimal) -> Self {
        Self {
            ptu_index,
            power,
            price: Some(price),
            disposition: None,
        }
    }

    pub fn requested(ptu_index: i32, power: i64, disposition: DispositionType) -> Self {
        Self {
            ptu_index,
            power,
            price: None,
            disposition: Some(disposition),
        }
    }
}

// ==========================================
// DocumentKey - 业务主键 (type, sequence, participant)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub document_type: DocumentType,
    pub sequence_number: i64,
    pub participant_domain: String,
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}@{}",
            self.document_type, self.sequence_number, self.participant_domain
        )
    }
}

// ==========================================
// PlanboardDocument - Planboard 文档
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanboardDocument {
    // ===== 存储标识 =====
    pub id: Option<i64>, // 数据库自增ID，未落库时为 None

    // ===== 业务主键 =====
    pub document_type: DocumentType,
    pub sequence_number: i64,
    pub participant_domain: String,

    // ===== 文档链 =====
    pub origin_sequence_number: Option<i64>, // 上游文档序号

    // ===== 范围 =====
    pub connection_group_id: String,
    pub period: NaiveDate,
    pub prognosis_type: Option<PrognosisType>, // 仅预测

    // ===== 生命周期 =====
    pub status: DocumentStatus,
    pub creation_time: NaiveDateTime,
    pub expiration_time: Option<NaiveDateTime>,

    // ===== PTU 明细 =====
    pub ptus: Vec<PtuDocumentRow>,
}

impl PlanboardDocument {
    /// 创建新文档（状态 RECEIVED，无 PTU 明细）
    pub fn new(
        document_type: DocumentType,
        sequence_number: i64,
        participant_domain: impl Into<String>,
        connection_group_id: impl Into<String>,
        period: NaiveDate,
        creation_time: NaiveDateTime,
    ) -> Self {
        Self {
            id: None,
            document_type,
            sequence_number,
            participant_domain: participant_domain.into(),
            origin_sequence_number: None,
            connection_group_id: connection_group_id.into(),
            period,
            prognosis_type: None,
            status: DocumentStatus::Received,
            creation_time,
            expiration_time: None,
            ptus: Vec::new(),
        }
    }

    pub fn with_origin(mut self, origin_sequence_number: i64) -> Self {
        self.origin_sequence_number = Some(origin_sequence_number);
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_prognosis_type(mut self, prognosis_type: PrognosisType) -> Self {
        self.prognosis_type = Some(prognosis_type);
        self
    }

    pub fn with_expiration(mut self, expiration_time: NaiveDateTime) -> Self {
        self.expiration_time = Some(expiration_time);
        self
    }

    pub fn with_ptus(mut self, ptus: Vec<PtuDocumentRow>) -> Self {
        self.ptus = ptus;
        self
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            document_type: self.document_type,
            sequence_number: self.sequence_number,
            participant_domain: self.participant_domain.clone(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.status == DocumentStatus::Rejected
    }

    /// 指定 PTU 的功率（缺失 PTU 视为 0）
    pub fn power_at(&self, ptu_index: i32) -> i64 {
        self.ptus
            .iter()
            .find(|p| p.ptu_index == ptu_index)
            .map(|p| p.power)
            .unwrap_or(0)
    }

    /// 指定 PTU 的价格
    pub fn price_at(&self, ptu_index: i32) -> Option<Decimal> {
        self.ptus
            .iter()
            .find(|p| p.ptu_index == ptu_index)
            .and_then(|p| p.price)
    }

    /// 校验 PTU 明细: 序号在 [1, ptu_count] 内且不重复
    ///
    /// # 返回
    /// - Ok(()): 校验通过
    /// - Err(String): 违规原因
    pub fn validate_ptus(&self, ptu_count: i32) -> Result<(), String> {
        let mut seen = HashSet::new();
        for row in &self.ptus {
            if row.ptu_index < 1 || row.ptu_index > ptu_count {
                return Err(format!(
                    "{} 的 PTU 序号越界: ptu_index={}, ptu_count={}",
                    self.key(),
                    row.ptu_index,
                    ptu_count
                ));
            }
            if !seen.insert(row.ptu_index) {
                return Err(format!(
                    "{} 的 PTU 序号重复: ptu_index={}",
                    self.key(),
                    row.ptu_index
                ));
            }
        }
        Ok(())
    }
}
