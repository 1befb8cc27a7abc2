// ==========================================
// 能源灵活性市场 Planboard - 文档链解析
// ==========================================
// 职责: 订单 → 报价 → 请求 → 预测，沿 origin_sequence_number 回溯
// 规则: 每一跳按 (类型, 序号, 参与方) 查找非 REJECTED 候选，必须恰好一个
// 红线: 零个或多个候选均为数据一致性错误 (ChainBroken)，不重试
// 实现: 三次顺序的索引查询，不做大 JOIN
// ==========================================

use crate::domain::document::PlanboardDocument;
use crate::domain::types::DocumentType;
use crate::repository::document_repo::PlanboardDocumentRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use thiserror::Error;
use tracing::instrument;

// ==========================================
// 链路数据源
// ==========================================

/// 单跳查询接口
///
/// 返回指定 (类型, 序号, 参与方) 下全部非 REJECTED 文档
pub trait DocumentChainSource {
    fn find_chain_candidates(
        &self,
        document_type: DocumentType,
        sequence_number: i64,
        participant_domain: &str,
    ) -> RepositoryResult<Vec<PlanboardDocument>>;
}

impl DocumentChainSource for PlanboardDocumentRepository {
    fn find_chain_candidates(
        &self,
        document_type: DocumentType,
        sequence_number: i64,
        participant_domain: &str,
    ) -> RepositoryResult<Vec<PlanboardDocument>> {
        PlanboardDocumentRepository::find_chain_candidates(
            self,
            document_type,
            sequence_number,
            participant_domain,
        )
    }
}

// ==========================================
// 错误
// ==========================================

#[derive(Error, Debug)]
pub enum ChainResolutionError {
    #[error("文档链断裂: hop={hop}, sequence={sequence}, participant={participant}, candidates={candidates}")]
    Broken {
        hop: DocumentType,
        sequence: i64,
        participant: String,
        candidates: usize,
    },

    #[error("文档缺少上游序号: {document_type}#{sequence}@{participant}")]
    MissingOrigin {
        document_type: DocumentType,
        sequence: i64,
        participant: String,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

// ==========================================
// DocumentChainResolver
// ==========================================
pub struct DocumentChainResolver<'a, S: DocumentChainSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: DocumentChainSource + ?Sized> DocumentChainResolver<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// 解析订单对应的权威预测
    #[instrument(skip_all, fields(order_sequence = order_sequence, participant = %participant_domain))]
    pub fn resolve_prognosis_for_order(
        &self,
        order_sequence: i64,
        participant_domain: &str,
    ) -> Result<PlanboardDocument, ChainResolutionError> {
        let order = self.exactly_one(DocumentType::FlexOrder, order_sequence, participant_domain)?;
        self.resolve_prognosis_from(&order)
    }

    /// 从任意链路文档回溯到预测
    pub fn resolve_prognosis_from(
        &self,
        document: &PlanboardDocument,
    ) -> Result<PlanboardDocument, ChainResolutionError> {
        let mut current = document.clone();
        while let Some(origin_type) = current.document_type.origin_type() {
            let origin_sequence =
                current
                    .origin_sequence_number
                    .ok_or_else(|| ChainResolutionError::MissingOrigin {
                        document_type: current.document_type,
                        sequence: current.sequence_number,
                        participant: current.participant_domain.clone(),
                    })?;
            current = self.exactly_one(origin_type, origin_sequence, &current.participant_domain)?;
        }

        if current.document_type != DocumentType::Prognosis {
            return Err(ChainResolutionError::Broken {
                hop: DocumentType::Prognosis,
                sequence: current.sequence_number,
                participant: current.participant_domain,
                candidates: 0,
            });
        }
        Ok(current)
    }

    fn exactly_one(
        &self,
        document_type: DocumentType,
        sequence_number: i64,
        participant_domain: &str,
    ) -> Result<PlanboardDocument, ChainResolutionError> {
        let mut candidates =
            self.source
                .find_chain_candidates(document_type, sequence_number, participant_domain)?;
        // 非存储实现可能返回 REJECTED
        candidates.retain(|d| !d.is_rejected());

        if candidates.len() != 1 {
            tracing::debug!(
                hop = %document_type,
                sequence = sequence_number,
                participant = participant_domain,
                candidates = candidates.len(),
                "文档链单跳候选数不为 1"
            );
            return Err(ChainResolutionError::Broken {
                hop: document_type,
                sequence: sequence_number,
                participant: participant_domain.to_string(),
                candidates: candidates.len(),
            });
        }
        Ok(candidates.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DocumentStatus;
    use chrono::NaiveDate;

    struct InMemorySource(Vec<PlanboardDocument>);

    impl DocumentChainSource for InMemorySource {
        fn find_chain_candidates(
            &self,
            document_type: DocumentType,
            sequence_number: i64,
            participant_domain: &str,
        ) -> RepositoryResult<Vec<PlanboardDocument>> {
            Ok(self
                .0
                .iter()
                .filter(|d| {
                    d.document_type == document_type
                        && d.sequence_number == sequence_number
                        && d.participant_domain == participant_domain
                })
                .cloned()
                .collect())
        }
    }

    fn doc(document_type: DocumentType, seq: i64, origin: Option<i64>) -> PlanboardDocument {
        let period = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut d = PlanboardDocument::new(
            document_type,
            seq,
            "dso1",
            "cp1",
            period,
            period.and_hms_opt(0, 0, 0).unwrap(),
        );
        d.origin_sequence_number = origin;
        d
    }

    fn chain() -> Vec<PlanboardDocument> {
        vec![
            doc(DocumentType::Prognosis, 1, None),
            doc(DocumentType::FlexRequest, 2, Some(1)),
            doc(DocumentType::FlexOffer, 3, Some(2)),
            doc(DocumentType::FlexOrder, 4, Some(3)),
        ]
    }

    #[test]
    fn test_resolves_well_formed_chain() {
        let source = InMemorySource(chain());
        let resolver = DocumentChainResolver::new(&source);
        let prognosis = resolver.resolve_prognosis_for_order(4, "dso1").unwrap();
        assert_eq!(prognosis.document_type, DocumentType::Prognosis);
        assert_eq!(prognosis.sequence_number, 1);
    }

    #[test]
    fn test_rejected_candidates_are_ignored() {
        let mut docs = chain();
        docs.push(doc(DocumentType::FlexOffer, 3, Some(99)).with_status(DocumentStatus::Rejected));
        let source = InMemorySource(docs);
        let resolver = DocumentChainResolver::new(&source);
        assert_eq!(resolver.resolve_prognosis_for_order(4, "dso1").unwrap().sequence_number, 1);
    }

    #[test]
    fn test_duplicate_candidates_break_chain() {
        let mut docs = chain();
        docs.push(doc(DocumentType::FlexRequest, 2, Some(1)));
        let source = InMemorySource(docs);
        let resolver = DocumentChainResolver::new(&source);
        match resolver.resolve_prognosis_for_order(4, "dso1") {
            Err(ChainResolutionError::Broken { hop, candidates, .. }) => {
                assert_eq!(hop, DocumentType::FlexRequest);
                assert_eq!(candidates, 2);
            }
            other => panic!("unexpected result: {:?}", other.map(|d| d.sequence_number)),
        }
    }

    #[test]
    fn test_missing_link_breaks_chain() {
        let docs: Vec<_> = chain()
            .into_iter()
            .filter(|d| d.document_type != DocumentType::FlexOffer)
            .collect();
        let source = InMemorySource(docs);
        let resolver = DocumentChainResolver::new(&source);
        assert!(matches!(
            resolver.resolve_prognosis_for_order(4, "dso1"),
            Err(ChainResolutionError::Broken {
                hop: DocumentType::FlexOffer,
                candidates: 0,
                ..
            })
        ));
    }
}
