// ==========================================
// 文档登记与文档链测试
// ==========================================
// 职责: 业务主键唯一、状态单调、ACCEPTED 预测取代、链路解析
// ==========================================


#[cfg(test)]
mod document_chain_test {
    use chrono::Duration;
    use flex_planboard::domain::{DocumentKey, DocumentStatus, DocumentType, PtuDocumentRow};
    use flex_planboard::ApiError;

    use crate::test_helpers::*;

    fn key(document_type: DocumentType, sequence_number: i64, participant: &str) -> DocumentKey {
        DocumentKey {
            document_type,
            sequence_number,
            participant_domain: participant.to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_business_key_is_rejected() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let doc = flat_document(DocumentType::Prognosis, 1, "brp1", "brp.area", period(), 100, 96);
        api.register_document(doc.clone()).unwrap();

        let err = api.register_document(doc).unwrap_err();
        assert!(matches!(err, ApiError::DuplicateDocument(_)));

        // 同序号不同参与方互不冲突
        let other = flat_document(DocumentType::Prognosis, 1, "brp2", "brp.area", period(), 100, 96);
        assert!(api.register_document(other).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_ptu_rows_are_rejected() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;

        let out_of_range = flat_document(DocumentType::Prognosis, 1, "dso1", "cp1", period(), 0, 0)
            .with_ptus(vec![PtuDocumentRow::power(97, 10)]);
        assert!(matches!(
            api.register_document(out_of_range),
            Err(ApiError::InvalidInput(_))
        ));

        let duplicated = flat_document(DocumentType::Prognosis, 2, "dso1", "cp1", period(), 0, 0)
            .with_ptus(vec![PtuDocumentRow::power(1, 10), PtuDocumentRow::power(1, 20)]);
        assert!(matches!(
            api.register_document(duplicated),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_accepted_prognosis_supersedes_previous() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let doc_repo = api.repositories().document_repo.clone();

        for seq in [1, 2] {
            api.register_document(
                flat_document(DocumentType::Prognosis, seq, "dso1", "cp1", period(), 100 * seq, 96)
                    .with_status(DocumentStatus::Accepted),
            )
            .unwrap();
        }

        let first = api.find_document(&key(DocumentType::Prognosis, 1, "dso1")).unwrap().unwrap();
        assert_eq!(first.status, DocumentStatus::Archived);
        let current = doc_repo
            .find_current("dso1", "cp1", period(), DocumentType::Prognosis)
            .unwrap()
            .unwrap();
        assert_eq!(current.sequence_number, 2);
        assert_eq!(current.power_at(1), 200);

        // 状态流转到 ACCEPTED 同样取代
        api.register_document(flat_document(DocumentType::Prognosis, 3, "dso1", "cp1", period(), 300, 96))
            .unwrap();
        let previous = api
            .update_document_status(&key(DocumentType::Prognosis, 3, "dso1"), DocumentStatus::Accepted)
            .unwrap();
        assert_eq!(previous, DocumentStatus::Received);
        let second = api.find_document(&key(DocumentType::Prognosis, 2, "dso1")).unwrap().unwrap();
        assert_eq!(second.status, DocumentStatus::Archived);

        let latest = doc_repo.find_latest_prognosis("dso1", "cp1", period()).unwrap().unwrap();
        assert_eq!(latest.sequence_number, 3);
    }

    #[tokio::test]
    async fn test_status_transitions_are_monotonic() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        api.register_document(flat_document(DocumentType::FlexOffer, 7, "agr1", "cp1", period(), -10, 96))
            .unwrap();
        let offer = key(DocumentType::FlexOffer, 7, "agr1");

        api.update_document_status(&offer, DocumentStatus::Rejected).unwrap();
        let err = api
            .update_document_status(&offer, DocumentStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidStateTransition { .. }));

        let missing = key(DocumentType::FlexOffer, 8, "agr1");
        assert!(matches!(
            api.update_document_status(&missing, DocumentStatus::Accepted),
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_prognosis_for_order() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let offer = register_chain(&api, "dso1", "cp1", period(), 1, 3000, 96);
        register_order(&api, "dso1", "cp1", period(), 4, offer, -1000, 96);

        // 无关链路的插入不影响结果
        let unrelated = register_chain(&api, "dso2", "cp1", period(), 1, 10, 96);
        register_order(&api, "dso2", "cp1", period(), 4, unrelated, -5, 96);

        for _ in 0..2 {
            let prognosis = api.resolve_prognosis_for_order(4, "dso1").unwrap();
            assert_eq!(prognosis.document_type, DocumentType::Prognosis);
            assert_eq!(prognosis.sequence_number, 1);
            assert_eq!(prognosis.participant_domain, "dso1");
            assert_eq!(prognosis.power_at(5), 3000);
        }

        let orders = api
            .repositories()
            .document_repo
            .find_orders_for_offer(offer, "dso1")
            .unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].sequence_number, 4);
    }

    #[tokio::test]
    async fn test_broken_chain_is_reported() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        register_chain(&api, "dso1", "cp1", period(), 1, 3000, 96);
        // 订单引用不存在的报价
        register_order(&api, "dso1", "cp1", period(), 4, 42, -1000, 96);

        match api.resolve_prognosis_for_order(4, "dso1") {
            Err(ApiError::ChainBroken {
                hop,
                sequence,
                participant,
                candidates,
            }) => {
                assert_eq!(hop, "FLEX_OFFER");
                assert_eq!(sequence, 42);
                assert_eq!(participant, "dso1");
                assert_eq!(candidates, 0);
            }
            other => panic!("unexpected: {:?}", other.map(|d| d.sequence_number)),
        }

        // 被拒绝的订单不参与匹配
        api.update_document_status(&key(DocumentType::FlexOrder, 4, "dso1"), DocumentStatus::Rejected)
            .unwrap();
        assert!(matches!(
            api.resolve_prognosis_for_order(4, "dso1"),
            Err(ApiError::ChainBroken { candidates: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_periods() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let old = period() - Duration::days(90);
        api.register_document(flat_document(DocumentType::Prognosis, 1, "dso1", "cp1", old, 1, 96))
            .unwrap();
        api.register_document(flat_document(DocumentType::Prognosis, 2, "dso1", "cp1", period(), 1, 96))
            .unwrap();
        api.initialize_phases(old, at(period(), 12, 0)).unwrap();

        let report = api.cleanup_expired_periods(period()).await.unwrap();
        assert_eq!(report.horizon, Some(period() - Duration::days(60)));
        assert_eq!(report.documents_deleted, 1);
        assert_eq!(report.containers_deleted, 96);

        assert!(api.find_document(&key(DocumentType::Prognosis, 1, "dso1")).unwrap().is_none());
        assert!(api.find_document(&key(DocumentType::Prognosis, 2, "dso1")).unwrap().is_some());
    }
}
