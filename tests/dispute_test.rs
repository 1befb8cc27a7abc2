// ==========================================
// 结算争议处理测试
// ==========================================
// 本地先结算一个订单，再模拟对方提交的结算
// ==========================================


#[cfg(test)]
mod dispute_test {
    use flex_planboard::domain::{ConnectionGroupType, FlexOrderSettlement, SettlementVerdict};
    use flex_planboard::engine::SettlementField;
    use flex_planboard::{ApiError, PlanboardApi};
    use rust_decimal::Decimal;

    use crate::test_helpers::*;

    const PTUS: i32 = 12;

    async fn settled_api() -> (tempfile::NamedTempFile, PlanboardApi, FlexOrderSettlement) {
        let (temp, _path, api) = setup_api(MockPlanboardConfig::two_hour_ptus()).await;
        let day = period();
        api.register_membership(
            "ean.c1",
            "ean.cp1",
            ConnectionGroupType::CongestionPoint,
            day,
            day.succ_opt().unwrap(),
        )
        .unwrap();
        let offer = register_chain(&api, "dso1", "ean.cp1", day, 1, 3000, PTUS);
        register_order(&api, "dso1", "ean.cp1", day, 4, offer, -1000, PTUS);
        api.settle_period(day, &portfolio(vec![flat_connection("ean.c1", 2100, PTUS)]))
            .unwrap();

        let prepared = api.find_settlement(4, "dso1").unwrap().unwrap();
        (temp, api, prepared)
    }

    #[tokio::test]
    async fn test_identical_settlement_is_accepted() {
        let (_temp, api, prepared) = settled_api().await;
        assert_eq!(prepared.verdict, None);

        let report = api.handle_received_settlement(&prepared, None).await.unwrap();
        assert!(report.is_accepted());
        assert!(report.prepared_locally);
        assert!(report.disputes.is_empty());

        let stored = api.find_settlement(4, "dso1").unwrap().unwrap();
        assert_eq!(stored.verdict, Some(SettlementVerdict::Accepted));
    }

    #[tokio::test]
    async fn test_small_deviation_within_tolerance() {
        let (_temp, api, prepared) = settled_api().await;
        let mut received = prepared.clone();
        // 2100 → 2300，偏差约 9.5%，低于 20%
        for ptu in &mut received.ptus {
            ptu.actual_power = 2300;
        }

        let report = api.handle_received_settlement(&received, None).await.unwrap();
        assert!(report.is_accepted());

        // 显式更严格的容差
        let strict = api
            .handle_received_settlement(&received, Some(Decimal::new(5, 2)))
            .await
            .unwrap();
        assert_eq!(strict.verdict, SettlementVerdict::Disputed);
        assert_eq!(strict.disputes.len(), PTUS as usize);
    }

    #[tokio::test]
    async fn test_doubled_prognosis_is_disputed() {
        let (_temp, api, prepared) = settled_api().await;
        let mut received = prepared.clone();
        received.ptus[3].prognosis_power *= 2;

        let report = api.handle_received_settlement(&received, None).await.unwrap();
        assert_eq!(report.verdict, SettlementVerdict::Disputed);
        assert_eq!(report.disputes.len(), 1);
        assert_eq!(report.disputes[0].ptu_index, received.ptus[3].ptu_index);
        assert_eq!(report.disputes[0].field, SettlementField::PrognosisPower);
        assert_eq!(report.disputes[0].prepared, Decimal::from(3000));

        let stored = api.find_settlement(4, "dso1").unwrap().unwrap();
        assert_eq!(stored.verdict, Some(SettlementVerdict::Disputed));
    }

    #[tokio::test]
    async fn test_ptu_count_mismatch_is_protocol_error() {
        let (_temp, api, prepared) = settled_api().await;
        let mut received = prepared.clone();
        received.ptus.pop();

        let err = api.handle_received_settlement(&received, None).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::PtuCountMismatch {
                received: 11,
                prepared: 12,
                ..
            }
        ));

        // 协议错误不改变结论
        let stored = api.find_settlement(4, "dso1").unwrap().unwrap();
        assert_eq!(stored.verdict, None);
    }

    #[tokio::test]
    async fn test_repeated_ptu_index_is_rejected() {
        let (_temp, api, prepared) = settled_api().await;
        let mut received = prepared.clone();
        // 个数不变: PTU 1 出现两次，PTU 2 缺失
        received.ptus[1] = received.ptus[0].clone();

        let err = api.handle_received_settlement(&received, None).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let stored = api.find_settlement(4, "dso1").unwrap().unwrap();
        assert_eq!(stored.verdict, None);
    }

    #[tokio::test]
    async fn test_unknown_order_is_disputed() {
        let (_temp, api, prepared) = settled_api().await;
        let mut received = prepared.clone();
        received.order_sequence = 404;

        let report = api.handle_received_settlement(&received, None).await.unwrap();
        assert_eq!(report.verdict, SettlementVerdict::Disputed);
        assert!(!report.prepared_locally);
        assert!(report.disputes.is_empty());
    }
}
