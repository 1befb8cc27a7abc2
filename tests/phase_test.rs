// ==========================================
// PTU 阶段状态机测试
// ==========================================
// 时钟: 2030-01-15 10:20，15 分钟 PTU → 当前 PTU = 42
// ==========================================


#[cfg(test)]
mod phase_test {
    use chrono::Duration;
    use flex_planboard::domain::{DocumentType, PhaseType, PtuFilter};
    use flex_planboard::ApiError;

    use crate::test_helpers::*;

    fn phase_of(api: &flex_planboard::PlanboardApi, period: chrono::NaiveDate, ptu_index: i32) -> PhaseType {
        api.repositories()
            .ptu_container_repo
            .find_phase(period, ptu_index)
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_today_is_idempotent() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let now = at(period(), 10, 20);
        assert_eq!(api.time_index().ptu_index_for(now).1, 42);

        assert_eq!(api.initialize_phases(period(), now).unwrap(), 42);
        assert_eq!(api.initialize_phases(period(), now).unwrap(), 0);

        assert_eq!(phase_of(&api, period(), 1), PhaseType::Settlement);
        assert_eq!(phase_of(&api, period(), 41), PhaseType::Settlement);
        assert_eq!(phase_of(&api, period(), 42), PhaseType::Operate);
        assert_eq!(phase_of(&api, period(), 43), PhaseType::Plan);
        assert_eq!(api.ptu_containers(period()).unwrap().len(), 96);
    }

    #[tokio::test]
    async fn test_initialize_past_and_future_periods() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let now = at(period(), 10, 20);
        let yesterday = period() - Duration::days(1);
        let tomorrow = period() + Duration::days(1);

        assert_eq!(api.initialize_phases(yesterday, now).unwrap(), 96);
        assert_eq!(api.initialize_phases(yesterday, now).unwrap(), 0);
        assert!(api
            .ptu_containers(yesterday)
            .unwrap()
            .iter()
            .all(|c| c.phase == PhaseType::Settlement));

        assert_eq!(api.initialize_phases(tomorrow, now).unwrap(), 0);
        let containers = api.ptu_containers(tomorrow).unwrap();
        assert_eq!(containers.len(), 96);
        assert!(containers.iter().all(|c| c.phase == PhaseType::Plan));
    }

    #[tokio::test]
    async fn test_advance_phase_respects_lookahead_and_order() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let now = at(period(), 10, 20);
        api.initialize_phases(period(), now).unwrap();

        // 当前 42 + 前瞻 1 → 只有 44..=96 可进入 Validate
        let validated = api
            .advance_phase(PhaseType::Validate, period(), PtuFilter::all(), now)
            .unwrap();
        assert_eq!(validated, 53);
        assert_eq!(phase_of(&api, period(), 43), PhaseType::Plan);
        assert_eq!(phase_of(&api, period(), 44), PhaseType::Validate);

        let operate = api
            .advance_phase(PhaseType::Operate, period(), PtuFilter::single(43), now)
            .unwrap();
        assert_eq!(operate, 1);
        let again = api
            .advance_phase(PhaseType::Operate, period(), PtuFilter::single(43), now)
            .unwrap();
        assert_eq!(again, 0);

        // 不能回退
        let back = api
            .advance_phase(PhaseType::Plan, period(), PtuFilter::single(42), now)
            .unwrap();
        assert_eq!(back, 0);
        assert_eq!(phase_of(&api, period(), 42), PhaseType::Operate);
    }

    #[tokio::test]
    async fn test_planning_phase_rejected_for_past_period() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let yesterday = period() - Duration::days(1);
        // 容器停留在 Plan，但日期已过
        api.initialize_phases(yesterday, at(yesterday, 0, 0)).unwrap();
        assert_eq!(phase_of(&api, yesterday, 96), PhaseType::Plan);

        let updated = api
            .advance_phase(PhaseType::Validate, yesterday, PtuFilter::all(), at(period(), 8, 0))
            .unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn test_settled_period_rejects_new_documents() {
        let (_temp, _path, api) = setup_api(MockPlanboardConfig::default()).await;
        let yesterday = period() - Duration::days(1);
        api.initialize_phases(yesterday, at(period(), 10, 20)).unwrap();

        let prognosis = flat_document(DocumentType::Prognosis, 1, "dso1", "cp1", yesterday, 10, 96);
        assert!(matches!(
            api.register_document(prognosis),
            Err(ApiError::PeriodNotMutable(_))
        ));

        let item = flat_document(DocumentType::SettlementItem, 2, "dso1", "cp1", yesterday, 10, 96);
        assert!(api.register_document(item).is_ok());
    }
}
