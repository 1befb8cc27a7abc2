// ==========================================
// 能源灵活性市场 Planboard - PTU 阶段状态机
// ==========================================
// 状态: Plan → Validate → Operate → Settlement
// 规则:
//   - 进入 Operate / Settlement: 只从更早的阶段前进
//   - 进入 Plan / Validate: 只在规划类阶段之间切换，且当天只允许
//     ptu_index > 当前PTU + lookahead 的未来时段
//   - 过去日期不允许重新进入规划类阶段
// 初始化: 过去日期整体进入 Settlement；当天早于当前 PTU 的进入
//         Settlement，当前 PTU 进入 Operate；只更新阶段不同的容器（幂等）
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use crate::domain::ptu::PtuFilter;
use crate::domain::types::PhaseType;
use crate::engine::time_index::PtuTimeIndex;
use crate::repository::error::RepositoryResult;
use crate::repository::ptu_container_repo::{PhaseUpdate, PtuContainerRepository};

const ALL_PHASES: [PhaseType; 4] = [
    PhaseType::Plan,
    PhaseType::Validate,
    PhaseType::Operate,
    PhaseType::Settlement,
];

pub struct PtuPhaseEngine {
    repo: Arc<PtuContainerRepository>,
    time_index: PtuTimeIndex,
    lookahead_ptus: i32,
}

impl PtuPhaseEngine {
    pub fn new(repo: Arc<PtuContainerRepository>, time_index: PtuTimeIndex, lookahead_ptus: i32) -> Self {
        Self {
            repo,
            time_index,
            lookahead_ptus: lookahead_ptus.max(0),
        }
    }

    /// 推进阶段
    ///
    /// # 返回
    /// - `Ok(count)`: 实际更新的容器数
    #[instrument(skip(self, filter, now), fields(target = %target, period = %period, ptu_index = ?filter.ptu_index))]
    pub fn advance_phase(
        &self,
        target: PhaseType,
        period: NaiveDate,
        filter: PtuFilter,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let today = now.date();
        let mut update = PhaseUpdate::new(period, target, source_phases(target));
        update.ptu_index = filter.ptu_index;

        if target.is_planning() {
            if period < today {
                warn!("过去日期不能重新进入规划阶段");
                return Ok(0);
            }
            if period == today {
                let (_, current) = self.time_index.ptu_index_for(now);
                update.after_ptu_index = Some(current + self.lookahead_ptus);
            }
        }

        let updated = self.repo.update_phase(&update)?;
        debug!(updated, "阶段推进完成");
        Ok(updated)
    }

    /// 启动时初始化某日期的阶段（幂等）
    ///
    /// 缺失的容器先以 Plan 补齐；返回值只计阶段变更
    #[instrument(skip(self, now), fields(period = %period))]
    pub fn initialize_phases(&self, period: NaiveDate, now: NaiveDateTime) -> RepositoryResult<usize> {
        let today = now.date();
        self.repo
            .initialize_period(period, self.time_index.ptus_per_day(period))?;

        if period > today {
            return Ok(0);
        }

        let to_settlement = source_phases(PhaseType::Settlement);
        if period < today {
            let update = PhaseUpdate::new(period, PhaseType::Settlement, to_settlement);
            let updated = self.repo.update_phase(&update)?;
            info!(updated, "过去日期进入结算阶段");
            return Ok(updated);
        }

        let (_, current) = self.time_index.ptu_index_for(now);

        let mut settle = PhaseUpdate::new(period, PhaseType::Settlement, to_settlement);
        settle.before_ptu_index = Some(current);
        let settled = self.repo.update_phase(&settle)?;

        let mut operate = PhaseUpdate::new(period, PhaseType::Operate, source_phases(PhaseType::Operate));
        operate.ptu_index = Some(current);
        let operating = self.repo.update_phase(&operate)?;

        info!(current_ptu = current, settled, operating, "当天阶段初始化完成");
        Ok(settled + operating)
    }
}

/// 可转入目标阶段的当前阶段
fn source_phases(target: PhaseType) -> Vec<PhaseType> {
    if target.is_planning() {
        ALL_PHASES
            .iter()
            .copied()
            .filter(|p| p.is_planning() && *p != target)
            .collect()
    } else {
        ALL_PHASES.iter().copied().filter(|p| *p < target).collect()
    }
}
