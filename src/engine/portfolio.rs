// ==========================================
// 能源灵活性市场 Planboard - 组合实际功率计算
// ==========================================
// 职责: 由计量组合得到每个 PTU 的实际功率
// 规则:
//   actual = Σ 连接级不可控负荷(最精确数据)
//          + Σ 每个设备在该 PTU 内各 DTU 的 (用电 - 发电) 平均值
// 取整: 设备平均值向零截断
// 范围: i64 瓦特，求和超出范围时饱和
// ==========================================

use crate::domain::portfolio::{MeteredPortfolio, UdiPortfolio};

pub struct PortfolioPowerCalculator {
    ptu_duration_minutes: u32,
}

impl PortfolioPowerCalculator {
    pub fn new(ptu_duration_minutes: u32) -> Self {
        Self {
            ptu_duration_minutes,
        }
    }

    /// 某 PTU 的实际功率
    pub fn actual_power(&self, portfolio: &MeteredPortfolio, ptu_index: i32) -> i64 {
        portfolio
            .connections
            .iter()
            .map(|connection| {
                let uncontrolled = connection
                    .ptus
                    .get(&ptu_index)
                    .and_then(|c| c.most_accurate())
                    .and_then(|d| d.uncontrolled_load)
                    .unwrap_or(0);
                connection
                    .udis
                    .iter()
                    .map(|udi| self.average_device_power(udi, ptu_index))
                    .fold(uncontrolled, i64::saturating_add)
            })
            .fold(0i64, i64::saturating_add)
    }

    /// 一组 PTU 的实际功率
    pub fn actual_powers(&self, portfolio: &MeteredPortfolio, ptu_indices: &[i32]) -> Vec<i64> {
        ptu_indices
            .iter()
            .map(|&ptu_index| self.actual_power(portfolio, ptu_index))
            .collect()
    }

    /// DTU 平均设备功率（向零截断）
    ///
    /// PTU 覆盖 [(idx-1)×PTU, idx×PTU) 分钟，取起点所在的 DTU 起连续的 DTU:
    /// - DTU 不长于 PTU: PTU 内全部 DTU 的平均值
    /// - DTU 长于 PTU: 包含该 PTU 的单个 DTU
    /// 两者互不整除时无法对齐，忽略该设备
    fn average_device_power(&self, udi: &UdiPortfolio, ptu_index: i32) -> i64 {
        let ptu = self.ptu_duration_minutes;
        let dtu = udi.dtu_size_minutes;
        if dtu == 0 || ptu == 0 || (ptu % dtu != 0 && dtu % ptu != 0) {
            tracing::warn!(
                endpoint = %udi.endpoint,
                dtu_size_minutes = dtu,
                ptu_duration_minutes = ptu,
                "DTU 与 PTU 长度无法对齐，忽略该设备"
            );
            return 0;
        }
        if ptu_index < 1 {
            return 0;
        }

        let start_minute = i64::from(ptu_index - 1) * i64::from(ptu);
        let first = start_minute / i64::from(dtu) + 1;
        let dtus_per_ptu = i64::from((ptu / dtu).max(1));
        let last = first + dtus_per_ptu - 1;
        let (Ok(first), Ok(last)) = (i32::try_from(first), i32::try_from(last)) else {
            return 0;
        };

        let total = udi
            .dtus
            .range(first..=last)
            .filter_map(|(_, container)| container.most_accurate())
            .map(|data| data.net_device_power())
            .fold(0i64, i64::saturating_add);

        // i64 除法本身向零截断
        total / dtus_per_ptu
    }
}
