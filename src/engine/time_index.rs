// ==========================================
// 能源灵活性市场 Planboard - PTU 时间索引
// ==========================================
// 职责: 日期 + PTU 时长 → 有序 PTU 序号集合
// 约定: 日期按 UTC 自然日处理（每日 1440 分钟），PTU 序号从 1 开始
// 红线: 纯函数，无状态，不读取系统时钟
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

/// 一天的分钟数
pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtuTimeIndex {
    ptu_duration_minutes: u32,
}

impl PtuTimeIndex {
    /// 创建时间索引
    ///
    /// # 返回
    /// - `None`: 时长为 0 或不能整除一天
    pub fn new(ptu_duration_minutes: u32) -> Option<Self> {
        if ptu_duration_minutes == 0 || MINUTES_PER_DAY % ptu_duration_minutes != 0 {
            return None;
        }
        Some(Self {
            ptu_duration_minutes,
        })
    }

    pub fn ptu_duration_minutes(&self) -> u32 {
        self.ptu_duration_minutes
    }

    /// 某日 PTU 个数
    pub fn ptus_per_day(&self, _period: NaiveDate) -> i32 {
        (MINUTES_PER_DAY / self.ptu_duration_minutes) as i32
    }

    /// 某日全部 PTU 序号（升序）
    pub fn ptu_indices(&self, period: NaiveDate) -> Vec<i32> {
        (1..=self.ptus_per_day(period)).collect()
    }

    /// 时间点所在的 (日期, PTU序号)
    pub fn ptu_index_for(&self, timestamp: NaiveDateTime) -> (NaiveDate, i32) {
        let minute_of_day = timestamp.hour() * 60 + timestamp.minute();
        let index = (minute_of_day / self.ptu_duration_minutes) as i32 + 1;
        (timestamp.date(), index)
    }

    /// PTU 起始时间
    ///
    /// # 返回
    /// - `None`: 序号越界
    pub fn ptu_start(&self, period: NaiveDate, ptu_index: i32) -> Option<NaiveDateTime> {
        if ptu_index < 1 || ptu_index > self.ptus_per_day(period) {
            return None;
        }
        let offset = Duration::minutes(i64::from(ptu_index - 1) * i64::from(self.ptu_duration_minutes));
        period.and_hms_opt(0, 0, 0).map(|midnight| midnight + offset)
    }
}

impl Default for PtuTimeIndex {
    fn default() -> Self {
        Self {
            ptu_duration_minutes: 15,
        }
    }
}
