// ==========================================
// 能源灵活性市场 Planboard - 配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::ConfigResult;

// ==========================================
// PlanboardConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait PlanboardConfigReader: Send + Sync {
    /// PTU 长度（分钟）
    ///
    /// # 默认值
    /// - 15
    async fn get_ptu_duration_minutes(&self) -> ConfigResult<u32>;

    /// 阶段推进前瞻 PTU 数
    ///
    /// 当天进入 Plan/Validate 时，序号 <= 当前PTU + 前瞻 的 PTU 被排除
    ///
    /// # 默认值
    /// - 1
    async fn get_phase_lookahead_ptus(&self) -> ConfigResult<i32>;

    /// 结算争议相对容差（0.2 = 20%）
    ///
    /// # 默认值
    /// - 0.2
    async fn get_settlement_tolerance(&self) -> ConfigResult<Decimal>;

    /// 结算保留天数（超过后按日期清理）
    ///
    /// # 默认值
    /// - 60
    async fn get_settlement_horizon_days(&self) -> ConfigResult<i64>;

    /// find-or-create 冲突重试次数上限
    ///
    /// # 默认值
    /// - 3
    async fn get_max_find_or_create_retries(&self) -> ConfigResult<u32>;
}
