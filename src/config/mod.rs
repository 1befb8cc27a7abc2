// ==========================================
// 能源灵活性市场 Planboard - 配置层
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod planboard_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use planboard_config_trait::PlanboardConfigReader;

/// 配置层 Result 别名
pub type ConfigResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
