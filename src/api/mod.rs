// ==========================================
// 能源灵活性市场 Planboard - API 层
// ==========================================
// 职责: 提供消息处理边界的业务接口
// ==========================================

pub mod error;
pub mod planboard_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use planboard_api::{CleanupReport, PlanboardApi};
