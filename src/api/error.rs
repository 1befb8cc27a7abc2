// ==========================================
// 能源灵活性市场 Planboard - API层错误类型
// ==========================================
// 职责: 定义消息处理边界的错误类型，转换 Repository / Engine 错误
// 分类:
//   (a) 协议/数据错误 → 本枚举，原样交给调用方拒绝
//   (b) 链路缺口 → 批量结算内部吸收，不经过这里
//   (c) 争议结论 → SettlementVerdict，不是错误
//   (d) find-or-create 冲突 → 仓储内部重试
// ==========================================

use crate::engine::chain_resolver::ChainResolutionError;
use crate::engine::dispute::SettlementProtocolError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 协议/数据错误
    // ==========================================
    #[error("文档链断裂: hop={hop}, sequence={sequence}, participant={participant}, candidates={candidates}")]
    ChainBroken {
        hop: String,
        sequence: i64,
        participant: String,
        candidates: usize,
    },

    #[error("PTU 个数不一致: order={order_sequence}, received={received}, prepared={prepared}")]
    PtuCountMismatch {
        order_sequence: i64,
        received: usize,
        prepared: usize,
    },

    #[error("文档重复: {0}")]
    DuplicateDocument(String),

    #[error("日期已进入结算阶段，不可修改: {0}")]
    PeriodNotMutable(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::ConflictRetryExhausted {
                entity,
                key,
                attempts,
            } => ApiError::ConcurrencyConflict(format!(
                "{}(key={}) 首次注册冲突，重试{}次后仍失败",
                entity, key, attempts
            )),
            RepositoryError::Busy(msg) => ApiError::ConcurrencyConflict(msg),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => ApiError::DuplicateDocument(msg),
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 业务规则错误
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::OverlappingInterval {
                connection,
                group,
                valid_from,
            } => ApiError::BusinessRuleViolation(format!(
                "归属区间重叠: connection={}, group={}, valid_from={}",
                connection, group, valid_from
            )),

            // 数据质量错误
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<ChainResolutionError> for ApiError {
    fn from(err: ChainResolutionError) -> Self {
        match err {
            ChainResolutionError::Broken {
                hop,
                sequence,
                participant,
                candidates,
            } => ApiError::ChainBroken {
                hop: hop.to_string(),
                sequence,
                participant,
                candidates,
            },
            ChainResolutionError::MissingOrigin {
                document_type,
                sequence,
                participant,
            } => ApiError::ChainBroken {
                hop: document_type
                    .origin_type()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| document_type.to_string()),
                sequence,
                participant,
                candidates: 0,
            },
            ChainResolutionError::Repository(e) => e.into(),
        }
    }
}

impl From<SettlementProtocolError> for ApiError {
    fn from(err: SettlementProtocolError) -> Self {
        match err {
            SettlementProtocolError::PtuCountMismatch {
                order_sequence,
                received,
                prepared,
            } => ApiError::PtuCountMismatch {
                order_sequence,
                received,
                prepared,
            },
            SettlementProtocolError::UnknownPtu { .. } | SettlementProtocolError::DuplicatePtu { .. } => {
                ApiError::InvalidInput(err.to_string())
            }
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DocumentType;

    #[test]
    fn test_chain_error_conversion() {
        let err: ApiError = ChainResolutionError::Broken {
            hop: DocumentType::FlexOffer,
            sequence: 3,
            participant: "dso1".to_string(),
            candidates: 2,
        }
        .into();
        match err {
            ApiError::ChainBroken { hop, candidates, .. } => {
                assert_eq!(hop, "FLEX_OFFER");
                assert_eq!(candidates, 2);
            }
            other => panic!("unexpected: {}", other),
        }
    }

    #[test]
    fn test_unique_violation_maps_to_duplicate() {
        let err: ApiError = RepositoryError::UniqueConstraintViolation("dup".to_string()).into();
        assert!(matches!(err, ApiError::DuplicateDocument(_)));
    }
}
