// ==========================================
// 能源灵活性市场 Planboard - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::planboard_config_trait::PlanboardConfigReader;
use crate::config::ConfigResult;
use crate::db::{ensure_schema, open_sqlite_connection};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA 与建表（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
            ensure_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 结算批次报告中记录当时生效的配置
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// PlanboardConfigReader Trait 实现
// ==========================================
#[async_trait]
impl PlanboardConfigReader for ConfigManager {
    async fn get_ptu_duration_minutes(&self) -> ConfigResult<u32> {
        let value = self.get_config_or_default(config_keys::PTU_DURATION_MINUTES, "15")?;
        let minutes = value.trim().parse::<u32>().unwrap_or(15);
        // PTU 必须整除一天
        if minutes == 0 || 1440 % minutes != 0 {
            tracing::warn!(
                config_key = config_keys::PTU_DURATION_MINUTES,
                raw_value = %value,
                "PTU 长度配置无效，使用默认 15 分钟"
            );
            return Ok(15);
        }
        Ok(minutes)
    }

    async fn get_phase_lookahead_ptus(&self) -> ConfigResult<i32> {
        let value = self.get_config_or_default(config_keys::PHASE_LOOKAHEAD_PTUS, "1")?;
        Ok(value.trim().parse::<i32>().unwrap_or(1).max(0))
    }

    async fn get_settlement_tolerance(&self) -> ConfigResult<Decimal> {
        let value = self.get_config_or_default(config_keys::SETTLEMENT_TOLERANCE, "0.2")?;
        match Decimal::from_str(value.trim()) {
            Ok(tolerance) if tolerance >= Decimal::ZERO => Ok(tolerance),
            _ => {
                tracing::warn!(
                    config_key = config_keys::SETTLEMENT_TOLERANCE,
                    raw_value = %value,
                    "结算容差配置无效，使用默认 0.2"
                );
                Ok(Decimal::new(2, 1))
            }
        }
    }

    async fn get_settlement_horizon_days(&self) -> ConfigResult<i64> {
        let value = self.get_config_or_default(config_keys::SETTLEMENT_HORIZON_DAYS, "60")?;
        Ok(value.trim().parse::<i64>().unwrap_or(60))
    }

    async fn get_max_find_or_create_retries(&self) -> ConfigResult<u32> {
        let value = self.get_config_or_default(config_keys::FIND_OR_CREATE_MAX_RETRIES, "3")?;
        Ok(value.trim().parse::<u32>().unwrap_or(3).max(1))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 时间切片
    pub const PTU_DURATION_MINUTES: &str = "ptu_duration_minutes";
    pub const PHASE_LOOKAHEAD_PTUS: &str = "phase_lookahead_ptus";

    // 结算
    pub const SETTLEMENT_TOLERANCE: &str = "settlement_tolerance";
    pub const SETTLEMENT_HORIZON_DAYS: &str = "settlement_horizon_days";

    // 存储协调
    pub const FIND_OR_CREATE_MAX_RETRIES: &str = "find_or_create_max_retries";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let config = in_memory();
        assert_eq!(config.get_ptu_duration_minutes().await.unwrap(), 15);
        assert_eq!(config.get_phase_lookahead_ptus().await.unwrap(), 1);
        assert_eq!(config.get_settlement_tolerance().await.unwrap(), Decimal::new(2, 1));
        assert_eq!(config.get_settlement_horizon_days().await.unwrap(), 60);
        assert_eq!(config.get_max_find_or_create_retries().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_overrides_and_invalid_values() {
        let config = in_memory();
        config
            .set_global_config_value(config_keys::PTU_DURATION_MINUTES, "60")
            .unwrap();
        config
            .set_global_config_value(config_keys::SETTLEMENT_TOLERANCE, "0.05")
            .unwrap();
        assert_eq!(config.get_ptu_duration_minutes().await.unwrap(), 60);
        assert_eq!(config.get_settlement_tolerance().await.unwrap(), Decimal::new(5, 2));

        // 7 分钟无法整除一天
        config
            .set_global_config_value(config_keys::PTU_DURATION_MINUTES, "7")
            .unwrap();
        assert_eq!(config.get_ptu_duration_minutes().await.unwrap(), 15);

        let snapshot = config.get_config_snapshot().unwrap();
        assert!(snapshot.contains("settlement_tolerance"));
    }
}
