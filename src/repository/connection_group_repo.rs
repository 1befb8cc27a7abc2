// ==========================================
// 能源灵活性市场 Planboard - 连接/连接组仓储
// ==========================================
// 职责: connection / connection_group / connection_group_state
// 并发: 首次注册走 “insert-if-absent，否则读取” 的单个 IMMEDIATE 事务，
//       由唯一约束兜底，冲突(busy/unique)时重读重试，多实例通过存储协调
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection, DATE_FORMAT};
use crate::domain::connection::{Connection as GridConnection, ConnectionGroup, ConnectionGroupState};
use crate::domain::types::ConnectionGroupType;
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, TransactionBehavior};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 find-or-create 重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 重试退避基数（毫秒）
const RETRY_BACKOFF_MS: u64 = 20;

// ==========================================
// ConnectionGroupRepository - 连接组仓储
// ==========================================
pub struct ConnectionGroupRepository {
    conn: Arc<Mutex<Connection>>,
    max_retries: u32,
}

impl ConnectionGroupRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// 以独立连接打开（多实例/多线程各自持有连接）
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在冲突时重试操作；非冲突错误直接返回
    fn with_conflict_retry<T>(
        &self,
        entity: &str,
        key: &str,
        mut op: impl FnMut(&mut Connection) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        for attempt in 1..=self.max_retries {
            let result = {
                let mut conn = self.get_conn()?;
                op(&mut conn)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable_conflict() => {
                    tracing::warn!(
                        entity,
                        key,
                        attempt,
                        error = %e,
                        "find-or-create 冲突，重读重试"
                    );
                    std::thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64));
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::ConflictRetryExhausted {
            entity: entity.to_string(),
            key: key.to_string(),
            attempts: self.max_retries,
        })
    }

    // ==========================================
    // find-or-create
    // ==========================================

    /// 查找或创建连接组
    ///
    /// 已存在时返回既有记录（不修改 group_type）
    pub fn find_or_create_group(
        &self,
        group_id: &str,
        group_type: ConnectionGroupType,
    ) -> RepositoryResult<ConnectionGroup> {
        self.with_conflict_retry("ConnectionGroup", group_id, |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                r#"INSERT INTO connection_group (group_id, group_type) VALUES (?1, ?2)
                   ON CONFLICT(group_id) DO NOTHING"#,
                params![group_id, group_type.to_db_str()],
            )?;
            let group = tx.query_row(
                "SELECT id, group_id, group_type FROM connection_group WHERE group_id = ?1",
                params![group_id],
                map_group_row,
            )?;
            tx.commit()?;
            Ok(group)
        })
    }

    /// 查找或创建物理连接
    pub fn find_or_create_connection(&self, entity_address: &str) -> RepositoryResult<GridConnection> {
        self.with_conflict_retry("Connection", entity_address, |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO connection (entity_address) VALUES (?1) ON CONFLICT(entity_address) DO NOTHING",
                params![entity_address],
            )?;
            let connection = tx.query_row(
                "SELECT id, entity_address FROM connection WHERE entity_address = ?1",
                params![entity_address],
                |row| {
                    Ok(GridConnection {
                        id: row.get(0)?,
                        entity_address: row.get(1)?,
                    })
                },
            )?;
            tx.commit()?;
            Ok(connection)
        })
    }

    pub fn find_group(&self, group_id: &str) -> RepositoryResult<Option<ConnectionGroup>> {
        let conn = self.get_conn()?;
        match conn.query_row(
            "SELECT id, group_id, group_type FROM connection_group WHERE group_id = ?1",
            params![group_id],
            map_group_row,
        ) {
            Ok(group) => Ok(Some(group)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count_groups(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM connection_group", [], |row| row.get(0))?)
    }

    // ==========================================
    // 归属区间
    // ==========================================

    /// 新增归属区间
    ///
    /// # 返回
    /// - `Err(FieldValueError)`: valid_from >= valid_until
    /// - `Err(OverlappingInterval)`: 与同一连接/组的既有区间重叠
    pub fn add_state(&self, state: &ConnectionGroupState) -> RepositoryResult<()> {
        if !state.is_well_formed() {
            return Err(RepositoryError::FieldValueError {
                field: "valid_until".to_string(),
                message: format!(
                    "区间为空: valid_from={}, valid_until={}",
                    state.valid_from, state.valid_until
                ),
            });
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let overlapping: i64 = tx.query_row(
            r#"SELECT COUNT(*) FROM connection_group_state
               WHERE connection_entity_address = ?1
                 AND connection_group_id = ?2
                 AND valid_from < ?4
                 AND ?3 < valid_until"#,
            params![
                &state.connection_entity_address,
                &state.connection_group_id,
                state.valid_from.format(DATE_FORMAT).to_string(),
                state.valid_until.format(DATE_FORMAT).to_string(),
            ],
            |row| row.get(0),
        )?;

        if overlapping > 0 {
            return Err(RepositoryError::OverlappingInterval {
                connection: state.connection_entity_address.clone(),
                group: state.connection_group_id.clone(),
                valid_from: state.valid_from.to_string(),
            });
        }

        tx.execute(
            r#"INSERT INTO connection_group_state (
                connection_entity_address, connection_group_id, valid_from, valid_until
            ) VALUES (?1, ?2, ?3, ?4)"#,
            params![
                &state.connection_entity_address,
                &state.connection_group_id,
                state.valid_from.format(DATE_FORMAT).to_string(),
                state.valid_until.format(DATE_FORMAT).to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// 提前结束一个区间（新的 valid_until 必须在原区间内）
    pub fn close_state(
        &self,
        connection_entity_address: &str,
        connection_group_id: &str,
        valid_from: NaiveDate,
        valid_until: NaiveDate,
    ) -> RepositoryResult<()> {
        if valid_until <= valid_from {
            return Err(RepositoryError::FieldValueError {
                field: "valid_until".to_string(),
                message: format!("valid_until={} 不晚于 valid_from={}", valid_until, valid_from),
            });
        }

        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"UPDATE connection_group_state SET valid_until = ?4
               WHERE connection_entity_address = ?1
                 AND connection_group_id = ?2
                 AND valid_from = ?3
                 AND valid_until >= ?4"#,
            params![
                connection_entity_address,
                connection_group_id,
                valid_from.format(DATE_FORMAT).to_string(),
                valid_until.format(DATE_FORMAT).to_string(),
            ],
        )?;

        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ConnectionGroupState".to_string(),
                id: format!("{}/{}/{}", connection_entity_address, connection_group_id, valid_from),
            });
        }
        Ok(())
    }

    /// 某日期有效的全部归属
    pub fn find_active_states(&self, date: NaiveDate) -> RepositoryResult<Vec<ConnectionGroupState>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT connection_entity_address, connection_group_id, valid_from, valid_until
               FROM connection_group_state
               WHERE valid_from <= ?1 AND ?1 < valid_until
               ORDER BY connection_group_id ASC, connection_entity_address ASC"#,
        )?;
        let states = stmt
            .query_map(params![date.format(DATE_FORMAT).to_string()], map_state_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(states)
    }

    /// 某日期属于指定连接组的连接地址
    pub fn find_connections_of_group(
        &self,
        connection_group_id: &str,
        date: NaiveDate,
    ) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT connection_entity_address
               FROM connection_group_state
               WHERE connection_group_id = ?1 AND valid_from <= ?2 AND ?2 < valid_until
               ORDER BY connection_entity_address ASC"#,
        )?;
        let addresses = stmt
            .query_map(
                params![connection_group_id, date.format(DATE_FORMAT).to_string()],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(addresses)
    }
}

fn map_group_row(row: &rusqlite::Row) -> rusqlite::Result<ConnectionGroup> {
    let group_type: String = row.get(2)?;
    let group_type = ConnectionGroupType::from_str(&group_type)
        .ok_or_else(|| conversion_error(2, format!("未知连接组类型: {}", group_type)))?;
    Ok(ConnectionGroup {
        id: row.get(0)?,
        group_id: row.get(1)?,
        group_type,
    })
}

fn map_state_row(row: &rusqlite::Row) -> rusqlite::Result<ConnectionGroupState> {
    let valid_from: String = row.get(2)?;
    let valid_until: String = row.get(3)?;
    Ok(ConnectionGroupState {
        connection_entity_address: row.get(0)?,
        connection_group_id: row.get(1)?,
        valid_from: NaiveDate::parse_from_str(&valid_from, DATE_FORMAT)
            .map_err(|e| conversion_error(2, e.to_string()))?,
        valid_until: NaiveDate::parse_from_str(&valid_until, DATE_FORMAT)
            .map_err(|e| conversion_error(3, e.to_string()))?,
    })
}
