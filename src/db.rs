// ==========================================
// 能源灵活性市场 Planboard - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少多实例并发写入时的偶发 busy 错误
// - 幂等建表（planboard 文档、PTU 容器、连接组归属、结算）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 日期/时间存储格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 幂等建表
///
/// 约束全部落在存储层:
/// - 文档业务主键 (document_type, sequence_number, participant_domain) 唯一
/// - 同一 (参与方, 连接组, 日期) 至多一个 ACCEPTED 预测（部分唯一索引）
/// - 连接 / 连接组按业务标识唯一，供 find-or-create 冲突重试
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS planboard_document (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_type TEXT NOT NULL,
            sequence_number INTEGER NOT NULL,
            origin_sequence_number INTEGER,
            participant_domain TEXT NOT NULL,
            connection_group_id TEXT NOT NULL,
            period TEXT NOT NULL,
            prognosis_type TEXT,
            status TEXT NOT NULL,
            creation_time TEXT NOT NULL,
            expiration_time TEXT,
            UNIQUE (document_type, sequence_number, participant_domain)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_planboard_document_current_prognosis
          ON planboard_document(participant_domain, connection_group_id, period, document_type)
          WHERE status = 'ACCEPTED' AND document_type = 'PROGNOSIS';

        CREATE INDEX IF NOT EXISTS idx_planboard_document_period
          ON planboard_document(period, document_type, status);

        CREATE TABLE IF NOT EXISTS ptu_document_row (
            document_id INTEGER NOT NULL REFERENCES planboard_document(id) ON DELETE CASCADE,
            ptu_index INTEGER NOT NULL,
            power INTEGER NOT NULL,
            price TEXT,
            disposition TEXT,
            PRIMARY KEY (document_id, ptu_index)
        );

        CREATE TABLE IF NOT EXISTS ptu_container (
            period TEXT NOT NULL,
            ptu_index INTEGER NOT NULL,
            phase TEXT NOT NULL,
            PRIMARY KEY (period, ptu_index)
        );

        CREATE TABLE IF NOT EXISTS connection (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_address TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS connection_group (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id TEXT NOT NULL UNIQUE,
            group_type TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS connection_group_state (
            connection_entity_address TEXT NOT NULL,
            connection_group_id TEXT NOT NULL,
            valid_from TEXT NOT NULL,
            valid_until TEXT NOT NULL,
            PRIMARY KEY (connection_entity_address, connection_group_id, valid_from)
        );

        CREATE INDEX IF NOT EXISTS idx_connection_group_state_group
          ON connection_group_state(connection_group_id, valid_from, valid_until);

        CREATE TABLE IF NOT EXISTS flex_order_settlement (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_sequence INTEGER NOT NULL,
            participant_domain TEXT NOT NULL,
            connection_group_id TEXT NOT NULL,
            period TEXT NOT NULL,
            prognosis_sequence INTEGER,
            verdict TEXT,
            UNIQUE (order_sequence, participant_domain)
        );

        CREATE TABLE IF NOT EXISTS ptu_settlement (
            settlement_id INTEGER NOT NULL REFERENCES flex_order_settlement(id) ON DELETE CASCADE,
            ptu_index INTEGER NOT NULL,
            actual_power INTEGER NOT NULL,
            prognosis_power INTEGER NOT NULL,
            ordered_flex_power INTEGER NOT NULL,
            delivered_flex_power INTEGER NOT NULL,
            power_deficiency INTEGER NOT NULL,
            price TEXT NOT NULL,
            penalty TEXT NOT NULL,
            net_settlement TEXT NOT NULL,
            PRIMARY KEY (settlement_id, ptu_index)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
