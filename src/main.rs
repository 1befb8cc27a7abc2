// ==========================================
// 能源灵活性市场 Planboard - 维护入口
// ==========================================
// 用法:
//   flex-planboard [db_path] [cleanup]
//
// 打开（或创建）数据库，初始化昨天与今天的 PTU 阶段；
// 传入 cleanup 时同时清理超过结算保留期的日期。
// 数据库路径也可用环境变量 FLEX_PLANBOARD_DB 指定；
// FLEX_PLANBOARD_LOG_FORMAT=json 时输出 JSON 行日志。
// ==========================================

use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{Duration, Utc};
use flex_planboard::config::ConfigManager;
use flex_planboard::db::{ensure_schema, open_sqlite_connection, read_schema_version};
use flex_planboard::{logging, PlanboardApi, APP_NAME, VERSION};

const DEFAULT_DB_PATH: &str = "flex_planboard.db";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("FLEX_PLANBOARD_LOG_FORMAT").as_deref() == Ok("json") {
        logging::init_json();
    } else {
        logging::init();
    }

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .or_else(|| std::env::var("FLEX_PLANBOARD_DB").ok())
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    let cleanup = args.next().as_deref() == Some("cleanup");

    tracing::info!("==================================================");
    tracing::info!("{} v{}", APP_NAME, VERSION);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    let conn = open_sqlite_connection(&db_path).with_context(|| format!("无法打开数据库 {}", db_path))?;
    ensure_schema(&conn).context("数据库建表失败")?;
    tracing::info!(schema_version = ?read_schema_version(&conn)?, "数据库就绪");

    let conn = Arc::new(Mutex::new(conn));
    let config = Arc::new(
        ConfigManager::from_connection(conn.clone()).map_err(|e| anyhow::anyhow!("配置初始化失败: {}", e))?,
    );
    let api = PlanboardApi::new(conn, config).await?;

    let now = Utc::now().naive_utc();
    let today = now.date();
    for period in [today - Duration::days(1), today] {
        let updated = api.initialize_phases(period, now)?;
        tracing::info!(period = %period, updated, "PTU 阶段初始化");
    }

    if cleanup {
        let report = api.cleanup_expired_periods(today).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
