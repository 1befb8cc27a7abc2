// ==========================================
// 能源灵活性市场 Planboard - PTU 容器仓储
// ==========================================
// 职责: ptu_container 表 (按日期 + PTU序号)
// 并发: 阶段批量更新在 IMMEDIATE 事务中执行，同一数据库上的阶段推进串行化
// ==========================================

use crate::db::DATE_FORMAT;
use crate::domain::ptu::PtuContainer;
use crate::domain::types::PhaseType;
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};

/// 阶段批量更新条件
///
/// 只更新满足全部条件的容器:
/// - period 匹配
/// - 当前阶段属于 `from_phases`
/// - `ptu_index` 匹配（若指定）
/// - `ptu_index > after_ptu_index`（若指定）
/// - `ptu_index < before_ptu_index`（若指定）
#[derive(Debug, Clone)]
pub struct PhaseUpdate {
    pub period: NaiveDate,
    pub target: PhaseType,
    pub from_phases: Vec<PhaseType>,
    pub ptu_index: Option<i32>,
    pub after_ptu_index: Option<i32>,
    pub before_ptu_index: Option<i32>,
}

impl PhaseUpdate {
    pub fn new(period: NaiveDate, target: PhaseType, from_phases: Vec<PhaseType>) -> Self {
        Self {
            period,
            target,
            from_phases,
            ptu_index: None,
            after_ptu_index: None,
            before_ptu_index: None,
        }
    }
}

// ==========================================
// PtuContainerRepository - PTU 容器仓储
// ==========================================
pub struct PtuContainerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PtuContainerRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 初始化某日期的全部 PTU 容器（阶段 Plan，已存在则跳过）
    ///
    /// # 返回
    /// - `Ok(count)`: 新插入的容器数
    pub fn initialize_period(&self, period: NaiveDate, ptu_count: i32) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO ptu_container (period, ptu_index, phase) VALUES (?1, ?2, ?3)",
            )?;
            let period_str = period.format(DATE_FORMAT).to_string();
            for ptu_index in 1..=ptu_count {
                inserted += stmt.execute(params![
                    &period_str,
                    ptu_index,
                    PhaseType::Plan.to_db_str()
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// 查询某日期全部容器（按序号升序）
    pub fn find_by_period(&self, period: NaiveDate) -> RepositoryResult<Vec<PtuContainer>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT period, ptu_index, phase
               FROM ptu_container
               WHERE period = ?1
               ORDER BY ptu_index ASC"#,
        )?;

        let containers = stmt
            .query_map(params![period.format(DATE_FORMAT).to_string()], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(containers)
    }

    /// 查询单个容器阶段
    pub fn find_phase(&self, period: NaiveDate, ptu_index: i32) -> RepositoryResult<Option<PhaseType>> {
        let conn = self.get_conn()?;
        let phase: Option<String> = conn
            .query_row(
                "SELECT phase FROM ptu_container WHERE period = ?1 AND ptu_index = ?2",
                params![period.format(DATE_FORMAT).to_string(), ptu_index],
                |row| row.get(0),
            )
            .optional()?;

        phase
            .map(|p| {
                PhaseType::from_str(&p).ok_or_else(|| RepositoryError::FieldValueError {
                    field: "phase".to_string(),
                    message: format!("未知阶段: {}", p),
                })
            })
            .transpose()
    }

    /// 条件批量更新阶段（单条 UPDATE，IMMEDIATE 事务）
    ///
    /// # 返回
    /// - `Ok(count)`: 实际更新的容器数
    pub fn update_phase(&self, update: &PhaseUpdate) -> RepositoryResult<usize> {
        if update.from_phases.is_empty() {
            return Ok(0);
        }

        let mut sql = String::from("UPDATE ptu_container SET phase = ?1 WHERE period = ?2");
        let mut values: Vec<Value> = vec![
            Value::from(update.target.to_db_str().to_string()),
            Value::from(update.period.format(DATE_FORMAT).to_string()),
        ];
        let mut idx: i32 = 3;

        let placeholders: Vec<String> = update
            .from_phases
            .iter()
            .map(|phase| {
                values.push(Value::from(phase.to_db_str().to_string()));
                let p = format!("?{}", idx);
                idx += 1;
                p
            })
            .collect();
        sql.push_str(&format!(" AND phase IN ({})", placeholders.join(", ")));

        if let Some(ptu_index) = update.ptu_index {
            sql.push_str(&format!(" AND ptu_index = ?{}", idx));
            values.push(Value::from(ptu_index));
            idx += 1;
        }
        if let Some(after) = update.after_ptu_index {
            sql.push_str(&format!(" AND ptu_index > ?{}", idx));
            values.push(Value::from(after));
            idx += 1;
        }
        if let Some(before) = update.before_ptu_index {
            sql.push_str(&format!(" AND ptu_index < ?{}", idx));
            values.push(Value::from(before));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(&sql, params_from_iter(values))?;
        tx.commit()?;
        Ok(updated)
    }

    /// 删除指定日期之前的容器
    pub fn delete_periods_before(&self, horizon: NaiveDate) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM ptu_container WHERE period < ?1",
            params![horizon.format(DATE_FORMAT).to_string()],
        )?;
        Ok(deleted)
    }
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<PtuContainer> {
    let period: String = row.get(0)?;
    let period =
        NaiveDate::parse_from_str(&period, DATE_FORMAT).map_err(|e| conversion_error(0, e.to_string()))?;
    let phase: String = row.get(2)?;
    let phase = PhaseType::from_str(&phase).ok_or_else(|| conversion_error(2, format!("未知阶段: {}", phase)))?;

    Ok(PtuContainer {
        period,
        ptu_index: row.get(1)?,
        phase,
    })
}
