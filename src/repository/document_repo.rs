// ==========================================
// 能源灵活性市场 Planboard - 文档仓储
// ==========================================
// 职责: planboard_document + ptu_document_row 的 CRUD 与链路查询
// 红线: Repository 不含业务逻辑; REJECTED 文档不参与任何匹配查询
// 布局: 单表 + document_type 判别列，边界处强类型解码
// ==========================================

use crate::db::{DATETIME_FORMAT, DATE_FORMAT};
use crate::domain::document::{DocumentKey, PlanboardDocument, PtuDocumentRow};
use crate::domain::types::{DispositionType, DocumentStatus, DocumentType, PrognosisType};
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const DOCUMENT_COLUMNS: &str = r#"id, document_type, sequence_number, origin_sequence_number,
    participant_domain, connection_group_id, period, prognosis_type,
    status, creation_time, expiration_time"#;

// ==========================================
// PlanboardDocumentRepository - 文档仓储
// ==========================================
pub struct PlanboardDocumentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PlanboardDocumentRepository {
    /// 创建新的PlanboardDocumentRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 插入文档及其 PTU 明细（单事务）
    ///
    /// # 返回
    /// - `Ok(id)`: 新文档的数据库ID
    /// - `Err(UniqueConstraintViolation)`: 业务主键重复
    pub fn insert(&self, document: &PlanboardDocument) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let id = insert_document(&tx, document)?;
        tx.commit()?;
        Ok(id)
    }

    /// 插入文档并将同一 (参与方, 连接组, 日期, 类型) 下原 ACCEPTED 文档归档（单事务）
    ///
    /// # 返回
    /// - `Ok((id, archived_count))`
    pub fn insert_superseding(&self, document: &PlanboardDocument) -> RepositoryResult<(i64, usize)> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let archived = tx.execute(
            r#"UPDATE planboard_document
               SET status = 'ARCHIVED'
               WHERE participant_domain = ?1
                 AND connection_group_id = ?2
                 AND period = ?3
                 AND document_type = ?4
                 AND status = 'ACCEPTED'"#,
            params![
                &document.participant_domain,
                &document.connection_group_id,
                document.period.format(DATE_FORMAT).to_string(),
                document.document_type.to_db_str(),
            ],
        )?;

        let id = insert_document(&tx, document)?;
        tx.commit()?;
        Ok((id, archived))
    }

    /// 更新文档状态（单调前进）
    ///
    /// # 返回
    /// - `Ok(previous_status)`
    /// - `Err(NotFound)`: 文档不存在
    /// - `Err(InvalidStateTransition)`: 试图回退或撤销拒绝
    pub fn update_status(
        &self,
        key: &DocumentKey,
        status: DocumentStatus,
    ) -> RepositoryResult<DocumentStatus> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let (previous, _) = update_status_in(&tx, key, status, false)?;
        tx.commit()?;
        Ok(previous)
    }

    /// 更新为 ACCEPTED 并归档同一 (参与方, 连接组, 日期, 类型) 下原 ACCEPTED 文档（单事务）
    ///
    /// # 返回
    /// - `Ok((previous_status, archived_count))`
    pub fn update_status_superseding(
        &self,
        key: &DocumentKey,
        status: DocumentStatus,
    ) -> RepositoryResult<(DocumentStatus, usize)> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let result = update_status_in(&tx, key, status, status == DocumentStatus::Accepted)?;
        tx.commit()?;
        Ok(result)
    }

    /// 删除指定日期之前的所有文档（PTU 明细级联删除）
    pub fn delete_periods_before(&self, horizon: NaiveDate) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM planboard_document WHERE period < ?1",
            params![horizon.format(DATE_FORMAT).to_string()],
        )?;
        Ok(deleted)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按业务主键查询（包含 REJECTED）
    pub fn find_by_key(&self, key: &DocumentKey) -> RepositoryResult<Option<PlanboardDocument>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM planboard_document
             WHERE document_type = ?1 AND sequence_number = ?2 AND participant_domain = ?3",
            DOCUMENT_COLUMNS
        );
        let docs = query_documents(
            &conn,
            &sql,
            params![
                key.document_type.to_db_str(),
                key.sequence_number,
                &key.participant_domain
            ],
        )?;
        Ok(docs.into_iter().next())
    }

    /// 链路单跳查询: 按 (类型, 序号, 参与方) 查找非 REJECTED 候选
    ///
    /// 返回全部候选，由调用方判定“恰好一个”
    pub fn find_chain_candidates(
        &self,
        document_type: DocumentType,
        sequence_number: i64,
        participant_domain: &str,
    ) -> RepositoryResult<Vec<PlanboardDocument>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM planboard_document
             WHERE document_type = ?1 AND sequence_number = ?2 AND participant_domain = ?3
               AND status <> 'REJECTED'
             ORDER BY sequence_number DESC",
            DOCUMENT_COLUMNS
        );
        query_documents(
            &conn,
            &sql,
            params![document_type.to_db_str(), sequence_number, participant_domain],
        )
    }

    /// 当前（ACCEPTED）文档
    pub fn find_current(
        &self,
        participant_domain: &str,
        connection_group_id: &str,
        period: NaiveDate,
        document_type: DocumentType,
    ) -> RepositoryResult<Option<PlanboardDocument>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM planboard_document
             WHERE participant_domain = ?1 AND connection_group_id = ?2 AND period = ?3
               AND document_type = ?4 AND status = 'ACCEPTED'
             ORDER BY sequence_number DESC
             LIMIT 1",
            DOCUMENT_COLUMNS
        );
        let docs = query_documents(
            &conn,
            &sql,
            params![
                participant_domain,
                connection_group_id,
                period.format(DATE_FORMAT).to_string(),
                document_type.to_db_str()
            ],
        )?;
        Ok(docs.into_iter().next())
    }

    /// 最新预测: 同一参与方/连接组/日期下序号最大的非 REJECTED 预测
    pub fn find_latest_prognosis(
        &self,
        participant_domain: &str,
        connection_group_id: &str,
        period: NaiveDate,
    ) -> RepositoryResult<Option<PlanboardDocument>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM planboard_document
             WHERE participant_domain = ?1 AND connection_group_id = ?2 AND period = ?3
               AND document_type = 'PROGNOSIS' AND status <> 'REJECTED'
             ORDER BY sequence_number DESC
             LIMIT 1",
            DOCUMENT_COLUMNS
        );
        let docs = query_documents(
            &conn,
            &sql,
            params![
                participant_domain,
                connection_group_id,
                period.format(DATE_FORMAT).to_string()
            ],
        )?;
        Ok(docs.into_iter().next())
    }

    /// 某日期全部 ACCEPTED 订单
    ///
    /// 排序: connection_group_id, participant_domain, sequence_number DESC
    pub fn find_accepted_flex_orders(&self, period: NaiveDate) -> RepositoryResult<Vec<PlanboardDocument>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM planboard_document
             WHERE period = ?1 AND document_type = 'FLEX_ORDER' AND status = 'ACCEPTED'
             ORDER BY connection_group_id ASC, participant_domain ASC, sequence_number DESC",
            DOCUMENT_COLUMNS
        );
        query_documents(&conn, &sql, params![period.format(DATE_FORMAT).to_string()])
    }

    /// 引用指定报价的订单（非 REJECTED）
    pub fn find_orders_for_offer(
        &self,
        offer_sequence: i64,
        participant_domain: &str,
    ) -> RepositoryResult<Vec<PlanboardDocument>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM planboard_document
             WHERE document_type = 'FLEX_ORDER' AND origin_sequence_number = ?1
               AND participant_domain = ?2 AND status <> 'REJECTED'
             ORDER BY sequence_number DESC",
            DOCUMENT_COLUMNS
        );
        query_documents(&conn, &sql, params![offer_sequence, participant_domain])
    }

    /// 某日期某类型的全部文档
    pub fn find_by_period(
        &self,
        period: NaiveDate,
        document_type: DocumentType,
    ) -> RepositoryResult<Vec<PlanboardDocument>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM planboard_document
             WHERE period = ?1 AND document_type = ?2
             ORDER BY participant_domain ASC, sequence_number ASC",
            DOCUMENT_COLUMNS
        );
        query_documents(
            &conn,
            &sql,
            params![period.format(DATE_FORMAT).to_string(), document_type.to_db_str()],
        )
    }
}

// ==========================================
// 内部辅助
// ==========================================

fn update_status_in(
    conn: &Connection,
    key: &DocumentKey,
    status: DocumentStatus,
    supersede: bool,
) -> RepositoryResult<(DocumentStatus, usize)> {
    let current: Option<(i64, String, String, String)> = conn
        .query_row(
            r#"SELECT id, status, connection_group_id, period FROM planboard_document
               WHERE document_type = ?1 AND sequence_number = ?2 AND participant_domain = ?3"#,
            params![
                key.document_type.to_db_str(),
                key.sequence_number,
                &key.participant_domain
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let (id, current, connection_group_id, period) =
        current.ok_or_else(|| RepositoryError::NotFound {
            entity: "PlanboardDocument".to_string(),
            id: key.to_string(),
        })?;
    let current = DocumentStatus::from_str(&current).ok_or_else(|| {
        RepositoryError::FieldValueError {
            field: "status".to_string(),
            message: format!("未知状态: {}", current),
        }
    })?;

    if !current.can_transition_to(status) {
        return Err(RepositoryError::InvalidStateTransition {
            from: current.to_string(),
            to: status.to_string(),
        });
    }

    let mut archived = 0;
    if supersede {
        archived = conn.execute(
            r#"UPDATE planboard_document
               SET status = 'ARCHIVED'
               WHERE participant_domain = ?1
                 AND connection_group_id = ?2
                 AND period = ?3
                 AND document_type = ?4
                 AND status = 'ACCEPTED'
                 AND id <> ?5"#,
            params![
                &key.participant_domain,
                &connection_group_id,
                &period,
                key.document_type.to_db_str(),
                id
            ],
        )?;
    }

    conn.execute(
        "UPDATE planboard_document SET status = ?1 WHERE id = ?2",
        params![status.to_db_str(), id],
    )?;
    Ok((current, archived))
}

fn insert_document(conn: &Connection, document: &PlanboardDocument) -> RepositoryResult<i64> {
    conn.execute(
        r#"INSERT INTO planboard_document (
            document_type, sequence_number, origin_sequence_number,
            participant_domain, connection_group_id, period, prognosis_type,
            status, creation_time, expiration_time
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
        params![
            document.document_type.to_db_str(),
            document.sequence_number,
            document.origin_sequence_number,
            &document.participant_domain,
            &document.connection_group_id,
            document.period.format(DATE_FORMAT).to_string(),
            document.prognosis_type.map(|t| t.to_db_str()),
            document.status.to_db_str(),
            document.creation_time.format(DATETIME_FORMAT).to_string(),
            document
                .expiration_time
                .map(|t| t.format(DATETIME_FORMAT).to_string()),
        ],
    )?;
    let id = conn.last_insert_rowid();

    let mut stmt = conn.prepare(
        r#"INSERT INTO ptu_document_row (document_id, ptu_index, power, price, disposition)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
    )?;
    for row in &document.ptus {
        stmt.execute(params![
            id,
            row.ptu_index,
            row.power,
            row.price.map(|p| p.to_string()),
            row.disposition.map(|d| d.to_db_str()),
        ])?;
    }

    Ok(id)
}

fn query_documents<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> RepositoryResult<Vec<PlanboardDocument>> {
    let mut stmt = conn.prepare(sql)?;
    let mut documents = stmt
        .query_map(params, map_document_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for document in documents.iter_mut() {
        if let Some(id) = document.id {
            document.ptus = load_ptus(conn, id)?;
        }
    }
    Ok(documents)
}

fn load_ptus(conn: &Connection, document_id: i64) -> RepositoryResult<Vec<PtuDocumentRow>> {
    let mut stmt = conn.prepare(
        r#"SELECT ptu_index, power, price, disposition
           FROM ptu_document_row
           WHERE document_id = ?1
           ORDER BY ptu_index ASC"#,
    )?;

    let rows = stmt
        .query_map(params![document_id], |row| {
            let price: Option<String> = row.get(2)?;
            let price = price
                .map(|p| Decimal::from_str(&p).map_err(|e| conversion_error(2, e.to_string())))
                .transpose()?;
            let disposition: Option<String> = row.get(3)?;
            let disposition = disposition
                .map(|d| {
                    DispositionType::from_str(&d)
                        .ok_or_else(|| conversion_error(3, format!("未知处置: {}", d)))
                })
                .transpose()?;
            Ok(PtuDocumentRow {
                ptu_index: row.get(0)?,
                power: row.get(1)?,
                price,
                disposition,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// 映射数据库行到 PlanboardDocument（不含 PTU 明细）
fn map_document_row(row: &rusqlite::Row) -> rusqlite::Result<PlanboardDocument> {
    let document_type: String = row.get(1)?;
    let document_type = DocumentType::from_str(&document_type)
        .ok_or_else(|| conversion_error(1, format!("未知文档类型: {}", document_type)))?;

    let period: String = row.get(6)?;
    let period = NaiveDate::parse_from_str(&period, DATE_FORMAT)
        .map_err(|e| conversion_error(6, e.to_string()))?;

    let prognosis_type: Option<String> = row.get(7)?;
    let prognosis_type = prognosis_type
        .map(|t| {
            PrognosisType::from_str(&t).ok_or_else(|| conversion_error(7, format!("未知预测类型: {}", t)))
        })
        .transpose()?;

    let status: String = row.get(8)?;
    let status = DocumentStatus::from_str(&status)
        .ok_or_else(|| conversion_error(8, format!("未知状态: {}", status)))?;

    let creation_time: String = row.get(9)?;
    let creation_time = NaiveDateTime::parse_from_str(&creation_time, DATETIME_FORMAT)
        .map_err(|e| conversion_error(9, e.to_string()))?;

    let expiration_time: Option<String> = row.get(10)?;
    let expiration_time = expiration_time
        .map(|t| NaiveDateTime::parse_from_str(&t, DATETIME_FORMAT).map_err(|e| conversion_error(10, e.to_string())))
        .transpose()?;

    Ok(PlanboardDocument {
        id: Some(row.get(0)?),
        document_type,
        sequence_number: row.get(2)?,
        origin_sequence_number: row.get(3)?,
        participant_domain: row.get(4)?,
        connection_group_id: row.get(5)?,
        period,
        prognosis_type,
        status,
        creation_time,
        expiration_time,
        ptus: Vec::new(),
    })
}
