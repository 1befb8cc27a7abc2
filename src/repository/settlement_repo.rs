// ==========================================
// 能源灵活性市场 Planboard - 结算仓储
// ==========================================
// 职责: flex_order_settlement + ptu_settlement
// 红线: 同一日期重算结算为覆盖写入，不追加
// ==========================================

use crate::db::DATE_FORMAT;
use crate::domain::settlement::{FlexOrderSettlement, PtuSettlement};
use crate::domain::types::SettlementVerdict;
use crate::repository::error::{conversion_error, RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub struct SettlementRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SettlementRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 覆盖写入某日期的全部结算（单事务）
    ///
    /// # 返回
    /// - `Ok(count)`: 写入的订单结算数
    pub fn replace_for_period(
        &self,
        period: NaiveDate,
        settlements: &[FlexOrderSettlement],
    ) -> RepositoryResult<usize> {
        if let Some(other) = settlements.iter().find(|s| s.period != period) {
            return Err(RepositoryError::FieldValueError {
                field: "period".to_string(),
                message: format!(
                    "订单 {} 的结算日期 {} 与写入日期 {} 不一致",
                    other.order_sequence, other.period, period
                ),
            });
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let period_str = period.format(DATE_FORMAT).to_string();

        tx.execute(
            "DELETE FROM flex_order_settlement WHERE period = ?1",
            params![&period_str],
        )?;

        {
            let mut header = tx.prepare(
                r#"INSERT INTO flex_order_settlement (
                    order_sequence, participant_domain, connection_group_id,
                    period, prognosis_sequence, verdict
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            )?;
            let mut detail = tx.prepare(
                r#"INSERT INTO ptu_settlement (
                    settlement_id, ptu_index, actual_power, prognosis_power,
                    ordered_flex_power, delivered_flex_power, power_deficiency,
                    price, penalty, net_settlement
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            )?;

            for settlement in settlements {
                header.execute(params![
                    settlement.order_sequence,
                    &settlement.participant_domain,
                    &settlement.connection_group_id,
                    &period_str,
                    settlement.prognosis_sequence,
                    settlement.verdict.map(|v| v.to_db_str()),
                ])?;
                let settlement_id = tx.last_insert_rowid();

                for ptu in &settlement.ptus {
                    detail.execute(params![
                        settlement_id,
                        ptu.ptu_index,
                        ptu.actual_power,
                        ptu.prognosis_power,
                        ptu.ordered_flex_power,
                        ptu.delivered_flex_power,
                        ptu.power_deficiency,
                        ptu.price.to_string(),
                        ptu.penalty.to_string(),
                        ptu.net_settlement.to_string(),
                    ])?;
                }
            }
        }

        tx.commit()?;
        Ok(settlements.len())
    }

    /// 按订单查询结算
    pub fn find_by_order(
        &self,
        order_sequence: i64,
        participant_domain: &str,
    ) -> RepositoryResult<Option<FlexOrderSettlement>> {
        let conn = self.get_conn()?;
        let settlements = query_settlements(
            &conn,
            r#"SELECT id, order_sequence, participant_domain, connection_group_id,
                      period, prognosis_sequence, verdict
               FROM flex_order_settlement
               WHERE order_sequence = ?1 AND participant_domain = ?2"#,
            params![order_sequence, participant_domain],
        )?;
        Ok(settlements.into_iter().next())
    }

    /// 某日期全部结算
    pub fn find_by_period(&self, period: NaiveDate) -> RepositoryResult<Vec<FlexOrderSettlement>> {
        let conn = self.get_conn()?;
        query_settlements(
            &conn,
            r#"SELECT id, order_sequence, participant_domain, connection_group_id,
                      period, prognosis_sequence, verdict
               FROM flex_order_settlement
               WHERE period = ?1
               ORDER BY connection_group_id ASC, participant_domain ASC, order_sequence DESC"#,
            params![period.format(DATE_FORMAT).to_string()],
        )
    }

    /// 标注确认/争议结论
    pub fn mark_verdict(
        &self,
        order_sequence: i64,
        participant_domain: &str,
        verdict: SettlementVerdict,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"UPDATE flex_order_settlement SET verdict = ?1
               WHERE order_sequence = ?2 AND participant_domain = ?3"#,
            params![verdict.to_db_str(), order_sequence, participant_domain],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "FlexOrderSettlement".to_string(),
                id: format!("{}@{}", order_sequence, participant_domain),
            });
        }
        Ok(())
    }

    /// 删除指定日期之前的结算（PTU 明细级联删除）
    pub fn delete_periods_before(&self, horizon: NaiveDate) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM flex_order_settlement WHERE period < ?1",
            params![horizon.format(DATE_FORMAT).to_string()],
        )?;
        Ok(deleted)
    }
}

fn query_settlements<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> RepositoryResult<Vec<FlexOrderSettlement>> {
    let mut stmt = conn.prepare(sql)?;
    let headers = stmt
        .query_map(params, |row| {
            let period: String = row.get(4)?;
            let period = NaiveDate::parse_from_str(&period, DATE_FORMAT)
                .map_err(|e| conversion_error(4, e.to_string()))?;
            let verdict: Option<String> = row.get(6)?;
            let verdict = verdict
                .map(|v| {
                    SettlementVerdict::from_str(&v)
                        .ok_or_else(|| conversion_error(6, format!("未知结论: {}", v)))
                })
                .transpose()?;
            Ok((
                row.get::<_, i64>(0)?,
                FlexOrderSettlement {
                    order_sequence: row.get(1)?,
                    participant_domain: row.get(2)?,
                    connection_group_id: row.get(3)?,
                    period,
                    prognosis_sequence: row.get(5)?,
                    verdict,
                    ptus: Vec::new(),
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut settlements = Vec::with_capacity(headers.len());
    for (id, mut settlement) in headers {
        settlement.ptus = load_ptu_settlements(conn, id)?;
        settlements.push(settlement);
    }
    Ok(settlements)
}

fn load_ptu_settlements(conn: &Connection, settlement_id: i64) -> RepositoryResult<Vec<PtuSettlement>> {
    let mut stmt = conn.prepare(
        r#"SELECT ptu_index, actual_power, prognosis_power, ordered_flex_power,
                  delivered_flex_power, power_deficiency, price, penalty, net_settlement
           FROM ptu_settlement
           WHERE settlement_id = ?1
           ORDER BY ptu_index ASC"#,
    )?;

    let decimal_at = |row: &rusqlite::Row, idx: usize| -> rusqlite::Result<Decimal> {
        let raw: String = row.get(idx)?;
        Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e.to_string()))
    };

    let ptus = stmt
        .query_map(params![settlement_id], |row| {
            Ok(PtuSettlement {
                ptu_index: row.get(0)?,
                actual_power: row.get(1)?,
                prognosis_power: row.get(2)?,
                ordered_flex_power: row.get(3)?,
                delivered_flex_power: row.get(4)?,
                power_deficiency: row.get(5)?,
                price: decimal_at(row, 6)?,
                penalty: decimal_at(row, 7)?,
                net_settlement: decimal_at(row, 8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ptus)
}
