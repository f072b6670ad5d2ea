// ==========================================
// 表格批量导入服务 - 业务记录 Repository
// ==========================================
// 职责: 按自然键（实体 ID + 年份）插入或合并时间序列
// 红线: 单条记录的各年份写入在一个事务内完成
// ==========================================

use crate::domain::import::{RecordKey, ValidatedRecord, YearSeries};
use crate::domain::types::JobKind;
use crate::repository::connection::{AbortSignal, SharedConnection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction};

/// 一次 upsert 的结果（按年份计数）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
}

// ==========================================
// RecordRepository Trait
// ==========================================
// 用途: 阶段 2 的持久化能力
// 实现者: SqliteRecordRepository
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// 按自然键插入或合并
    ///
    /// # 参数
    /// - record: 已校验记录（可含多个年份）
    /// - batch_id: 导入批次 ID
    /// - abort: 块级中止信号（已置位时不执行写入）
    ///
    /// # 返回
    /// - Ok(UpsertOutcome): 新插入与合并更新的年份数
    /// - Err(RepositoryError::Aborted): 同块内已发生连接级故障，未写入
    /// - Err: 数据库错误（该记录整体回滚）
    async fn upsert_record(
        &self,
        record: &ValidatedRecord,
        batch_id: &str,
        abort: &AbortSignal,
    ) -> RepositoryResult<UpsertOutcome>;

    /// 读取某个自然键的已存时间序列
    async fn find_series(
        &self,
        kind: JobKind,
        key: RecordKey,
        year: i32,
    ) -> RepositoryResult<Option<YearSeries>>;

    /// 某类记录的总数
    async fn count_records(&self, kind: JobKind) -> RepositoryResult<usize>;
}

// ==========================================
// SqliteRecordRepository
// ==========================================
pub struct SqliteRecordRepository {
    conn: SharedConnection,
}

impl SqliteRecordRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn category_of(key: &RecordKey) -> RepositoryResult<i64> {
        key.category_id.ok_or_else(|| {
            RepositoryError::InternalError("store assignment record without category".to_string())
        })
    }

    fn select_payload(
        tx: &Transaction,
        kind: JobKind,
        key: &RecordKey,
        year: i32,
    ) -> RepositoryResult<Option<String>> {
        let payload = match kind {
            JobKind::Sales => tx
                .query_row(
                    "SELECT payload FROM sales_record WHERE store_id = ?1 AND brand_id = ?2 AND year = ?3",
                    params![key.store_id, key.brand_id, year],
                    |row| row.get(0),
                )
                .optional()?,
            JobKind::StoreAssignment => tx
                .query_row(
                    r#"
                    SELECT payload FROM store_assignment
                    WHERE store_id = ?1 AND brand_id = ?2 AND category_id = ?3 AND year = ?4
                    "#,
                    params![key.store_id, key.brand_id, Self::category_of(key)?, year],
                    |row| row.get(0),
                )
                .optional()?,
        };
        Ok(payload)
    }

    fn write_payload(
        tx: &Transaction,
        kind: JobKind,
        key: &RecordKey,
        year: i32,
        payload: &str,
        batch_id: &str,
        now: &str,
    ) -> RepositoryResult<()> {
        match kind {
            JobKind::Sales => {
                tx.execute(
                    r#"
                    INSERT INTO sales_record (
                        store_id, brand_id, year, payload, import_batch_id, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                    ON CONFLICT(store_id, brand_id, year) DO UPDATE SET
                        payload = excluded.payload,
                        import_batch_id = excluded.import_batch_id,
                        updated_at = excluded.updated_at
                    "#,
                    params![key.store_id, key.brand_id, year, payload, batch_id, now],
                )?;
            }
            JobKind::StoreAssignment => {
                let category_id = Self::category_of(key)?;
                tx.execute(
                    r#"
                    INSERT INTO store_assignment (
                        store_id, brand_id, category_id, year, payload, import_batch_id,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    ON CONFLICT(store_id, brand_id, category_id, year) DO UPDATE SET
                        payload = excluded.payload,
                        import_batch_id = excluded.import_batch_id,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        key.store_id,
                        key.brand_id,
                        category_id,
                        year,
                        payload,
                        batch_id,
                        now
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// 在事务中合并并写入一条记录
    fn upsert_tx(
        tx: &Transaction,
        record: &ValidatedRecord,
        batch_id: &str,
    ) -> RepositoryResult<UpsertOutcome> {
        let now = Utc::now().to_rfc3339();
        let mut outcome = UpsertOutcome::default();

        for (year, incoming) in &record.series {
            if incoming.is_empty() {
                continue;
            }
            let merged = match Self::select_payload(tx, record.kind, &record.key, *year)? {
                Some(stored) => {
                    let mut series: YearSeries = serde_json::from_str(&stored)?;
                    series.merge_from(incoming);
                    outcome.updated += 1;
                    series
                }
                None => {
                    outcome.inserted += 1;
                    incoming.clone()
                }
            };
            let payload = serde_json::to_string(&merged)?;
            Self::write_payload(tx, record.kind, &record.key, *year, &payload, batch_id, &now)?;
        }

        // 门店分配同时登记门店-品牌关联
        if record.kind == JobKind::StoreAssignment {
            tx.execute(
                "INSERT OR IGNORE INTO store_brand (store_id, brand_id) VALUES (?1, ?2)",
                params![record.key.store_id, record.key.brand_id],
            )?;
        }

        Ok(outcome)
    }
}

#[async_trait]
impl RecordRepository for SqliteRecordRepository {
    async fn upsert_record(
        &self,
        record: &ValidatedRecord,
        batch_id: &str,
        abort: &AbortSignal,
    ) -> RepositoryResult<UpsertOutcome> {
        let record = record.clone();
        let batch_id = batch_id.to_string();
        self.conn
            .run_abortable(abort, move |conn| {
                let tx = conn.transaction()?;
                let outcome = Self::upsert_tx(&tx, &record, &batch_id)?;
                tx.commit()?;
                Ok(outcome)
            })
            .await
    }

    async fn find_series(
        &self,
        kind: JobKind,
        key: RecordKey,
        year: i32,
    ) -> RepositoryResult<Option<YearSeries>> {
        self.conn
            .run(move |conn| {
                let tx = conn.transaction()?;
                let stored = Self::select_payload(&tx, kind, &key, year)?;
                tx.commit()?;
                match stored {
                    Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn count_records(&self, kind: JobKind) -> RepositoryResult<usize> {
        self.conn
            .run(move |conn| {
                let sql = match kind {
                    JobKind::Sales => "SELECT COUNT(*) FROM sales_record",
                    JobKind::StoreAssignment => "SELECT COUNT(*) FROM store_assignment",
                };
                let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use crate::domain::import::RowIdentity;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::collections::BTreeMap;

    fn seeded() -> SharedConnection {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO store (store_id, store_code) VALUES (1, 'S1');
            INSERT INTO brand (brand_id, brand_code) VALUES (10, 'B1');
            INSERT INTO category (category_id, category_code) VALUES (100, 'C1');
            INSERT INTO brand_category (brand_id, category_id) VALUES (10, 100);
            "#,
        )
        .unwrap();
        SharedConnection::from_connection(conn)
    }

    fn record(kind: JobKind, category_id: Option<i64>, entries: &[(u32, f64)]) -> ValidatedRecord {
        let mut year = YearSeries::default();
        for (day, value) in entries {
            year.insert(NaiveDate::from_ymd_opt(2024, 3, *day).unwrap(), "Sales", *value);
        }
        let mut series = BTreeMap::new();
        series.insert(2024, year);
        ValidatedRecord {
            kind,
            row_number: 3,
            sequence: 1,
            identity: RowIdentity::default(),
            key: RecordKey {
                store_id: 1,
                brand_id: 10,
                category_id,
            },
            series,
        }
    }

    #[tokio::test]
    async fn test_upsert_twice_merges_into_one_record() {
        let repo = SqliteRecordRepository::new(seeded());

        let first = repo
            .upsert_record(&record(JobKind::Sales, None, &[(1, 100.0), (2, 120.0)]), "b1", &AbortSignal::new())
            .await
            .unwrap();
        assert_eq!(first, UpsertOutcome { inserted: 1, updated: 0 });

        let second = repo
            .upsert_record(&record(JobKind::Sales, None, &[(1, 150.0)]), "b2", &AbortSignal::new())
            .await
            .unwrap();
        assert_eq!(second, UpsertOutcome { inserted: 0, updated: 1 });

        assert_eq!(repo.count_records(JobKind::Sales).await.unwrap(), 1);
        let key = RecordKey { store_id: 1, brand_id: 10, category_id: None };
        let stored = repo.find_series(JobKind::Sales, key, 2024).await.unwrap().unwrap();
        let march = &stored.months[&3];
        assert_eq!(march.len(), 2);
        assert_eq!(march[0].values["Sales"], 150.0);
        assert_eq!(march[1].values["Sales"], 120.0);
    }

    #[tokio::test]
    async fn test_assignment_registers_store_brand() {
        let conn = seeded();
        let repo = SqliteRecordRepository::new(conn.clone());
        repo.upsert_record(&record(JobKind::StoreAssignment, Some(100), &[(1, 5.0)]), "b1", &AbortSignal::new())
            .await
            .unwrap();

        let linked: i64 = conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM store_brand WHERE store_id = 1 AND brand_id = 10", [], |r| r.get(0))
            .unwrap();
        assert_eq!(linked, 1);
        assert_eq!(repo.count_records(JobKind::StoreAssignment).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_store_violates_foreign_key() {
        let repo = SqliteRecordRepository::new(seeded());
        let mut bad = record(JobKind::Sales, None, &[(1, 1.0)]);
        bad.key.store_id = 999;

        let err = repo.upsert_record(&bad, "b1", &AbortSignal::new()).await.unwrap_err();
        assert!(!err.is_connection_failure());
        assert_eq!(repo.count_records(JobKind::Sales).await.unwrap(), 0);
    }
}
