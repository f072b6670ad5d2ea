// ==========================================
// 表格批量导入服务 - 导入批次 Repository
// ==========================================
// 职责: 导入批次审计记录的写入与查询
// ==========================================

use crate::domain::import::ImportBatch;
use crate::domain::types::JobKind;
use crate::repository::connection::SharedConnection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;

#[async_trait]
pub trait ImportBatchRepository: Send + Sync {
    /// 写入一条批次记录
    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()>;

    /// 最近的批次（按导入时间倒序）
    async fn recent(&self, limit: usize) -> RepositoryResult<Vec<ImportBatch>>;
}

pub struct SqliteImportBatchRepository {
    conn: SharedConnection,
}

impl SqliteImportBatchRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ImportBatchRepository for SqliteImportBatchRepository {
    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let batch = batch.clone();
        self.conn
            .run(move |conn| {
                let errors_json = serde_json::to_string(&batch.errors)?;
                conn.execute(
                    r#"
                    INSERT INTO import_batch (
                        batch_id, job_kind, file_name, total_rows, success_rows,
                        failed_rows, elapsed_ms, imported_at, errors_json
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                    params![
                        batch.batch_id,
                        batch.kind.as_str(),
                        batch.file_name,
                        batch.total_rows,
                        batch.success_rows,
                        batch.failed_rows,
                        batch.elapsed_ms,
                        batch.imported_at.to_rfc3339(),
                        errors_json,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn recent(&self, limit: usize) -> RepositoryResult<Vec<ImportBatch>> {
        self.conn
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT batch_id, job_kind, file_name, total_rows, success_rows,
                           failed_rows, elapsed_ms, imported_at, errors_json
                    FROM import_batch
                    ORDER BY imported_at DESC
                    LIMIT ?1
                    "#,
                )?;
                let raw = stmt
                    .query_map(params![limit as i64], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, String>(7)?,
                            row.get::<_, String>(8)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                raw.into_iter()
                    .map(
                        |(batch_id, kind, file_name, total, success, failed, elapsed, at, errors)| {
                            let kind: JobKind = kind.parse().map_err(|e: String| {
                                RepositoryError::SerializationError(e)
                            })?;
                            let imported_at = DateTime::parse_from_rfc3339(&at)
                                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?
                                .with_timezone(&Utc);
                            Ok(ImportBatch {
                                batch_id,
                                kind,
                                file_name,
                                total_rows: total,
                                success_rows: success,
                                failed_rows: failed,
                                elapsed_ms: elapsed,
                                imported_at,
                                errors: serde_json::from_str(&errors)?,
                            })
                        },
                    )
                    .collect()
            })
            .await
    }
}
