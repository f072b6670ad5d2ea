// ==========================================
// 表格批量导入服务 - 导入编排器
// ==========================================
// 状态机: Init → CacheReady → Parsing → Validating → Committing → Done
//         任意状态遇到致命错误 → Failed
// 终态: Done 恰好推送一次 complete；Failed 恰好推送一次 error
// ==========================================

use crate::config::ImportSettings;
use crate::domain::import::{ImportBatch, ImportJob, ImportSummary, RowOutcome, ValidatedRecord};
use crate::domain::progress::ProgressEvent;
use crate::domain::types::{ImportState, JobKind, RowStatus};
use crate::importer::batch_committer::{BatchCommitter, CommitContext};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::progress::ProgressEmitter;
use crate::importer::reference_cache::ReferenceCache;
use crate::importer::row_validator::validator_for;
use crate::repository::import_batch_repo::ImportBatchRepository;
use crate::repository::record_repo::RecordRepository;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// 状态跟踪（非法跳转视为内部错误）
// ==========================================
struct StateTracker {
    state: ImportState,
}

impl StateTracker {
    fn advance(&mut self, next: ImportState) -> ImportResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ImportError::Internal(format!(
                "illegal state transition {} -> {}",
                self.state, next
            )));
        }
        info!(from = %self.state, to = %next, "状态切换");
        self.state = next;
        Ok(())
    }
}

// ==========================================
// ImportOrchestrator
// ==========================================
pub struct ImportOrchestrator {
    cache: Arc<ReferenceCache>,
    records: Arc<dyn RecordRepository>,
    batches: Arc<dyn ImportBatchRepository>,
    settings: ImportSettings,
}

impl ImportOrchestrator {
    pub fn new(
        cache: Arc<ReferenceCache>,
        records: Arc<dyn RecordRepository>,
        batches: Arc<dyn ImportBatchRepository>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            cache,
            records,
            batches,
            settings: settings.normalized(),
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// 运行一次导入任务
    ///
    /// # 参数
    /// - job: 导入任务（含文件内容）
    /// - emitter: 进度推送端；函数返回时随之释放，接收端据此结束流
    ///
    /// # 返回
    /// - Ok(ImportSummary): 任务完成（已推送 complete）
    /// - Err(ImportError): 致命错误（已推送 error）
    #[instrument(skip_all, fields(job_id = %job.job_id, kind = %job.kind))]
    pub async fn run(&self, job: ImportJob, emitter: ProgressEmitter) -> ImportResult<ImportSummary> {
        let started = Instant::now();
        let mut tracker = StateTracker {
            state: ImportState::Init,
        };

        let result = self.execute(&job, &emitter, &mut tracker, started).await;
        match result {
            Ok(summary) => {
                tracker.advance(ImportState::Done)?;
                info!(
                    total_rows = summary.total_rows,
                    successful = summary.successful,
                    failed = summary.failed,
                    elapsed_ms = summary.processing_time,
                    "导入完成"
                );
                self.record_batch(&job, &summary).await;
                emitter.emit(ProgressEvent::Complete {
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Err(e) => {
                tracker.state = ImportState::Failed;
                error!(error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "导入失败");
                emitter.emit(ProgressEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job: &ImportJob,
        emitter: &ProgressEmitter,
        tracker: &mut StateTracker,
        started: Instant,
    ) -> ImportResult<ImportSummary> {
        // ===== 参考数据 =====
        emitter.emit(ProgressEvent::phase(
            ImportState::Init,
            "loading reference data",
        ));
        let snapshot = self.cache.get_or_build(self.settings.cache_ttl()).await?;
        tracker.advance(ImportState::CacheReady)?;
        let (stores, brands, categories, _, _) = snapshot.counts();
        emitter.emit(ProgressEvent::phase(
            ImportState::CacheReady,
            format!(
                "reference data ready ({} stores, {} brands, {} categories)",
                stores, brands, categories
            ),
        ));

        // ===== 解析 =====
        tracker.advance(ImportState::Parsing)?;
        if job.content.len() > self.settings.max_upload_bytes {
            return Err(ImportError::FileTooLarge {
                size: job.content.len(),
                limit: self.settings.max_upload_bytes,
            });
        }
        emitter.emit(ProgressEvent::phase(ImportState::Parsing, "parsing file"));
        let sheet = UniversalFileParser.parse(job.file_name.as_deref(), &job.content)?;
        let total_rows = sheet.rows.len();
        info!(range = %sheet.range, total_rows, "文件解析完成");

        // ===== 阶段 1：校验 =====
        tracker.advance(ImportState::Validating)?;
        emitter.emit(ProgressEvent::phase(
            ImportState::Validating,
            format!("validating {} rows", total_rows),
        ));

        let validator = validator_for(job.kind);
        let interval = self.settings.progress_interval_rows;
        let mut records: Vec<ValidatedRecord> = Vec::with_capacity(total_rows);
        let mut errors: Vec<(usize, String)> = Vec::new();

        for (idx, row) in sheet.rows.iter().enumerate() {
            let sequence = idx + 1;
            match validator.validate(row, &snapshot, sequence) {
                RowOutcome::Success(record) => records.push(record),
                RowOutcome::Failure(failure) => {
                    debug!(row = failure.row_number, reason = %failure.reason, "行校验失败");
                    emitter.emit(ProgressEvent::row(
                        sequence,
                        total_rows,
                        failure.identity.clone(),
                        RowStatus::Error,
                        failure.reason.clone(),
                    ));
                    errors.push((sequence, failure.message()));
                }
            }
            if sequence % interval == 0 || sequence == total_rows {
                emitter.emit(ProgressEvent::RowProgress {
                    current_row: sequence,
                    total_rows,
                    row_data: None,
                });
            }
        }
        let validation_failed = errors.len();
        info!(
            valid = records.len(),
            invalid = validation_failed,
            "校验阶段完成"
        );

        // ===== 阶段 2：提交 =====
        tracker.advance(ImportState::Committing)?;
        let committer = BatchCommitter::new(Arc::clone(&self.records), self.settings.chunk_size);
        emitter.emit(ProgressEvent::phase(
            ImportState::Committing,
            format!(
                "committing {} records in chunks of {}",
                records.len(),
                committer.chunk_size()
            ),
        ));
        let ctx = CommitContext {
            batch_id: &job.job_id,
            total_rows,
            emitter,
            stop_on_disconnect: self.settings.stop_on_disconnect,
        };
        let report = committer.commit(&records, &ctx).await;

        errors.extend(report.failures.iter().map(|f| (f.sequence, f.message())));
        errors.sort_by_key(|(sequence, _)| *sequence);

        // 门店分配会新增门店-品牌关联，后续任务需重新加载
        if job.kind == JobKind::StoreAssignment && report.successful > 0 {
            self.cache.invalidate().await;
        }

        Ok(ImportSummary {
            total_rows,
            successful: report.successful,
            failed: validation_failed + report.failed(),
            errors: errors.into_iter().map(|(_, message)| message).collect(),
            processing_time: started.elapsed().as_millis() as u64,
        })
    }

    /// 写入批次审计记录（失败不影响任务结果）
    async fn record_batch(&self, job: &ImportJob, summary: &ImportSummary) {
        let batch = ImportBatch::from_summary(job, summary);
        if let Err(e) = self.batches.insert_batch(&batch).await {
            warn!(error = %e, "导入批次记录写入失败");
        }
    }
}
