// ==========================================
// 表格批量导入服务 - 分块并发提交（阶段 2）
// ==========================================
// 算法:
//   1) 已校验记录按 chunk_size 切分为连续块
//   2) 块内每条记录一个 upsert，全部并发执行
//   3) 整块完成后才开始下一块（在途写入 ≤ chunk_size）
// 失败隔离:
//   - 单条写入失败：仅该记录失败，块内其余照常完成
//   - 连接级故障：置位块级中止信号，块内尚未拿到连接的写入直接跳过；
//     已执行的写入按真实结果计数，全部返回后继续下一块
// 进度: 每条记录的写入真正返回后才推送对应事件
// ==========================================

use crate::domain::import::{RowIdentity, ValidatedRecord};
use crate::domain::progress::ProgressEvent;
use crate::domain::types::RowStatus;
use crate::importer::progress::ProgressEmitter;
use crate::repository::connection::AbortSignal;
use crate::repository::record_repo::{RecordRepository, UpsertOutcome};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CANCELLED_REASON: &str = "import cancelled before commit";

// ==========================================
// CommitFailure - 阶段 2 失败（值，不是错误）
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum CommitFailureKind {
    /// 单条写入失败
    Write(String),
    /// 连接级故障（本条失败或因同块故障被跳过）
    ChunkAborted(String),
    /// 调用方断开后未调度
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitFailure {
    pub row_number: usize,
    pub sequence: usize,
    pub identity: RowIdentity,
    pub kind: CommitFailureKind,
}

impl CommitFailure {
    fn of(record: &ValidatedRecord, kind: CommitFailureKind) -> Self {
        Self {
            row_number: record.row_number,
            sequence: record.sequence,
            identity: record.identity.clone(),
            kind,
        }
    }

    pub fn reason(&self) -> String {
        match &self.kind {
            CommitFailureKind::Write(e) => format!("commit failed: {}", e),
            CommitFailureKind::ChunkAborted(e) => format!("commit aborted for chunk: {}", e),
            CommitFailureKind::Cancelled => CANCELLED_REASON.to_string(),
        }
    }

    /// 汇总中使用的错误描述（与校验失败同格式）
    pub fn message(&self) -> String {
        format!("Row {} ({}): {}", self.row_number, self.identity, self.reason())
    }
}

/// 阶段 2 结果
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    pub successful: usize,
    pub failures: Vec<CommitFailure>, // 按行序排列
}

impl CommitReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// 一次提交的上下文
pub struct CommitContext<'a> {
    pub batch_id: &'a str,
    pub total_rows: usize,
    pub emitter: &'a ProgressEmitter,
    pub stop_on_disconnect: bool,
}

// ==========================================
// BatchCommitter
// ==========================================
pub struct BatchCommitter {
    repo: Arc<dyn RecordRepository>,
    chunk_size: usize,
}

impl BatchCommitter {
    /// # 参数
    /// - repo: 持久化能力
    /// - chunk_size: 每块记录数（0 按 1 处理）
    pub fn new(repo: Arc<dyn RecordRepository>, chunk_size: usize) -> Self {
        Self {
            repo,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 提交全部记录
    ///
    /// # 返回
    /// - CommitReport: 成功数 + 失败列表（successful + failed == records.len()）
    pub async fn commit(&self, records: &[ValidatedRecord], ctx: &CommitContext<'_>) -> CommitReport {
        let mut report = CommitReport::default();
        let chunk_count = records.len().div_ceil(self.chunk_size);

        for (chunk_index, chunk) in records.chunks(self.chunk_size).enumerate() {
            if ctx.stop_on_disconnect && ctx.emitter.is_detached() {
                let remaining = &records[chunk_index * self.chunk_size..];
                warn!(
                    chunk_index,
                    remaining = remaining.len(),
                    "调用方已断开，停止调度剩余块"
                );
                report.failures.extend(
                    remaining
                        .iter()
                        .map(|r| CommitFailure::of(r, CommitFailureKind::Cancelled)),
                );
                break;
            }

            debug!(chunk_index, chunk_count, size = chunk.len(), "提交块开始");
            self.commit_chunk(chunk_index, chunk, ctx, &mut report).await;
        }

        report.failures.sort_by_key(|f| f.sequence);
        info!(
            successful = report.successful,
            failed = report.failed(),
            chunk_count,
            "提交阶段完成"
        );
        report
    }

    async fn commit_chunk(
        &self,
        chunk_index: usize,
        chunk: &[ValidatedRecord],
        ctx: &CommitContext<'_>,
        report: &mut CommitReport,
    ) {
        let abort = AbortSignal::new();
        let mut in_flight: FuturesUnordered<_> = chunk
            .iter()
            .map(|record| {
                let repo = Arc::clone(&self.repo);
                let abort = &abort;
                async move {
                    let result = repo.upsert_record(record, ctx.batch_id, abort).await;
                    (record, result)
                }
            })
            .collect();

        // 必须等到块内每个写入都返回，下一块才能开始
        let mut aborted = 0usize;
        while let Some((record, result)) = in_flight.next().await {
            match result {
                Ok(outcome) => {
                    report.successful += 1;
                    ctx.emitter.emit(ProgressEvent::row(
                        record.sequence,
                        ctx.total_rows,
                        record.identity.clone(),
                        RowStatus::Success,
                        success_message(&outcome),
                    ));
                }
                Err(e) => {
                    let kind = if e.is_chunk_abort() {
                        abort.trigger();
                        aborted += 1;
                        CommitFailureKind::ChunkAborted(e.to_string())
                    } else {
                        CommitFailureKind::Write(e.to_string())
                    };
                    warn!(
                        chunk_index,
                        row = record.row_number,
                        identity = %record.identity,
                        error = %e,
                        "记录提交失败"
                    );
                    let failure = CommitFailure::of(record, kind);
                    ctx.emitter.emit(ProgressEvent::row(
                        record.sequence,
                        ctx.total_rows,
                        record.identity.clone(),
                        RowStatus::Error,
                        failure.reason(),
                    ));
                    report.failures.push(failure);
                }
            }
        }

        if abort.is_triggered() {
            warn!(chunk_index, aborted, size = chunk.len(), "连接级故障，块内后续写入已跳过");
        }
    }
}

fn success_message(outcome: &UpsertOutcome) -> String {
    if outcome.updated > 0 {
        "imported (merged into existing record)".to_string()
    } else {
        "imported".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::{RecordKey, YearSeries};
    use crate::domain::types::JobKind;
    use crate::importer::progress::progress_channel;
    use crate::repository::error::{RepositoryError, RepositoryResult};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn records(n: usize) -> Vec<ValidatedRecord> {
        (1..=n)
            .map(|i| ValidatedRecord {
                kind: JobKind::Sales,
                row_number: i + 2,
                sequence: i,
                identity: RowIdentity {
                    store_code: Some(format!("S{}", i)),
                    ..Default::default()
                },
                key: RecordKey {
                    store_id: i as i64,
                    brand_id: 1,
                    category_id: None,
                },
                series: BTreeMap::from([(2024, YearSeries::default())]),
            })
            .collect()
    }

    struct MockRepo {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_with_write: HashSet<usize>,
        fail_with_connection: HashSet<usize>,
        delay_ms: fn(usize) -> u64,
        completed: Mutex<Vec<usize>>,
        receiver_to_drop: Mutex<Option<UnboundedReceiver<ProgressEvent>>>,
    }

    impl Default for MockRepo {
        fn default() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_with_write: HashSet::new(),
                fail_with_connection: HashSet::new(),
                delay_ms: |_| 5,
                completed: Mutex::new(Vec::new()),
                receiver_to_drop: Mutex::new(None),
            }
        }
    }

    impl MockRepo {
        fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl RecordRepository for MockRepo {
        async fn upsert_record(
            &self,
            record: &ValidatedRecord,
            _batch_id: &str,
            abort: &AbortSignal,
        ) -> RepositoryResult<UpsertOutcome> {
            self.receiver_to_drop.lock().unwrap().take();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis((self.delay_ms)(record.sequence))).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            // 延迟结束相当于拿到连接
            if abort.is_triggered() {
                return Err(RepositoryError::Aborted);
            }
            self.completed.lock().unwrap().push(record.sequence);

            if self.fail_with_write.contains(&record.sequence) {
                return Err(RepositoryError::ForeignKeyViolation("FOREIGN KEY constraint failed".into()));
            }
            if self.fail_with_connection.contains(&record.sequence) {
                return Err(RepositoryError::DatabaseConnectionError("disk I/O error".into()));
            }
            Ok(UpsertOutcome {
                inserted: 1,
                updated: 0,
            })
        }

        async fn find_series(
            &self,
            _kind: JobKind,
            _key: RecordKey,
            _year: i32,
        ) -> RepositoryResult<Option<YearSeries>> {
            Ok(None)
        }

        async fn count_records(&self, _kind: JobKind) -> RepositoryResult<usize> {
            Ok(0)
        }
    }

    fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_in_flight_writes_never_exceed_chunk_size() {
        let repo = Arc::new(MockRepo::new());
        let committer = BatchCommitter::new(repo.clone(), 4);
        let (emitter, _rx) = progress_channel();
        let ctx = CommitContext {
            batch_id: "b",
            total_rows: 10,
            emitter: &emitter,
            stop_on_disconnect: false,
        };

        let report = committer.commit(&records(10), &ctx).await;

        assert_eq!(report.successful, 10);
        assert_eq!(report.failed(), 0);
        assert_eq!(repo.max_in_flight.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_write_failure_is_isolated_per_record() {
        let repo = Arc::new(MockRepo {
            fail_with_write: HashSet::from([2]),
            ..MockRepo::new()
        });
        let committer = BatchCommitter::new(repo, 3);
        let (emitter, mut rx) = progress_channel();
        let ctx = CommitContext {
            batch_id: "b",
            total_rows: 5,
            emitter: &emitter,
            stop_on_disconnect: false,
        };

        let report = committer.commit(&records(5), &ctx).await;

        assert_eq!(report.successful, 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].sequence, 2);
        assert!(report.failures[0]
            .message()
            .starts_with("Row 4 (store=S2): commit failed"));
        assert_eq!(drain(&mut rx).len(), 5);
    }

    #[tokio::test]
    async fn test_connection_failure_skips_rest_of_chunk_only() {
        // 块 1 = [1,2,3]：记录 1 最先完成且连接失败，2 和 3 之后才拿到连接
        let repo = Arc::new(MockRepo {
            fail_with_connection: HashSet::from([1]),
            delay_ms: |seq| if seq == 1 { 1 } else { 50 },
            ..Default::default()
        });
        let committer = BatchCommitter::new(repo.clone(), 3);
        let (emitter, _rx) = progress_channel();
        let ctx = CommitContext {
            batch_id: "b",
            total_rows: 5,
            emitter: &emitter,
            stop_on_disconnect: false,
        };

        let report = committer.commit(&records(5), &ctx).await;

        assert_eq!(report.successful, 2);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.sequence).collect();
        assert_eq!(failed, vec![1, 2, 3]);
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f.kind, CommitFailureKind::ChunkAborted(_))));
        // 被跳过的写入也要等它返回，块 2 才开始
        assert_eq!(repo.max_in_flight.load(Ordering::SeqCst), 3);
        let reached = repo.completed.lock().unwrap().clone();
        assert!(!reached.contains(&2) && !reached.contains(&3), "{:?}", reached);
        assert_eq!(reached.len(), 3);
    }

    #[tokio::test]
    async fn test_writes_finished_before_connection_failure_count_as_success() {
        // 记录 2 在记录 1 失败前已写完：按真实结果计为成功
        let repo = Arc::new(MockRepo {
            fail_with_connection: HashSet::from([1]),
            delay_ms: |seq| match seq {
                2 => 1,
                1 => 20,
                _ => 60,
            },
            ..Default::default()
        });
        let committer = BatchCommitter::new(repo, 3);
        let (emitter, _rx) = progress_channel();
        let ctx = CommitContext {
            batch_id: "b",
            total_rows: 3,
            emitter: &emitter,
            stop_on_disconnect: false,
        };

        let report = committer.commit(&records(3), &ctx).await;

        assert_eq!(report.successful, 1);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.sequence).collect();
        assert_eq!(failed, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_success_events_follow_write_completion_order() {
        // 序号越小写入越慢：完成顺序与提交顺序相反
        let repo = Arc::new(MockRepo {
            delay_ms: |seq| (5 - seq as u64) * 10,
            ..Default::default()
        });
        let committer = BatchCommitter::new(repo.clone(), 4);
        let (emitter, mut rx) = progress_channel();
        let ctx = CommitContext {
            batch_id: "b",
            total_rows: 4,
            emitter: &emitter,
            stop_on_disconnect: false,
        };

        committer.commit(&records(4), &ctx).await;

        let emitted: Vec<usize> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::RowProgress { current_row, .. } => Some(current_row),
                _ => None,
            })
            .collect();
        assert_eq!(emitted, vec![4, 3, 2, 1]);
        assert_eq!(emitted, *repo.completed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_stop_on_disconnect_finishes_in_flight_chunk() {
        let (emitter, rx) = progress_channel();
        let repo = Arc::new(MockRepo::new());
        // 第一次写入时调用方断开
        *repo.receiver_to_drop.lock().unwrap() = Some(rx);
        let committer = BatchCommitter::new(repo, 2);
        let ctx = CommitContext {
            batch_id: "b",
            total_rows: 5,
            emitter: &emitter,
            stop_on_disconnect: true,
        };

        let report = committer.commit(&records(5), &ctx).await;

        assert_eq!(report.successful, 2);
        assert_eq!(report.failed(), 3);
        assert!(report
            .failures
            .iter()
            .all(|f| f.kind == CommitFailureKind::Cancelled));
        assert!(report.failures[0].message().ends_with(CANCELLED_REASON));
    }

    #[tokio::test]
    async fn test_disconnect_without_stop_flag_commits_everything() {
        let (emitter, rx) = progress_channel();
        drop(rx);
        let committer = BatchCommitter::new(Arc::new(MockRepo::new()), 2);
        let ctx = CommitContext {
            batch_id: "b",
            total_rows: 5,
            emitter: &emitter,
            stop_on_disconnect: false,
        };

        let report = committer.commit(&records(5), &ctx).await;
        assert_eq!(report.successful, 5);
    }
}
