// ==========================================
// 表格批量导入服务 - 共享 SQLite 连接
// ==========================================
// rusqlite 为同步 API：异步仓储方法通过 spawn_blocking 执行，
// 避免阻塞 tokio 工作线程
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// AbortSignal - 块级中止信号
// ==========================================
// 同一块内任一写入遇到连接级故障后置位；
// 之后才拿到连接的写入不再访问数据库，直接返回 Aborted
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<Connection>>,
}

impl SharedConnection {
    /// 打开数据库文件并建表
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// 包装已有连接（调用方负责 PRAGMA 与建表）
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// 同步获取连接
    pub fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.inner
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在阻塞线程池中执行数据库操作
    pub async fn run<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RepositoryResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut conn = inner
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            f(&mut conn)
        })
        .await?
    }

    /// 可中止的写入：持有连接后先检查信号，连接级故障时置位信号
    ///
    /// 检查与置位都在持锁期间完成，排队中的写入一定能看到先前的故障
    pub async fn run_abortable<T, F>(&self, abort: &AbortSignal, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RepositoryResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let abort = abort.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = match inner.lock() {
                Ok(conn) => conn,
                Err(e) => {
                    abort.trigger();
                    return Err(RepositoryError::LockError(e.to_string()));
                }
            };
            if abort.is_triggered() {
                return Err(RepositoryError::Aborted);
            }
            let result = f(&mut conn);
            if matches!(&result, Err(e) if e.is_connection_failure()) {
                abort.trigger();
            }
            result
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn shared() -> SharedConnection {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        SharedConnection::from_connection(conn)
    }

    #[tokio::test]
    async fn test_triggered_signal_skips_the_write() {
        let conn = shared();
        let abort = AbortSignal::new();
        abort.trigger();

        let err = conn
            .run_abortable(&abort, |conn| {
                conn.execute("INSERT INTO store (store_id, store_code) VALUES (1, 'S1')", [])?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Aborted));

        let count: i64 = conn
            .run(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM store", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_connection_failure_triggers_signal() {
        let conn = shared();
        let abort = AbortSignal::new();

        let err = conn
            .run_abortable(&abort, |_| -> RepositoryResult<()> {
                Err(RepositoryError::DatabaseConnectionError("database is locked".into()))
            })
            .await
            .unwrap_err();
        assert!(err.is_connection_failure());
        assert!(abort.is_triggered());
    }

    #[tokio::test]
    async fn test_statement_failure_leaves_signal_clear() {
        let conn = shared();
        let abort = AbortSignal::new();

        let _ = conn
            .run_abortable(&abort, |_| -> RepositoryResult<()> {
                Err(RepositoryError::ForeignKeyViolation("FOREIGN KEY constraint failed".into()))
            })
            .await;
        assert!(!abort.is_triggered());
    }
}
