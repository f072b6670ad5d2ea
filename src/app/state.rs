// ==========================================
// 表格批量导入服务 - 应用状态
// ==========================================
// 职责: 管理进程级共享资源（连接、仓储、参考缓存、配置）
// ==========================================

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ConfigManager, ImportSettings};
use crate::importer::{ImportOrchestrator, ReferenceCache};
use crate::repository::{
    ImportBatchRepository, RecordRepository, RepositoryResult, SharedConnection,
    SqliteImportBatchRepository, SqliteRecordRepository, SqliteReferenceRepository,
};

/// 应用状态
///
/// 由 axum 在各请求间克隆共享；参考缓存跨请求复用
#[derive(Clone)]
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub conn: SharedConnection,

    /// 配置管理器
    pub config: Arc<ConfigManager>,

    /// 参考数据缓存（构建或复用）
    pub cache: Arc<ReferenceCache>,

    pub records: Arc<dyn RecordRepository>,

    /// 导入批次审计
    pub batches: Arc<dyn ImportBatchRepository>,
}

impl AppState {
    /// 打开数据库并装配全部组件
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（不存在时创建并建表）
    ///
    /// 导入参数（含缓存有效期）在每次请求时重新读取，这里不做缓存
    pub async fn open(db_path: &str) -> RepositoryResult<Self> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);
        let conn = SharedConnection::open(db_path)?;
        Ok(Self::assemble(db_path.to_string(), conn))
    }

    /// 以已有连接装配（调用方负责建表；db_path 留空）
    pub fn from_connection(conn: SharedConnection) -> Self {
        Self::assemble(String::new(), conn)
    }

    fn assemble(db_path: String, conn: SharedConnection) -> Self {
        let cache = ReferenceCache::new(Arc::new(SqliteReferenceRepository::new(conn.clone())));
        Self {
            db_path,
            config: Arc::new(ConfigManager::new(conn.clone())),
            cache: Arc::new(cache),
            records: Arc::new(SqliteRecordRepository::new(conn.clone())),
            batches: Arc::new(SqliteImportBatchRepository::new(conn.clone())),
            conn,
        }
    }

    /// 以本次请求的参数创建编排器
    pub fn orchestrator(&self, settings: ImportSettings) -> ImportOrchestrator {
        ImportOrchestrator::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.records),
            Arc::clone(&self.batches),
            settings,
        )
    }
}

/// 默认数据库路径
///
/// 优先使用环境变量 SHEET_IMPORT_DB，否则放在用户数据目录下
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("SHEET_IMPORT_DB") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./sheet_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("sheet-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("sheet_import.db");
        }
    }

    path.to_string_lossy().to_string()
}
