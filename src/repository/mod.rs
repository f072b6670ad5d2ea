// ==========================================
// 表格批量导入服务 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod connection;
pub mod error;
pub mod import_batch_repo;
pub mod record_repo;
pub mod reference_repo;

// 重导出核心仓储
pub use connection::{AbortSignal, SharedConnection};
pub use error::{RepositoryError, RepositoryResult};
pub use import_batch_repo::{ImportBatchRepository, SqliteImportBatchRepository};
pub use record_repo::{RecordRepository, SqliteRecordRepository, UpsertOutcome};
pub use reference_repo::{ReferenceRepository, SqliteReferenceRepository};
