// ==========================================
// 表格批量导入服务 - 导入层
// ==========================================
// 流程: 参考缓存 → 文件解析 → 阶段 1 校验 → 阶段 2 分块提交 → 汇总
// 支持: Excel (.xlsx/.xls/.ods), CSV
// ==========================================

// 模块声明
pub mod batch_committer;
pub mod data_cleaner;
pub mod derivation;
pub mod error;
pub mod file_parser;
pub mod import_trait;
pub mod orchestrator;
pub mod progress;
pub mod reference_cache;
pub mod row_validator;

// 重导出核心类型
pub use batch_committer::{BatchCommitter, CommitContext, CommitFailure, CommitFailureKind, CommitReport};
pub use data_cleaner::DataCleaner;
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, ParsedSheet, UniversalFileParser};
pub use orchestrator::ImportOrchestrator;
pub use progress::{progress_channel, ProgressEmitter};
pub use reference_cache::ReferenceCache;
pub use row_validator::{validator_for, AssignmentRowValidator, SalesRowValidator};

// 重导出 Trait 接口
pub use import_trait::{FileParser, RowValidator};
