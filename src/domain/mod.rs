// ==========================================
// 表格批量导入服务 - 领域模型层
// ==========================================
// 职责: 定义导入实体、参考数据、进度事件、类型
// 红线: 不含数据访问逻辑,不含流程编排逻辑
// ==========================================

pub mod import;
pub mod progress;
pub mod reference;
pub mod types;

// 重导出核心类型
pub use import::{
    DayEntry, ImportBatch, ImportJob, ImportSummary, RawRow, RecordKey, RowFailure,
    RowIdentity, RowOutcome, ValidatedRecord, YearSeries,
};
pub use progress::{ProgressEvent, RowData};
pub use reference::{normalize_key, Brand, Category, ReferenceSnapshot, Store};
pub use types::{CellValue, ImportState, JobKind, RowStatus};
