// ==========================================
// 表格批量导入服务 - 应用层
// ==========================================
// 职责: 组件装配，供 HTTP 服务与命令行工具共用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
