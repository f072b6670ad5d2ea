// ==========================================
// 表格批量导入服务 - 核心库
// ==========================================
// 技术栈: axum + tokio + rusqlite + calamine
// 系统定位: 表格批量导入（参考数据校验 + 分块并发落库 + SSE 实时进度）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 解析 / 校验 / 提交 / 编排
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - HTTP 路由
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

pub use api::build_router;
pub use app::AppState;
pub use domain::{ImportJob, ImportSummary, JobKind, ProgressEvent};
pub use importer::{ImportError, ImportOrchestrator};

// ==========================================
// 版本信息
// ==========================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "表格批量导入服务";
