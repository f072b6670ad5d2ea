// ==========================================
// 表格批量导入服务 - API 层
// ==========================================
// 职责: HTTP 路由（axum），请求校验，SSE 推送
// ==========================================

pub mod error;
pub mod health;
pub mod import_api;

use crate::app::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

// 重导出核心类型
pub use error::{ApiError, ApiResult};

/// 构建路由
///
/// 上传大小由 import.max_upload_bytes 在读取时限制，
/// 因此导入路由关闭 axum 默认的请求体上限
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/import",
            post(import_api::start_import).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/import/batches", get(import_api::list_batches))
        .with_state(state)
}
