// ==========================================
// 表格批量导入服务 - 健康检查
// ==========================================

use crate::api::error::ApiResult;
use crate::app::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let schema_version = state
        .conn
        .run(|conn| Ok(crate::db::read_schema_version(conn)?))
        .await?;

    Ok(Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "schemaVersion": schema_version,
        "referenceCacheBuilt": state.cache.is_built().await,
    })))
}
