// ==========================================
// 表格批量导入服务 - 导入 API
// ==========================================
// POST /api/import         multipart(kind, file) → SSE 进度流
// GET  /api/import/batches 最近的导入批次
// ==========================================
// 说明: 编排器在独立任务中运行；HTTP 层只负责把事件通道转为 SSE，
//       客户端断开只会让推送变为空操作
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::app::AppState;
use crate::config::ImportConfigReader;
use crate::domain::import::{ImportBatch, ImportJob};
use crate::domain::types::JobKind;
use crate::importer::progress_channel;
use axum::{
    extract::{multipart::Field, Multipart, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, info};

const DEFAULT_BATCH_LIMIT: usize = 20;
const MAX_BATCH_LIMIT: usize = 200;

/// 上传请求中解析出的内容
struct UploadForm {
    kind: JobKind,
    file_name: Option<String>,
    content: Vec<u8>,
}

/// 读取文件字段，超过上限立即拒绝
async fn read_limited(field: &mut Field<'_>, limit: usize) -> ApiResult<Vec<u8>> {
    let mut content = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?
    {
        if content.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge {
                size: content.len() + chunk.len(),
                limit,
            });
        }
        content.extend_from_slice(&chunk);
    }
    Ok(content)
}

async fn read_form(mut multipart: Multipart, limit: usize) -> ApiResult<UploadForm> {
    let mut kind: Option<JobKind> = None;
    let mut file: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("kind") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read kind: {}", e)))?;
                kind = Some(raw.parse().map_err(ApiError::BadRequest)?);
            }
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content = read_limited(&mut field, limit).await?;
                file = Some((file_name, content));
            }
            other => debug!(field = ?other, "忽略未知的表单字段"),
        }
    }

    let kind = kind.ok_or_else(|| ApiError::BadRequest("missing field: kind".to_string()))?;
    let (file_name, content) =
        file.ok_or_else(|| ApiError::BadRequest("missing field: file".to_string()))?;
    if content.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
    }

    Ok(UploadForm {
        kind,
        file_name,
        content,
    })
}

/// POST /api/import
///
/// 请求校验失败时返回 JSON 错误；否则立即返回 SSE 流，
/// 流以恰好一个 complete 或 error 事件结束
pub async fn start_import(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let settings = state.config.load_settings().await?;
    let form = read_form(multipart, settings.max_upload_bytes).await?;

    let job = ImportJob::new(form.kind, form.file_name, form.content);
    info!(
        job_id = %job.job_id,
        kind = %job.kind,
        file_name = ?job.file_name,
        size = job.content.len(),
        "收到导入请求"
    );

    let (emitter, mut rx) = progress_channel();
    let orchestrator = state.orchestrator(settings);
    tokio::spawn(async move {
        // 结果已通过事件送达
        let _ = orchestrator.run(job, emitter).await;
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            yield Ok::<_, Infallible>(Event::default().data(event.to_json()));
            if terminal {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub limit: Option<usize>,
}

/// GET /api/import/batches?limit=N
pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> ApiResult<Json<Vec<ImportBatch>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_BATCH_LIMIT)
        .clamp(1, MAX_BATCH_LIMIT);
    let batches = state.batches.recent(limit).await?;
    Ok(Json(batches))
}
