// ==========================================
// HTTP API 集成测试
// ==========================================
// 测试目标: multipart 上传 → SSE 帧；错误响应格式；健康检查；批次查询
// ==========================================


use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sheet_import::build_router;
use sheet_import::config::config_keys;
use test_helpers::{create_test_db, open_state};
use tower::ServiceExt;

const BOUNDARY: &str = "sheet-import-test-boundary";

const SALES_CSV: &str = "Store Code,Brand Code,01-03-2024\n,,Sales\nS1,B1,120\nS9,B1,5\n";

/// 手工拼装 multipart 请求体
fn multipart_body(kind: Option<&str>, file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(kind) = kind {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"kind\"\r\n\r\n{}\r\n",
                BOUNDARY, kind
            )
            .as_bytes(),
        );
    }
    if let Some((name, content)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn import_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/import")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_text(router: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// 拆出所有 data: 帧的 JSON
fn parse_frames(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|frame| frame.trim().strip_prefix("data:"))
        .map(|json| serde_json::from_str(json.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_upload_streams_progress_then_complete() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = open_state(&db_path).await;
    let router = build_router(state);

    let body = multipart_body(Some("sales"), Some(("sales.csv", SALES_CSV.as_bytes())));
    let (status, text) = body_text(router, import_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    let frames = parse_frames(&text);
    assert!(frames.len() >= 3, "{}", text);

    let last = frames.last().unwrap();
    assert_eq!(last["type"], "complete");
    assert_eq!(last["summary"]["totalRows"], 2);
    assert_eq!(last["summary"]["successful"], 1);
    assert_eq!(last["summary"]["failed"], 1);
    assert!(last["summary"]["processingTime"].is_u64());

    let terminal = frames
        .iter()
        .filter(|f| f["type"] == "complete" || f["type"] == "error")
        .count();
    assert_eq!(terminal, 1);

    let row_frames: Vec<&Value> = frames.iter().filter(|f| f.get("rowData").is_some()).collect();
    assert!(row_frames
        .iter()
        .any(|f| f["rowData"]["status"] == "success" && f["rowData"]["storeCode"] == "S1"));
    assert!(row_frames
        .iter()
        .any(|f| f["rowData"]["status"] == "error" && f["rowData"]["storeCode"] == "S9"));
}

#[tokio::test]
async fn test_unsupported_file_type_streams_error_event() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = open_state(&db_path).await;
    let router = build_router(state);

    let body = multipart_body(Some("sales"), Some(("report.pdf", b"%PDF-1.4")));
    let (status, text) = body_text(router, import_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    let frames = parse_frames(&text);
    let last = frames.last().unwrap();
    assert_eq!(last["type"], "error");
    assert!(last["message"].as_str().unwrap().contains("pdf"), "{}", last);
}

#[tokio::test]
async fn test_missing_file_is_bad_request() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = open_state(&db_path).await;
    let router = build_router(state);

    let (status, text) = body_text(router, import_request(multipart_body(Some("sales"), None))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_kind_is_bad_request() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = open_state(&db_path).await;
    let router = build_router(state);

    let body = multipart_body(Some("inventory"), Some(("sales.csv", SALES_CSV.as_bytes())));
    let (status, _) = body_text(router, import_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = open_state(&db_path).await;
    state
        .config
        .set_global_config_value(config_keys::MAX_UPLOAD_BYTES, "16")
        .await
        .unwrap();
    let router = build_router(state);

    let body = multipart_body(Some("sales"), Some(("sales.csv", SALES_CSV.as_bytes())));
    let (status, text) = body_text(router, import_request(body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    let json: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["error"]["code"], "FILE_TOO_LARGE");
}

#[tokio::test]
async fn test_health_and_batch_listing() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let state = open_state(&db_path).await;
    let router = build_router(state);

    let (status, text) = body_text(
        router.clone(),
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["schemaVersion"], 1);
    assert_eq!(health["referenceCacheBuilt"], false);

    let body = multipart_body(Some("sales"), Some(("sales.csv", SALES_CSV.as_bytes())));
    let (status, _) = body_text(router.clone(), import_request(body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, text) = body_text(
        router,
        Request::builder()
            .uri("/api/import/batches?limit=5")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let batches: Value = serde_json::from_str(&text).unwrap();
    let batches = batches.as_array().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0]["file_name"], "sales.csv");
    assert_eq!(batches[0]["success_rows"], 1);
}
