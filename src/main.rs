// ==========================================
// 表格批量导入服务 - HTTP 服务入口
// ==========================================
// 环境变量:
// - SHEET_IMPORT_DB:   数据库路径（默认位于用户数据目录）
// - SHEET_IMPORT_ADDR: 监听地址（默认 127.0.0.1:8080）
// - RUST_LOG:          日志级别
// ==========================================

use anyhow::Context;
use sheet_import::app::{get_default_db_path, AppState};
use sheet_import::{build_router, logging};

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", sheet_import::APP_NAME);
    tracing::info!("系统版本: {}", sheet_import::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    let state = AppState::open(&db_path)
        .await
        .with_context(|| format!("无法初始化AppState: {}", db_path))?;

    let addr = std::env::var("SHEET_IMPORT_ADDR")
        .ok()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听地址: {}", addr))?;
    tracing::info!(%addr, db_path = %state.db_path, "HTTP 服务已启动");

    axum::serve(listener, build_router(state))
        .await
        .context("HTTP 服务异常退出")?;
    Ok(())
}
