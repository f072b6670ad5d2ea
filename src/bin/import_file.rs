// Run one import from a local file and print the event stream to stdout,
// framed exactly as the HTTP endpoint sends it.
//
// Usage:
//   cargo run --bin import_file -- <sales|store_assignment> <file> [db_path]
//
// Exit status is non-zero when the job ends with an error event.

use anyhow::{bail, Context};
use sheet_import::app::{get_default_db_path, AppState};
use sheet_import::config::ImportConfigReader;
use sheet_import::domain::{ImportJob, JobKind};
use sheet_import::importer::progress_channel;
use sheet_import::logging;
use std::io::Write;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_stderr();

    let mut args = std::env::args().skip(1);
    let (Some(kind), Some(file)) = (args.next(), args.next()) else {
        bail!("usage: import_file <sales|store_assignment> <file> [db_path]");
    };
    let kind: JobKind = kind.parse().map_err(anyhow::Error::msg)?;
    let db_path = args.next().unwrap_or_else(get_default_db_path);

    let content = std::fs::read(&file).with_context(|| format!("cannot read {}", file))?;
    let file_name = Path::new(&file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    let state = AppState::open(&db_path)
        .await
        .with_context(|| format!("cannot open database {}", db_path))?;
    let settings = state.config.load_settings().await?;
    let orchestrator = state.orchestrator(settings);

    let job = ImportJob::new(kind, file_name, content);
    let (emitter, mut rx) = progress_channel();
    let runner = tokio::spawn(async move { orchestrator.run(job, emitter).await });

    let stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        let mut out = stdout.lock();
        out.write_all(event.to_sse_frame().as_bytes())?;
        out.flush()?;
    }

    match runner.await? {
        Ok(_) => Ok(()),
        Err(e) => bail!("import failed: {}", e),
    }
}
