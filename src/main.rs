mod app;
mod config;
mod models;
mod providers;
mod services;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use app::App;
use config::ClientConfig;
use providers::HttpBackend;
use services::Database;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(run());

    // Stdin reads park a blocking thread that never returns on its own.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

async fn run() -> Result<()> {
    let config = ClientConfig::from_env()?;
    tracing::info!(
        "Using backend {} with data at {}",
        config.backend_url,
        config.db_path.display()
    );

    let db = Database::open(&config.db_path).await?;
    let backend = Arc::new(HttpBackend::new(config.backend_url.clone()));
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Arc::new(App::new(db, backend, config.language, tx).await);

    ui::terminal::run(app, rx, CancellationToken::new()).await
}
