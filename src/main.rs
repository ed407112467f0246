use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use csvserve::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let config = ServerConfig::from_env();
    info!(
        target: "csvserve",
        "csvserve starting: RUST_LOG='{}', http_port={}, db_path='{}', upload_dir='{}'",
        rust_log,
        config.http_port,
        config.db_path.display(),
        config.upload_dir.display()
    );

    csvserve::server::run_with_config(config).await
}
