use clap::Parser;
use ocr_review::config::{Args, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from(args);

    tracing::info!("Starting ocr-review-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Binding to {}:{}, data directory {}",
        config.host,
        config.port,
        config.storage.data_dir.display()
    );

    ocr_review::server::run(config).await
}
