use std::sync::Arc;

use clap::Parser;
use pictor_core::embedding::ImageEmbedder;
use pictor_core::{ClipVisionEmbedder, PictorConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use pictor_server::http;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "pictor.toml")]
    config: String,

    /// Load config and model, report, and exit without serving
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match PictorConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Load the model once, before accepting any traffic. A server that
    // cannot embed should not come up at all.
    let embedder = match ClipVisionEmbedder::new(&config.embedding) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Failed to load embedding model: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        backend = embedder.name(),
        dimensions = embedder.dimensions(),
        "Embedding model loaded"
    );

    if args.check {
        println!(
            "✅ model loaded: {} ({} dimensions)",
            embedder.name(),
            embedder.dimensions()
        );
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let embedder: Arc<dyn ImageEmbedder> = Arc::new(embedder);
    http::start_http_server(&config.service, embedder, tx.subscribe()).await?;

    Ok(())
}
