//! Shopfront Payments server
//!
//! Checkout initiation, payment status polling and the Stripe webhook.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shopfront_payments::config::AppConfig;
use shopfront_payments::handlers::build_app;
use shopfront_payments::store::{InMemoryStore, SeedData};
use shopfront_payments::stripe::StripeClient;

/// Shopfront Payments server
#[derive(Parser, Debug)]
#[command(name = "shopfront-payments")]
#[command(version)]
#[command(about = "Checkout sessions and Stripe payment reconciliation")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON file of buyers and products to load into the store at boot
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("loading configuration")?;

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &args.seed {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seed: SeedData = serde_json::from_str(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        tracing::info!(
            buyers = seed.buyers.len(),
            products = seed.products.len(),
            "Loaded seed data"
        );
        store.load_seed(seed);
    }

    let provider = Arc::new(StripeClient::new(config.stripe_client.clone())?);
    let app = build_app(&config, store, provider);
    let processor = tokio::spawn(app.processor.run());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Shopfront Payments listening on {}", addr);

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Router dropped: the queue closes and in-flight events drain
    if let Err(e) = processor.await {
        tracing::error!(error = %e, "Event processor terminated abnormally");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
