use std::sync::Arc;

use clap::Parser;
use consilio_core::{ConsilioConfig, HttpAuthClient};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use consilio_server::http::{self, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "consilio.toml")]
    config: String,

    /// Check the database connection and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match ConsilioConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    let (store, pool) = match consilio_core::store::open(&config.database).await {
        Ok(opened) => opened,
        Err(e) => {
            eprintln!("Failed to open {:?} store: {}", config.database.backend, e);
            std::process::exit(1);
        }
    };

    if args.health {
        match &pool {
            Some(pool) => match consilio_core::db::health_check(pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            },
            None => println!("✅ In-memory store, nothing to check"),
        }
        return Ok(());
    }

    let auth = HttpAuthClient::new(&config.auth)?;
    tracing::info!(
        service = %config.service.name,
        store = store.name(),
        auth = %config.auth.base_url,
        "Starting Consilio"
    );

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(AppState::new(config, Arc::new(auth), store, pool));
    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
