// FuelEU Compliance - Web Server
// REST API with Axum over the SQLite-backed engine

use anyhow::{Context, Result};
use clap::Parser;
use fuel_compliance::api::{router, AppState};
use fuel_compliance::{AppConfig, ComplianceEngine, SqliteStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "FuelEU compliance HTTP API", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, default_value = "compliance.toml")]
    config: PathBuf,

    /// SQLite database (overrides config and FUEL_COMPLIANCE_DB)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Listen address (overrides config and FUEL_COMPLIANCE_LISTEN)
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(Some(args.config.as_path()))?;
    config.apply_env_overrides()?;
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    println!("🌐 FuelEU Compliance - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Open database
    let store = SqliteStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    println!("✓ Database opened: {:?}", config.database.path);

    let engine = ComplianceEngine::with_calculator(Arc::new(store), config.calculator());
    let app = router(AppState::new(engine));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.listen))?;

    tracing::info!(
        listen = %config.server.listen,
        target_intensity = config.compliance.target_intensity,
        "compliance API listening"
    );
    println!("\n🚀 Server running on http://{}", config.server.listen);
    println!("   API: http://{}/api/routes", config.server.listen);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    Ok(())
}
