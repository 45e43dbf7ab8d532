//! Connection Engine Daemon
//!
//! Serves the connection and follow API over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! connection-engine
//!
//! # Start with custom config
//! connection-engine --config /path/to/config.toml
//!
//! # Start with custom HTTP port and storage directory
//! connection-engine --http-port 8096 --storage-dir /data/relationships
//!
//! # Development: load actors and memberships from a JSON seed
//! connection-engine --directory-seed ./seed.json
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use connection_engine::services::events::spawn_logging_listener;
use connection_engine::{Config, Database, DirectorySeed, HttpServer, Services, SqliteDirectory};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "connection-engine")]
#[command(about = "Connection & follow relationship engine")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "CONNECTION_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "CONNECTION_ENGINE_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "CONNECTION_ENGINE_HTTP_PORT")]
    http_port: Option<u16>,

    /// JSON file of actors and memberships to load into the directory mirror
    #[arg(long, env = "CONNECTION_ENGINE_DIRECTORY_SEED")]
    directory_seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("connection_engine=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("reading config {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting connection-engine"
    );

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Database::open(&config.database_path(), config.pool_size, config.busy_timeout_ms)?;

    if let Some(seed_path) = &args.directory_seed {
        DirectorySeed::load(seed_path)
            .and_then(|seed| seed.apply(&db))
            .with_context(|| format!("applying directory seed {}", seed_path.display()))?;
    }

    let stats = db.stats()?;
    info!(
        actors = stats.actor_count,
        pending = stats.pending_requests,
        accepted = stats.accepted_connections,
        follows = stats.follow_edges,
        "Relationship store ready"
    );

    let directory = Arc::new(SqliteDirectory::new(db.clone()));
    let services = Arc::new(Services::new(db, directory, config.policy.clone()));
    let _audit = spawn_logging_listener(services.events.clone());

    let http_addr: SocketAddr = format!("{}:{}", config.bind_host, config.http_port).parse()?;
    let http_server = Arc::new(
        HttpServer::new(services, http_addr)
            .with_request_timeout(Duration::from_millis(config.request_timeout_ms)),
    );

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    Ok(())
}
