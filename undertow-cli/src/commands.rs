//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Subcommand;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use undertow_core::manager::ManagerSettings;
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};
use undertow_core::{
    AccessTracker, EvictionEngine, SwarmEngine, SwarmManager, UndertowConfig, UndertowError,
};
use undertow_search::{CatalogClient, IndexerClient};
use undertow_sim::SimulatedSwarmEngine;
use undertow_web::{AppState, run_server};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the background eviction loop
    Serve {
        /// Port to bind to, overriding PORT
        #[arg(short, long)]
        port: Option<u16>,
        /// Console log level
        #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
        log_level: CliLogLevel,
        /// Directory for the per-run trace log
        #[arg(long)]
        logs_dir: Option<PathBuf>,
        /// Built player bundle served for non-API paths, overriding UNDERTOW_STATIC_DIR
        #[arg(long)]
        static_dir: Option<PathBuf>,
        /// Local video files announced to the simulated engine
        #[arg(long)]
        seed_dir: Option<PathBuf>,
    },
    /// Print magnet links for the video files in a directory
    Magnets {
        /// Directory to scan
        dir: PathBuf,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of whichever step of the command failed
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            port,
            log_level,
            logs_dir,
            static_dir,
            seed_dir,
        } => {
            init_tracing(log_level.as_tracing_level(), logs_dir.as_deref())
                .context("failed to initialize logging")?;
            serve(port, static_dir, seed_dir).await
        }
        Commands::Magnets { dir } => print_magnets(dir).await,
    }
}

async fn serve(
    port: Option<u16>,
    static_dir: Option<PathBuf>,
    seed_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = UndertowConfig::from_env()
        .map_err(|e| anyhow!(UndertowError::from(e).user_message()))?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if static_dir.is_some() {
        config.server.static_dir = static_dir;
    }

    tokio::fs::create_dir_all(&config.swarm.storage_root)
        .await
        .with_context(|| {
            format!(
                "failed to create storage root {}",
                config.swarm.storage_root.display()
            )
        })?;
    info!(
        "Swarm storage at {}, peer port {}",
        config.swarm.storage_root.display(),
        config.swarm.listen_port
    );

    let simulated = SimulatedSwarmEngine::new();
    if let Some(dir) = &seed_dir {
        let seeded = simulated.seed_directory(dir).await?;
        info!("Seeded {} video files from {}", seeded.len(), dir.display());
        for built in &seeded {
            info!("  {} {}", built.metainfo.name, built.magnet_uri());
        }
    }
    let engine: Arc<dyn SwarmEngine> = Arc::new(simulated);

    let tracker = Arc::new(AccessTracker::new());
    let manager = SwarmManager::new(
        engine.clone(),
        tracker.clone(),
        ManagerSettings::from(&config.swarm),
    )?;

    let shutdown = CancellationToken::new();
    let eviction = EvictionEngine::new(engine, tracker, config.eviction.clone())
        .spawn(shutdown.clone());

    let state = AppState {
        manager,
        catalog: CatalogClient::new(&config.catalog)?,
        indexer: IndexerClient::new(&config.indexer)?,
        shutdown: shutdown.clone(),
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        signal_token.cancel();
    });

    let served = run_server(&config.server, state).await;
    shutdown.cancel();
    if let Err(e) = eviction.await {
        warn!("Eviction loop ended abnormally: {}", e);
    }

    served.map_err(|e| anyhow!(e.user_message()))
}

async fn print_magnets(dir: PathBuf) -> anyhow::Result<()> {
    let engine = SimulatedSwarmEngine::new();
    let seeded = engine
        .seed_directory(&dir)
        .await
        .with_context(|| format!("failed to scan {}", dir.display()))?;

    if seeded.is_empty() {
        println!("No video files found in {}", dir.display());
        return Ok(());
    }
    for built in seeded {
        println!("{}\n  {}", built.metainfo.name, built.magnet_uri());
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
