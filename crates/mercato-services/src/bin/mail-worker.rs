//! # Mail Worker
//!
//! Polls the mail queue and dispatches pending e-mails until Ctrl+C.
//!
//! ## Usage
//! ```bash
//! cargo run -p mercato-services --bin mail-worker
//!
//! # Explicit config file, single poll
//! cargo run -p mercato-services --bin mail-worker -- --config ./mercato.toml --once
//! ```
//!
//! ## Poll Loop
//! ```text
//! interval.tick() ──► process_queue ──► (delete sent / exhausted)
//!        ▲                  │
//!        └──────────────────┘
//! Ctrl+C / SIGTERM ──► cancel = true ──► current mail finishes, loop exits
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use mercato_db::{Database, DbConfig};
use mercato_services::telemetry::init_tracing;
use mercato_services::{LettreTransportFactory, MercatoConfig, QueuedEmailService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut once = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--once" => once = true,
            "--help" | "-h" => {
                println!("Mercato Mail Worker");
                println!();
                println!("Usage: mail-worker [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("      --once           Process the queue once and exit");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();

    let config = MercatoConfig::load_or_default(config_path);
    info!(
        db = %config.database.path.display(),
        poll_interval_secs = config.email.poll_interval_secs,
        fetch_size = config.email.fetch_size,
        pickup = ?config.email.pickup_directory,
        "Mail worker starting"
    );

    let db = Database::new(
        DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
    )
    .await?;

    let service = QueuedEmailService::new(
        Arc::new(db.clone()),
        Arc::new(LettreTransportFactory::from_settings(&config.email)),
        config.email.clone(),
    );

    let (cancel_tx, cancel) = watch::channel(false);

    if once {
        let sent = service.process_queue(&cancel).await?;
        info!(sent = sent, "Mail queue processed");
        db.close().await;
        return Ok(());
    }

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = cancel_tx.send(true);
    });

    let mut shutdown = cancel.clone();
    let mut interval = tokio::time::interval(Duration::from_secs(config.email.poll_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = service.process_queue(&cancel).await {
                    error!(error = %e, "Failed to process mail queue");
                }
            }

            _ = shutdown.changed() => {
                info!("Mail worker shutting down");
                break;
            }
        }
    }

    db.close().await;
    info!("Mail worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
