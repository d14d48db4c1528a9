mod config;
mod test_server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ottoengine_core::{EngineLog, SystemClock};
use ottoengine_gateway::{
    new_connection_sender, run_scheduler_loop, run_supervisor, Engine, RemoteConfig,
};
use ottoengine_rules::RuleStore;
use ottoengine_server::{router, AppState};
use ottoengine_state::spawn_store;
use tokio::sync::{Mutex, Notify};
use tracing::info;

use crate::config::OttoEngineConfig;

/// OttoEngine: a home-automation rule engine.
#[derive(Parser, Debug)]
#[command(name = "ottoengine", about = "Home-automation rule engine")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "ottoengine.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = OttoEngineConfig::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter())),
        )
        .init();

    let (store, _store_join) = spawn_store();
    let rule_store = RuleStore::new(config.rules_directory.clone());
    let (sender, client_slot) = new_connection_sender();
    let log = Arc::new(Mutex::new(EngineLog::new(1000)));
    let clock = Arc::new(SystemClock);

    let engine = Arc::new(Mutex::new(Engine::new(
        store,
        rule_store,
        Arc::new(sender),
        log,
        clock,
        config.default_tz.clone(),
    )));

    tokio::spawn(run_scheduler_loop(Arc::clone(&engine)));

    if let Some(port) = config.test_server_port {
        tokio::spawn(test_server::run_test_server(port));
    }

    let remote_config = RemoteConfig {
        host: config.remote_host.clone(),
        port: config.remote_port,
        token: config.remote_token.clone(),
        tls: config.remote_tls,
        aux_event_type: config.aux_event_type.clone(),
    };
    tokio::spawn(run_supervisor(remote_config, Arc::clone(&engine), client_slot));

    let shutdown = Arc::new(Notify::new());
    let app = router(AppState {
        engine,
        shutdown: Arc::clone(&shutdown),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.rest_port)).await?;
    info!(port = config.rest_port, "REST surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => {}
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate_signal() => {}
            }
        })
        .await?;

    Ok(())
}

#[cfg(unix)]
async fn terminate_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
