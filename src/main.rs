//! weftd entry point: configuration, logging, engine and gateway bring-up.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{error, info};
use weftd::config::{self, Config};
use weftd::engine::Engine;
use weftd::federation;
use weftd::gateway;
use weftd::state::Network;

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path; defaults to
/// `config.toml`.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);
    match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();
    let conf = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: failed to load config from {}: {}", config_path, e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match conf.server.log_format {
        config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = config::validate(&conf) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        anyhow::bail!("configuration validation failed with {} error(s)", errors.len());
    }

    info!(
        server = %conf.server.name,
        network = %conf.server.network,
        sid = %conf.server.sid,
        "starting weftd"
    );

    let conf = Arc::new(conf);
    let net = Network::new(Arc::clone(&conf));

    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    let conn_ids = Arc::new(AtomicU64::new(1));

    gateway::run_gateway(Arc::clone(&conf), event_tx.clone(), Arc::clone(&conn_ids)).await?;

    for link in &conf.link {
        if link.autoconnect {
            federation::connector::spawn_link_connector(
                link.clone(),
                event_tx.clone(),
                Arc::clone(&conn_ids),
            );
        }
    }

    let engine = Engine::new(net, event_rx);
    let engine_task = tokio::spawn(engine.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
        }
        result = engine_task => {
            error!(?result, "engine stopped unexpectedly");
        }
    }

    // Give socket tasks a moment to flush.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    Ok(())
}
