//! KNX bridge server - Main Entry Point
//!
//! Loads `knx.cfg`, restores the last snapshot, supervises every configured
//! gateway and serves the HTTP query surface until interrupted.

use clap::Parser;
use knxweb_rust::{
    client::WebSocketTransport,
    config::CliArgs,
    http_transport,
    logging::{init_logging, LogConfig},
    storage::{restore_snapshot, snapshot::SNAPSHOT_INTERVAL, spawn_snapshot_task},
    GatewaySupervisor, KnxBridge, PointCatalog, Result, ServerConfig, StateStore,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // configuration errors are fatal before anything starts
    let config = match ServerConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let log_config = LogConfig {
        traffic_dir: config.logdir.clone(),
        debug: config.debug,
        ..LogConfig::default()
    };
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Cannot set up logging: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<()> {
    info!("🚀 Starting KNX bridge v{}", env!("CARGO_PKG_VERSION"));
    debug!("devices: {:?}", config.devices);
    debug!("addresses: {:?}", config.addresses);
    for (addr, tag) in config.unknown_types() {
        warn!("Unknown datapoint type {tag} for {addr}, values will be shown raw");
    }

    let catalog = Arc::new(PointCatalog::new(&config.addresses, &config.devices));
    let store = Arc::new(StateStore::new(catalog));
    restore_snapshot(&store, &config.state_file).await;

    let cancel = CancellationToken::new();
    let snapshots = spawn_snapshot_task(
        store.clone(),
        config.state_file.clone(),
        SNAPSHOT_INTERVAL,
        cancel.clone(),
    );

    let supervisor = Arc::new(GatewaySupervisor::new(
        store,
        Arc::new(WebSocketTransport::default()),
        config.idle_timeout,
    ));
    let gateways: Vec<String> = config.gateways.iter().map(|g| g.address.clone()).collect();
    let links = supervisor.spawn_all(&gateways, &cancel);

    let bridge = Arc::new(KnxBridge::new(supervisor));
    let app = http_transport::router(bridge, config.enable_cors);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down...");
                shutdown.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });

    let served = http_transport::serve(app, config.port, cancel.clone()).await;
    cancel.cancel();

    for link in links {
        let _ = link.await;
    }
    let _ = snapshots.await;
    served
}
