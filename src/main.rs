use std::{
    process,
    sync::{Arc, OnceLock},
};

use nodepulse::{
    config::Config,
    core::{assembler::SnapshotAssembler, probe::SystemProbe},
    logger::LoggerManager,
    print_error,
    server::{self, AppState},
};
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Received Ctrl+C, initiating graceful shutdown...");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting nodepulse version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.monitor);

    let monitor = &cfg.monitor;
    info!(
        "Monitoring execution '{}' (process '{}') and consensus '{}'",
        monitor.execution.service, monitor.execution.process, monitor.consensus.service
    );
    info!(
        "Peer strategy: {} (cache TTL {}s), external IP lookup: {}",
        monitor.peer_strategy,
        monitor.cache_ttl_secs,
        if monitor.external_ip.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let assembler = SnapshotAssembler::from_config(monitor, Arc::new(SystemProbe))
        .unwrap_or_else(|e| {
            error!("Failed to build snapshot assembler: {}", e);
            process::exit(1);
        });
    info!("Reporting as host '{}'", assembler.hostname());

    let addr = cfg.server.socket_addr()?;
    server::serve(addr, AppState::new(assembler), shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}
