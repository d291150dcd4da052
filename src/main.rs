use harvester::{app, config::HvConfig, signals::global_shutdown_signal};
use log::{error, info};
use std::sync::Arc;

#[cfg(feature = "memalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(all(feature = "jemalloc", not(feature = "memalloc"), not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() {
    let config = match HvConfig::new() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level())).init();

    let mut running = match app::start(config).await {
        Ok(running) => running,
        Err(err) => {
            error!("Failed to start: {}", err);
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = global_shutdown_signal() => info!("Shutting down harvester..."),
        _ = running.server_exited() => {}
    }

    running.shutdown().await;
}
