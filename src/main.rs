use anyhow::Result;
use chargesync::config::Config;
use chargesync::SyncEngine;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config.validate()?;

    chargesync::logging::init_logging(&config.logging)?;

    info!("ChargeSync engine starting up");

    let engine = Arc::new(
        SyncEngine::new(config).map_err(|e| anyhow::anyhow!("Failed to create engine: {}", e))?,
    );

    // Turn ctrl-c into a graceful shutdown
    let signal_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_engine.shutdown();
        }
    });

    match engine.run().await {
        Ok(()) => {
            info!("Engine shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Engine stopped with error: {}", e);
            Err(anyhow::anyhow!("Engine error: {}", e))
        }
    }
}
