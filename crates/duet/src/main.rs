use std::sync::Arc;

use duet::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), DuetError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let config = ServerConfig::load()?;
    let services = Arc::new(MemoryServices::new());
    let server = DuetServer::bind(&config, services).await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await
}
