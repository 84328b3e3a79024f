mod dispatch;
mod router;
mod signature;
mod telemetry;
mod webhook;

use std::net::SocketAddr;

use linehook_storage::Database;
use linehook_util::{load_env_file, AppConfig};
use tracing::{error, info};

use crate::signature::SignatureVerifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;

    let state = router::AppState::new(
        database,
        SignatureVerifier::new(config.channel_secret.as_bytes()),
    );

    if let Some(ops_addr) = config.ops_bind_addr {
        let listener = tokio::net::TcpListener::bind(ops_addr).await?;
        info!(stage = "app", addr = %ops_addr, "starting operational listener");
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router::ops_router(metrics)).await {
                error!(stage = "app", error = %err, "operational listener stopped");
            }
        });
    }

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        project_id = config.project_id.as_deref().unwrap_or(""),
        "starting webhook listener"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
