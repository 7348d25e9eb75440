use anyhow::Context;

use stockflow_api::app::{self, services::AppServices};
use stockflow_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockflow_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let services = AppServices::from_config(&config)
        .await
        .context("failed to initialize storage")?;
    let notifications = services
        .spawn_notifications(config.notify_recipients.clone())
        .context("failed to start notification worker")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app::build_app(services))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    notifications.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }
}
