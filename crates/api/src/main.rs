use anyhow::Context;
use common::{LogFormat, Settings};
use ragforge::{Ragforge, server};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("Failed to load configuration")?;
    init_tracing(settings.server.log_format);

    let bind_addr = settings.server.bind_addr.clone();
    let ragforge = Arc::new(Ragforge::from_settings(settings).context("Failed to build Ragforge")?);

    // Connect eagerly so startup logs show store availability
    if let Err(e) = ragforge.vector_store().await {
        tracing::warn!(error = %e, "Vector store not ready, will retry on first request");
    }
    let graph_available = ragforge.graph_available().await;
    tracing::info!(graph_available, "Graph store initialised");

    let app = server::router(ragforge);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
