use std::sync::Arc;

use anyhow::Context;

use logiport_infra::{AppConfig, Backend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logiport_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let backend = Arc::new(
        Backend::from_config(&config)
            .await
            .context("failed to assemble backend")?,
    );
    let workers = backend.start_workers(&config);

    let app = logiport_api::app::build_app(backend);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    workers.shutdown().await;
    Ok(())
}
