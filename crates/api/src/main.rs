use std::sync::Arc;

use anyhow::Context;
use harbor_agent::HarborConfig;
use harbor_api::app::{build_app, AppServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    harbor_observability::init();

    let config = HarborConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        upstream = %config.upstream_url,
        generation = %config.generation,
        "starting harbor"
    );

    let services = Arc::new(AppServices::sqlite(config.clone()).await?);

    // Storage trouble during activation degrades; it never blocks startup.
    match services.activate().await {
        Ok(report) if !report.precache_failures.is_empty() => {
            tracing::warn!(failures = ?report.precache_failures, "precache incomplete");
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %format!("{e:#}"), "activation failed"),
    }

    let (worker, worker_shutdown) = services.start_worker()?;

    let app = build_app(services);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    worker_shutdown.notify_one();
    let _ = worker.await;
    Ok(())
}
