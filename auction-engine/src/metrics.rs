//! Metrics server. Serves the prometheus exposition format over /metrics.
use {
    crate::{
        config::RunOptions,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
    },
    anyhow::{
        anyhow,
        Result,
    },
    axum::{
        routing::get,
        Router,
    },
    axum_prometheus::{
        metrics_exporter_prometheus::{
            PrometheusBuilder,
            PrometheusHandle,
        },
        utils::SECONDS_DURATION_BUCKETS,
    },
    std::sync::atomic::Ordering,
};

pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets(SECONDS_DURATION_BUCKETS)
        .map_err(|err| anyhow!("Failed to set metric buckets: {:?}", err))?
        .install_recorder()
        .map_err(|err| anyhow!("Failed to set up metrics recorder: {:?}", err))
}

pub async fn start_metrics(run_options: RunOptions, metrics_recorder: PrometheusHandle) -> Result<()> {
    tracing::info!("Starting Metrics Server...");

    let app = Router::new().route("/metrics", get(move || async move { metrics_recorder.render() }));

    let listener = tokio::net::TcpListener::bind(&run_options.server.metrics_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            while !SHOULD_EXIT.load(Ordering::Acquire) {
                tokio::time::sleep(EXIT_CHECK_INTERVAL).await;
            }
            tracing::info!("Shutting down metrics server...");
        })
        .await?;
    Ok(())
}
