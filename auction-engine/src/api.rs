use {
    crate::{
        auction::service::Service,
        config::RunOptions,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
    },
    anyhow::Result,
    axum::{
        routing::get,
        Router,
    },
    clap::crate_version,
    std::sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    tower_http::cors::CorsLayer,
};

pub mod rest;
pub mod ws;

pub struct ApiState {
    pub service:        Service,
    pub hub:            ws::HubHandle,
    pub client_counter: AtomicUsize,
}

async fn root() -> String {
    format!("Auction Engine API {}", crate_version!())
}

pub async fn start_api(run_options: RunOptions, state: Arc<ApiState>) -> Result<()> {
    let app: Router = Router::new()
        .route("/", get(root))
        .route("/health", get(rest::health))
        .route("/ws/auction/:lot_id", get(ws::ws_route_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&run_options.server.listen_addr).await?;
    tracing::info!(addr = %run_options.server.listen_addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            while !SHOULD_EXIT.load(Ordering::Acquire) {
                tokio::time::sleep(EXIT_CHECK_INTERVAL).await;
            }
            tracing::info!("Shutting down API server...");
        })
        .await?;
    Ok(())
}
