use {
    crate::{
        api::{
            self,
            ws,
            ApiState,
        },
        auction::{
            api as auction_api,
            service::{
                Config as ServiceConfig,
                Service,
            },
        },
        config::RunOptions,
        metrics::{
            setup_metrics_recorder,
            start_metrics,
        },
    },
    anyhow::{
        anyhow,
        Result,
    },
    bigdecimal::FromPrimitive,
    sqlx::{
        migrate,
        postgres::PgPoolOptions,
        types::BigDecimal,
    },
    std::{
        future::Future,
        sync::{
            atomic::{
                AtomicBool,
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    tokio::time::sleep,
    tokio_util::task::TaskTracker,
};

// A static exit flag to indicate to running tasks that we're shutting down.
// Set once by the signal handler and polled by every loop.
pub(crate) static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);
pub const EXIT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

async fn fault_tolerant_handler<F, Fut>(name: String, f: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        let res = tokio::spawn(f()).await;
        match res {
            Ok(result) => match result {
                Ok(_) => break, // This will happen on graceful shutdown
                Err(err) => {
                    tracing::error!(task = name, error = ?err, "task returned error, restarting");
                    sleep(Duration::from_millis(500)).await;
                }
            },
            Err(err) => {
                tracing::error!(task = name, error = ?err, "task panicked or was cancelled");
                SHOULD_EXIT.store(true, Ordering::Release);
                break;
            }
        }
    }
}

fn parse_min_increment(min_increment: f64) -> Result<BigDecimal> {
    if !min_increment.is_finite() || min_increment < 0.0 {
        return Err(anyhow!("min increment must be a non-negative number"));
    }
    BigDecimal::from_f64(min_increment)
        .map(|min_increment| min_increment.round(2))
        .ok_or_else(|| anyhow!("min increment must be a non-negative number"))
}

pub async fn start_server(run_options: RunOptions) -> Result<()> {
    tokio::spawn(async move {
        tracing::info!("Registered shutdown signal handler...");
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for the shutdown signal");
        }
        tracing::info!("Shut down signal received, waiting for tasks...");
        SHOULD_EXIT.store(true, Ordering::Release);
    });

    let min_increment = parse_min_increment(run_options.min_increment)?;

    let pool = PgPoolOptions::new()
        .max_connections(run_options.server.database_max_connections)
        .connect(&run_options.server.database_url())
        .await
        .map_err(|err| anyhow!("Failed to connect to the database: {:?}", err))?;
    match migrate!("./migrations").run(&pool).await {
        Ok(()) => {}
        Err(sqlx::migrate::MigrateError::VersionMissing(version)) => {
            tracing::info!(
                "Found missing migration ({}) probably because of downgrade",
                version
            );
        }
        Err(err) => return Err(anyhow!("Failed to run migrations: {:?}", err)),
    }

    let task_tracker = TaskTracker::new();
    let (hub, hub_handle, inbound_receiver) = ws::Hub::new();
    let service = Service::new(
        Arc::new(pool),
        ServiceConfig { min_increment },
        hub_handle.clone(),
        task_tracker.clone(),
    );
    let api_state = Arc::new(ApiState {
        service:        service.clone(),
        hub:            hub_handle,
        client_counter: AtomicUsize::new(0),
    });
    let metrics_recorder = setup_metrics_recorder()?;

    tokio::join!(
        // The hub and the message handler own their channel ends, so they
        // run once instead of through the restarting supervisor.
        async {
            if let Err(err) = hub.run().await {
                tracing::error!(error = ?err, "websocket hub exited with error");
                SHOULD_EXIT.store(true, Ordering::Release);
            }
        },
        async {
            if let Err(err) = auction_api::run_message_loop(service.clone(), inbound_receiver).await
            {
                tracing::error!(error = ?err, "auction message handler exited with error");
                SHOULD_EXIT.store(true, Ordering::Release);
            }
        },
        fault_tolerant_handler("lot reaper".to_string(), || {
            let service = service.clone();
            async move { service.run_reaper_loop().await }
        }),
        fault_tolerant_handler("api server".to_string(), || api::start_api(
            run_options.clone(),
            api_state.clone()
        )),
        fault_tolerant_handler("metrics server".to_string(), || start_metrics(
            run_options.clone(),
            metrics_recorder.clone()
        )),
    );

    // To make sure all the spawned tasks will finish their job before shut down
    task_tracker.close();
    task_tracker.wait().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_increment_is_quantized_and_validated() {
        assert_eq!(parse_min_increment(0.0).unwrap(), BigDecimal::from(0));
        assert_eq!(
            parse_min_increment(100.125).unwrap(),
            "100.12".parse::<BigDecimal>().unwrap()
        );
        assert!(parse_min_increment(-1.0).is_err());
        assert!(parse_min_increment(f64::NAN).is_err());
    }
}
