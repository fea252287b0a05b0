use {
    super::Service,
    crate::server::SHOULD_EXIT,
    anyhow::Result,
    std::{
        sync::atomic::Ordering,
        time::Duration,
    },
};

const REAPER_TICK_INTERVAL: Duration = Duration::from_secs(1);

impl Service {
    /// Periodic sweep that seals lots whose end time has passed and
    /// broadcasts their terminal state.
    pub async fn run_reaper_loop(&self) -> Result<()> {
        tracing::info!("Starting lot reaper...");
        let mut tick_interval = tokio::time::interval(REAPER_TICK_INTERVAL);
        while !SHOULD_EXIT.load(Ordering::Acquire) {
            tick_interval.tick().await;
            self.finalize_expired_lots().await;
        }
        tracing::info!("Shutting down lot reaper...");
        Ok(())
    }
}
