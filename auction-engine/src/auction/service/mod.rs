use {
    super::repository::{
        Database,
        Repository,
    },
    crate::api::ws::HubHandle,
    sqlx::types::BigDecimal,
    std::sync::Arc,
    tokio_util::task::TaskTracker,
};

pub mod finalize_lots;
pub mod get_lot_state;
pub mod place_bid;
pub mod workers;

pub struct Config {
    /// Minimum increment over the current price. Zero disables the rule.
    pub min_increment: BigDecimal,
}

pub struct ServiceInner {
    pub(crate) config:       Config,
    pub(crate) repo:         Repository,
    pub(crate) hub:          HubHandle,
    pub(crate) task_tracker: TaskTracker,
}

#[derive(Clone)]
pub struct Service(Arc<ServiceInner>);

impl std::ops::Deref for Service {
    type Target = ServiceInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Service {
    pub fn new(
        db: Arc<dyn Database>,
        config: Config,
        hub: HubHandle,
        task_tracker: TaskTracker,
    ) -> Self {
        Self(Arc::new(ServiceInner {
            config,
            repo: Repository::new(db),
            hub,
            task_tracker,
        }))
    }
}
