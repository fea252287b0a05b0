use {
    crate::kernel::entities::LotId,
    std::{
        collections::HashMap,
        sync::Arc,
    },
    tokio::sync::Mutex,
};

mod commit_bid;
mod get_active_lots;
mod get_bids_by_lot;
mod get_latest_bid;
mod get_lots_ending_within;
mod get_or_create_lot_lock;
mod load_lot;
mod models;
mod remove_lot_lock;
mod save_lot;

pub use models::*;

/// Serializes every state-mutating operation on a single lot. Held across
/// the decision and the transactional write so storage order equals
/// decision order.
pub type LotLock = Arc<Mutex<()>>;

#[derive(Default)]
pub struct InMemoryStore {
    pub lot_locks: Mutex<HashMap<LotId, LotLock>>,
}

pub struct Repository {
    pub in_memory_store: InMemoryStore,
    pub db:              Arc<dyn Database>,
}

impl Repository {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            in_memory_store: InMemoryStore::default(),
            db,
        }
    }
}
