use {
    super::{
        LotLock,
        Repository,
    },
    crate::kernel::entities::LotId,
};

impl Repository {
    pub async fn get_or_create_lot_lock(&self, lot_id: LotId) -> LotLock {
        self.in_memory_store
            .lot_locks
            .lock()
            .await
            .entry(lot_id)
            .or_default()
            .clone()
    }
}
