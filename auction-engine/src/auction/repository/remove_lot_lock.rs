use {
    super::Repository,
    crate::kernel::entities::LotId,
};

impl Repository {
    /// Drops the lock entry once a lot reaches a terminal state. Tasks that
    /// already cloned the lock finish normally; nothing new is created for
    /// the lot unless another bid races in, and that bid fails on the state
    /// check.
    pub async fn remove_lot_lock(&self, lot_id: LotId) {
        self.in_memory_store.lot_locks.lock().await.remove(&lot_id);
    }
}
