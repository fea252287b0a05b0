use {
    super::{
        get_lot_state::LotSnapshot,
        Service,
    },
    crate::{
        auction::{
            api::lot_update_message,
            entities::{
                AuctionError,
                LotState,
            },
        },
        kernel::entities::LotId,
    },
    std::time::Duration,
    time::OffsetDateTime,
};

impl Service {
    /// One reaper sweep: every active lot whose end time has passed is
    /// finalized on its own tracked task.
    pub async fn finalize_expired_lots(&self) {
        let due = match self.repo.get_lots_ending_within(Duration::ZERO).await {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(error = %err, "reaper: failed to list due lots");
                return;
            }
        };
        for lot in due {
            self.task_tracker.spawn({
                let service = self.clone();
                async move {
                    if let Err(err) = service.finalize_lot(lot.id).await {
                        tracing::error!(error = %err, lot_id = %lot.id, "failed to finalize lot");
                    }
                }
            });
        }
    }

    /// Seals a single lot. Competes with `place_bid` for the lot's lock;
    /// if a late bid won and extended the deadline, this is a no-op and the
    /// next sweep picks the lot up again.
    #[tracing::instrument(skip(self), fields(lot_id = %lot_id))]
    pub async fn finalize_lot(&self, lot_id: LotId) -> Result<(), AuctionError> {
        let lock = self.repo.get_or_create_lot_lock(lot_id).await;
        let guard = lock.lock().await;

        let mut lot = self.repo.get_lot(lot_id).await?;
        if lot.state != LotState::Active {
            return Ok(());
        }
        if OffsetDateTime::now_utc() < lot.end_time {
            return Ok(());
        }
        lot.finish()?;
        self.repo.save_lot(&lot).await?;

        drop(guard);
        self.repo.remove_lot_lock(lot_id).await;

        let latest_bid = self.repo.get_latest_bid(lot_id).await.ok().flatten();
        let snapshot = LotSnapshot::new(&lot, latest_bid.as_ref());
        match serde_json::to_string(&lot_update_message(&snapshot)) {
            Ok(data) => self.hub.broadcast_to_lot(lot_id, data),
            Err(err) => {
                tracing::error!(error = %err, lot_id = %lot_id, "failed to serialize terminal update")
            }
        }
        Ok(())
    }
}
