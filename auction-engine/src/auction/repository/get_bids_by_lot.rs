use {
    super::Repository,
    crate::{
        auction::entities::{
            AuctionError,
            Bid,
        },
        kernel::entities::LotId,
    },
};

impl Repository {
    /// Full bid history of a lot, ascending by timestamp. Consumed by the
    /// external history surface; the engine itself only needs the latest bid.
    pub async fn get_bids_by_lot(&self, lot_id: LotId) -> Result<Vec<Bid>, AuctionError> {
        self.db.get_bids_by_lot(lot_id).await
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{
            super::MockDatabase,
            *,
        },
        sqlx::types::BigDecimal,
        std::sync::Arc,
        time::OffsetDateTime,
        uuid::Uuid,
    };

    #[tokio::test]
    async fn history_preserves_storage_order() {
        let lot_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let history: Vec<Bid> = (0..3)
            .map(|i| {
                Bid::new(
                    lot_id,
                    Uuid::new_v4(),
                    BigDecimal::from(5000 + i),
                    now + std::time::Duration::from_secs(i as u64),
                )
            })
            .collect();

        let mut db = MockDatabase::new();
        let stored = history.clone();
        db.expect_get_bids_by_lot()
            .returning(move |_| Ok(stored.clone()));

        let repo = Repository::new(Arc::new(db));
        let bids = repo.get_bids_by_lot(lot_id).await.unwrap();
        assert_eq!(bids, history);
        for pair in bids.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }
}
