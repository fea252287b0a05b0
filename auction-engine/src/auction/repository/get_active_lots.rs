use {
    super::Repository,
    crate::auction::entities::{
        AuctionError,
        AuctionLot,
    },
};

impl Repository {
    /// All lots currently accepting bids. Consumed by the external catalog
    /// surface.
    pub async fn get_active_lots(&self) -> Result<Vec<AuctionLot>, AuctionError> {
        self.db.get_active_lots().await
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{
            super::MockDatabase,
            *,
        },
        crate::auction::entities::LotState,
        sqlx::types::BigDecimal,
        std::{
            sync::Arc,
            time::Duration,
        },
        time::OffsetDateTime,
        uuid::Uuid,
    };

    #[tokio::test]
    async fn returns_whatever_storage_considers_active() {
        let lot = AuctionLot {
            id: Uuid::new_v4(),
            title: "Amber brooch".to_string(),
            description: String::new(),
            initial_price: BigDecimal::from(5000),
            current_price: BigDecimal::from(5000),
            end_time: OffsetDateTime::now_utc() + Duration::from_secs(600),
            state: LotState::Active,
            last_bid_time: None,
            time_extension: Duration::from_secs(30),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let mut db = MockDatabase::new();
        let active = vec![lot.clone()];
        db.expect_get_active_lots()
            .returning(move || Ok(active.clone()));

        let repo = Repository::new(Arc::new(db));
        let lots = repo.get_active_lots().await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].id, lot.id);
    }
}
