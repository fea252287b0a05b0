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
    pub async fn get_latest_bid(&self, lot_id: LotId) -> Result<Option<Bid>, AuctionError> {
        self.db.get_latest_bid(lot_id).await
    }
}
