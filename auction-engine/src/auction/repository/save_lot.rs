use {
    super::Repository,
    crate::auction::entities::{
        AuctionError,
        AuctionLot,
    },
};

impl Repository {
    pub async fn save_lot(&self, lot: &AuctionLot) -> Result<(), AuctionError> {
        self.db.save_lot(lot).await
    }
}
