use {
    super::Repository,
    crate::{
        auction::entities::{
            AuctionError,
            AuctionLot,
        },
        kernel::entities::LotId,
    },
};

impl Repository {
    pub async fn get_lot(&self, lot_id: LotId) -> Result<AuctionLot, AuctionError> {
        self.db.get_lot(lot_id).await
    }
}
