use {
    super::Repository,
    crate::auction::entities::{
        AuctionError,
        AuctionLot,
    },
    std::time::Duration,
};

impl Repository {
    /// Active lots whose end time falls inside `now + horizon`. A zero
    /// horizon yields the lots that are already due.
    pub async fn get_lots_ending_within(
        &self,
        horizon: Duration,
    ) -> Result<Vec<AuctionLot>, AuctionError> {
        self.db.get_lots_ending_within(horizon).await
    }
}
