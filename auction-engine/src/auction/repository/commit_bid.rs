use {
    super::Repository,
    crate::auction::entities::{
        AuctionError,
        AuctionLot,
        Bid,
    },
};

impl Repository {
    /// Persists an accepted bid and the lot state it produced. The caller
    /// must hold the lot's lock so that commit order matches decision order.
    pub async fn commit_bid(&self, bid: &Bid, lot: &AuctionLot) -> Result<(), AuctionError> {
        self.db.commit_bid(bid, lot).await
    }
}
