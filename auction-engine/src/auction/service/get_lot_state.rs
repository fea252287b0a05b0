use {
    super::Service,
    crate::{
        auction::entities::{
            AuctionError,
            AuctionLot,
            Bid,
            LotState,
        },
        kernel::entities::{
            LotId,
            UserId,
        },
    },
    sqlx::types::BigDecimal,
    time::OffsetDateTime,
};

/// Read model handed to the wire layer. Assembled from the lot row and its
/// latest bid; a stale read is acceptable here.
#[derive(Clone, Debug, PartialEq)]
pub struct LotSnapshot {
    pub lot_id:           LotId,
    pub title:            String,
    pub description:      String,
    pub initial_price:    BigDecimal,
    pub current_price:    BigDecimal,
    pub end_time:         OffsetDateTime,
    pub state:            LotState,
    pub last_bid_amount:  Option<BigDecimal>,
    pub last_bid_user_id: Option<UserId>,
    pub last_bid_time:    Option<OffsetDateTime>,
}

impl LotSnapshot {
    pub fn new(lot: &AuctionLot, latest_bid: Option<&Bid>) -> Self {
        Self {
            lot_id:           lot.id,
            title:            lot.title.clone(),
            description:      lot.description.clone(),
            initial_price:    lot.initial_price.clone(),
            current_price:    lot.current_price.clone(),
            end_time:         lot.end_time,
            state:            lot.state,
            last_bid_amount:  latest_bid.map(|bid| bid.amount.clone()),
            last_bid_user_id: latest_bid.map(|bid| bid.user_id),
            last_bid_time:    latest_bid.map(|bid| bid.timestamp).or(lot.last_bid_time),
        }
    }
}

impl Service {
    pub async fn get_lot_state(&self, lot_id: LotId) -> Result<LotSnapshot, AuctionError> {
        let lot = self.repo.get_lot(lot_id).await?;
        // The snapshot degrades gracefully when the bid lookup fails; the
        // lot row alone is still a valid answer.
        let latest_bid = self.repo.get_latest_bid(lot_id).await.ok().flatten();
        Ok(LotSnapshot::new(&lot, latest_bid.as_ref()))
    }
}
