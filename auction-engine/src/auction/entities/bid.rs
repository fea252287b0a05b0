use {
    crate::kernel::entities::{
        BidId,
        LotId,
        UserId,
    },
    sqlx::types::BigDecimal,
    time::OffsetDateTime,
    uuid::Uuid,
};

/// A single accepted bid. Bids are created only by the bid use-case and are
/// never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Bid {
    pub id:        BidId,
    pub lot_id:    LotId,
    pub user_id:   UserId,
    pub amount:    BigDecimal,
    pub timestamp: OffsetDateTime,
}

impl Bid {
    pub fn new(lot_id: LotId, user_id: UserId, amount: BigDecimal, timestamp: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            lot_id,
            user_id,
            amount,
            timestamp,
        }
    }
}
