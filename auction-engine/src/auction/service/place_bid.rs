use {
    super::Service,
    crate::{
        auction::entities::{
            AuctionError,
            Bid,
        },
        kernel::entities::{
            LotId,
            UserId,
        },
    },
    axum_prometheus::metrics,
    bigdecimal::FromPrimitive,
    sqlx::types::BigDecimal,
    time::OffsetDateTime,
};

#[derive(Clone, Debug)]
pub struct PlaceBidInput {
    pub lot_id:  LotId,
    pub user_id: UserId,
    pub amount:  f64,
}

/// The wire carries amounts as JSON numbers; everything past this point is
/// fixed-point with two decimal places.
fn quantize_amount(amount: f64) -> Result<BigDecimal, AuctionError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AuctionError::InvalidAmount);
    }
    BigDecimal::from_f64(amount)
        .map(|amount| amount.round(2))
        .ok_or(AuctionError::InvalidAmount)
}

impl Service {
    /// Runs one bid end to end: quantize, serialize on the lot's lock, apply
    /// the domain decision and commit the result atomically. The lock stays
    /// held across the commit so that storage order equals decision order.
    /// A failed commit changes nothing observable; the mutated aggregate is
    /// discarded and the next bid reloads from storage.
    #[tracing::instrument(skip(self, input), fields(lot_id = %input.lot_id, user_id = %input.user_id))]
    pub async fn place_bid(&self, input: PlaceBidInput) -> Result<Bid, AuctionError> {
        let amount = quantize_amount(input.amount)?;

        let lock = self.repo.get_or_create_lot_lock(input.lot_id).await;
        let _guard = lock.lock().await;

        let mut lot = self.repo.get_lot(input.lot_id).await?;
        let now = OffsetDateTime::now_utc();
        let bid = lot.place_bid(input.user_id, amount, &self.config.min_increment, now)?;
        self.repo.commit_bid(&bid, &lot).await?;

        metrics::counter!("bids_accepted_total").increment(1);
        tracing::info!(
            bid_id = %bid.id,
            amount = %bid.amount,
            end_time = %lot.end_time,
            "bid accepted"
        );
        Ok(bid)
    }
}
