use {
    super::{
        errors::AuctionError,
        Bid,
    },
    crate::kernel::entities::{
        LotId,
        UserId,
    },
    bigdecimal::Zero,
    sqlx::types::BigDecimal,
    std::{
        fmt,
        str::FromStr,
        time::Duration,
    },
    time::OffsetDateTime,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LotState {
    Pending,
    Active,
    Finished,
    Cancelled,
}

impl LotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotState::Pending => "pending",
            LotState::Active => "active",
            LotState::Finished => "finished",
            LotState::Cancelled => "cancelled",
        }
    }

    /// Finished and cancelled lots never leave their state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LotState::Finished | LotState::Cancelled)
    }
}

impl fmt::Display for LotState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LotState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LotState::Pending),
            "active" => Ok(LotState::Active),
            "finished" => Ok(LotState::Finished),
            "cancelled" => Ok(LotState::Cancelled),
            other => Err(anyhow::anyhow!("unknown lot state: {other}")),
        }
    }
}

/// The aggregate a bid is decided against. All mutating methods assume the
/// caller holds the lot's lock from the repository lock registry; the
/// aggregate itself only encodes the rules.
#[derive(Clone, Debug)]
pub struct AuctionLot {
    pub id:             LotId,
    pub title:          String,
    pub description:    String,
    pub initial_price:  BigDecimal,
    pub current_price:  BigDecimal,
    pub end_time:       OffsetDateTime,
    pub state:          LotState,
    pub last_bid_time:  Option<OffsetDateTime>,
    pub time_extension: Duration,
    pub created_at:     OffsetDateTime,
    pub updated_at:     OffsetDateTime,
}

impl AuctionLot {
    pub fn new(
        id: LotId,
        title: String,
        description: String,
        initial_price: BigDecimal,
        end_time: OffsetDateTime,
        time_extension: Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            title,
            description,
            current_price: initial_price.clone(),
            initial_price,
            end_time,
            state: LotState::Pending,
            last_bid_time: None,
            time_extension,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decides a single bid. Preconditions are checked in order and the
    /// first failure wins. On success the lot reflects the accepted bid,
    /// including the soft-close extension of `end_time`.
    pub fn place_bid(
        &mut self,
        user_id: UserId,
        amount: BigDecimal,
        min_increment: &BigDecimal,
        now: OffsetDateTime,
    ) -> Result<Bid, AuctionError> {
        if self.state != LotState::Active {
            tracing::warn!(
                lot_id = %self.id,
                state = %self.state,
                user_id = %user_id,
                "bid rejected, lot not active"
            );
            return Err(AuctionError::LotNotActive);
        }

        if now >= self.end_time {
            tracing::warn!(
                lot_id = %self.id,
                end_time = %self.end_time,
                user_id = %user_id,
                "bid rejected, lot past its end time"
            );
            return Err(AuctionError::LotFinished);
        }

        if amount <= self.current_price {
            tracing::warn!(
                lot_id = %self.id,
                amount = %amount,
                current_price = %self.current_price,
                user_id = %user_id,
                "bid rejected, amount too low"
            );
            return Err(AuctionError::BidTooLow);
        }

        if !min_increment.is_zero() && amount < &self.current_price + min_increment {
            tracing::warn!(
                lot_id = %self.id,
                amount = %amount,
                current_price = %self.current_price,
                min_increment = %min_increment,
                "bid rejected, increment too small"
            );
            return Err(AuctionError::IncrementTooSmall);
        }

        // Soft close: a bid landing inside the extension window pushes the
        // end time forward so the lot cannot be sniped at the last instant.
        if now + self.time_extension > self.end_time {
            let original_end_time = self.end_time;
            self.end_time = now + self.time_extension;
            tracing::info!(
                lot_id = %self.id,
                original_end_time = %original_end_time,
                new_end_time = %self.end_time,
                user_id = %user_id,
                "auction time extended"
            );
        }

        self.current_price = amount.clone();
        self.last_bid_time = Some(now);

        Ok(Bid::new(self.id, user_id, amount, now))
    }

    pub fn start(&mut self) -> Result<(), AuctionError> {
        if self.state != LotState::Pending {
            tracing::warn!(lot_id = %self.id, state = %self.state, "cannot start lot");
            return Err(AuctionError::AlreadyStartedOrFinished);
        }
        self.state = LotState::Active;
        tracing::info!(lot_id = %self.id, end_time = %self.end_time, "auction lot started");
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), AuctionError> {
        if self.state != LotState::Active {
            tracing::warn!(lot_id = %self.id, state = %self.state, "cannot finish lot");
            return Err(AuctionError::LotNotActive);
        }
        self.state = LotState::Finished;
        tracing::info!(
            lot_id = %self.id,
            final_price = %self.current_price,
            "auction lot finished"
        );
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), AuctionError> {
        if self.state.is_terminal() {
            tracing::warn!(lot_id = %self.id, state = %self.state, "cannot cancel lot");
            return Err(AuctionError::AlreadyFinishedOrCancelled);
        }
        self.state = LotState::Cancelled;
        tracing::info!(lot_id = %self.id, "auction lot cancelled");
        Ok(())
    }
}
