use thiserror::Error;

/// Everything that can go wrong while arbitrating a bid or moving a lot
/// through its lifecycle. Domain errors are surfaced to the offending client
/// only; `TemporarilyUnavailable` stands in for any storage failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuctionError {
    #[error("auction lot not found")]
    LotNotFound,
    #[error("auction lot is not active")]
    LotNotActive,
    #[error("auction lot has already ended")]
    LotFinished,
    #[error("bid amount is too low")]
    BidTooLow,
    #[error("bid increment is too small")]
    IncrementTooSmall,
    #[error("bid amount must be greater than zero")]
    InvalidAmount,
    #[error("auction lot is already started or finished")]
    AlreadyStartedOrFinished,
    #[error("auction lot is already finished or cancelled")]
    AlreadyFinishedOrCancelled,
    #[error("the auction service is temporarily unavailable")]
    TemporarilyUnavailable,
}
