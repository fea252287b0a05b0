use uuid::Uuid;

pub type LotId = Uuid;
pub type UserId = Uuid;
pub type BidId = Uuid;
