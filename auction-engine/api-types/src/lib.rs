use uuid::Uuid;

pub mod serde;
pub mod ws;

pub type LotId = Uuid;
pub type UserId = Uuid;
