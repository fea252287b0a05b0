mod bid;
mod errors;
mod lot;

pub use {
    bid::Bid,
    errors::AuctionError,
    lot::{
        AuctionLot,
        LotState,
    },
};
