use {
    crate::{
        LotId,
        UserId,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    time::OffsetDateTime,
};

/// Envelope shared by every frame on the wire. Used to classify a frame
/// whose payload failed to parse.
#[derive(Deserialize, Debug, Clone)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "client_bid")]
    Bid(ClientBid),
    #[serde(rename = "client_join_lot")]
    JoinLot(ClientJoinLot),
}

/// A bid placed by a client on the lot its connection is subscribed to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientBid {
    pub lot_id:  LotId,
    pub user_id: UserId,
    pub amount:  f64,
}

/// Explicit request for a fresh snapshot of the subscribed lot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientJoinLot {
    pub lot_id: LotId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "server_initial_state")]
    InitialState(InitialState),
    #[serde(rename = "server_lot_update")]
    LotUpdate(LotUpdate),
    #[serde(rename = "server_error")]
    Error { error: String },
    #[serde(rename = "server_info")]
    Info { message: String },
}

/// Full snapshot of a lot, sent to a single client when it joins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InitialState {
    pub lot_id:           LotId,
    pub title:            String,
    pub description:      String,
    pub initial_price:    f64,
    pub current_price:    f64,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time:         OffsetDateTime,
    pub state:            String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bid_amount:  Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bid_user_id: Option<UserId>,
    #[serde(
        default,
        with = "crate::serde::nullable_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_bid_time:    Option<OffsetDateTime>,
}

/// Incremental update broadcast to every subscriber of a lot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LotUpdate {
    pub lot_id:           LotId,
    pub current_price:    f64,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time:         OffsetDateTime,
    pub state:            String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bid_amount:  Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bid_user_id: Option<UserId>,
    #[serde(
        default,
        with = "crate::serde::nullable_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_bid_time:    Option<OffsetDateTime>,
}
