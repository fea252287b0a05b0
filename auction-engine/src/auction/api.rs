use {
    crate::{
        api::ws::{
            ClientHandle,
            InboundMessage,
        },
        auction::service::{
            get_lot_state::LotSnapshot,
            place_bid::PlaceBidInput,
            Service,
        },
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
    },
    anyhow::anyhow,
    auction_engine_api_types::ws::{
        ClientBid,
        ClientJoinLot,
        ClientMessage,
        Envelope,
        InitialState,
        LotUpdate,
        ServerMessage,
    },
    axum_prometheus::metrics,
    bigdecimal::ToPrimitive,
    sqlx::types::BigDecimal,
    std::sync::atomic::Ordering,
    tokio::sync::mpsc,
};

/// Single consumer of the hub's inbound channel. Every frame is handled on
/// its own tracked task so a slow bid cannot head-of-line-block the rest.
pub async fn run_message_loop(
    service: Service,
    mut inbound: mpsc::Receiver<InboundMessage>,
) -> anyhow::Result<()> {
    tracing::info!("Auction message handler started");
    let mut exit_check_interval = tokio::time::interval(EXIT_CHECK_INTERVAL);
    while !SHOULD_EXIT.load(Ordering::Acquire) {
        tokio::select! {
            maybe_message = inbound.recv() => {
                let message = maybe_message.ok_or_else(|| anyhow!("hub inbound channel closed"))?;
                service.task_tracker.spawn({
                    let service = service.clone();
                    async move { process_message(service, message).await }
                });
            }
            _ = exit_check_interval.tick() => {}
        }
    }
    tracing::info!("Shutting down auction message handler...");
    Ok(())
}

async fn process_message(service: Service, message: InboundMessage) {
    match serde_json::from_str::<ClientMessage>(&message.data) {
        Ok(ClientMessage::Bid(payload)) => {
            handle_client_bid(service, &message.client, payload).await
        }
        Ok(ClientMessage::JoinLot(payload)) => {
            handle_join_lot(service, &message.client, payload).await
        }
        Err(_) => send_error_to_client(&message.client, &parse_failure_reason(&message.data)),
    }
}

fn parse_failure_reason(data: &str) -> String {
    let reason = match serde_json::from_str::<Envelope>(data) {
        Err(_) => "invalid message format",
        Ok(envelope) if envelope.kind == "client_bid" => "invalid bid message format",
        Ok(envelope) if envelope.kind == "client_join_lot" => "invalid join message format",
        Ok(_) => "unknown message type",
    };
    reason.to_string()
}

async fn handle_client_bid(service: Service, client: &ClientHandle, payload: ClientBid) {
    // A connection may only bid on the lot it subscribed to.
    if payload.lot_id != client.lot_id {
        tracing::warn!(
            client_id = client.id,
            subscribed = %client.lot_id,
            requested = %payload.lot_id,
            "bid rejected, lot id mismatch"
        );
        send_error_to_client(client, "lot id mismatch");
        return;
    }

    if let Err(err) = service
        .place_bid(PlaceBidInput {
            lot_id:  payload.lot_id,
            user_id: payload.user_id,
            amount:  payload.amount,
        })
        .await
    {
        metrics::counter!("bids_rejected_total").increment(1);
        send_error_to_client(client, &err.to_string());
        return;
    }

    let snapshot = match service.get_lot_state(payload.lot_id).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::error!(
                error = %err,
                lot_id = %payload.lot_id,
                "failed to load lot state after accepted bid"
            );
            send_error_to_client(client, "failed to load updated lot state");
            return;
        }
    };
    match serde_json::to_string(&lot_update_message(&snapshot)) {
        Ok(data) => service.hub.broadcast_to_lot(payload.lot_id, data),
        Err(err) => tracing::error!(error = %err, "failed to serialize lot update"),
    }
}

async fn handle_join_lot(service: Service, client: &ClientHandle, payload: ClientJoinLot) {
    if payload.lot_id != client.lot_id {
        send_error_to_client(client, "lot id mismatch");
        return;
    }
    match service.get_lot_state(payload.lot_id).await {
        Ok(snapshot) => send_to_client(client, &initial_state_message(&snapshot)),
        Err(err) => send_error_to_client(client, &err.to_string()),
    }
}

pub fn send_to_client(client: &ClientHandle, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(data) => {
            client.send_text(data);
        }
        Err(err) => tracing::error!(error = %err, "failed to serialize server message"),
    }
}

pub fn send_error_to_client(client: &ClientHandle, error: &str) {
    send_to_client(
        client,
        &ServerMessage::Error {
            error: error.to_string(),
        },
    );
}

fn wire_amount(amount: &BigDecimal) -> f64 {
    amount.to_f64().unwrap_or_default()
}

pub fn initial_state_message(snapshot: &LotSnapshot) -> ServerMessage {
    ServerMessage::InitialState(InitialState {
        lot_id:           snapshot.lot_id,
        title:            snapshot.title.clone(),
        description:      snapshot.description.clone(),
        initial_price:    wire_amount(&snapshot.initial_price),
        current_price:    wire_amount(&snapshot.current_price),
        end_time:         snapshot.end_time,
        state:            snapshot.state.to_string(),
        last_bid_amount:  snapshot.last_bid_amount.as_ref().map(wire_amount),
        last_bid_user_id: snapshot.last_bid_user_id,
        last_bid_time:    snapshot.last_bid_time,
    })
}

pub fn lot_update_message(snapshot: &LotSnapshot) -> ServerMessage {
    ServerMessage::LotUpdate(LotUpdate {
        lot_id:           snapshot.lot_id,
        current_price:    wire_amount(&snapshot.current_price),
        end_time:         snapshot.end_time,
        state:            snapshot.state.to_string(),
        last_bid_amount:  snapshot.last_bid_amount.as_ref().map(wire_amount),
        last_bid_user_id: snapshot.last_bid_user_id,
        last_bid_time:    snapshot.last_bid_time,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::auction::{
            entities::{
                AuctionLot,
                Bid,
            },
            repository::MockDatabase,
            service::tests::{
                active_lot,
                service_with_mock,
                try_recv_broadcast,
                TestHarness,
            },
        },
        axum::extract::ws::Message,
        std::sync::{
            Arc,
            Mutex,
        },
        time::OffsetDateTime,
        uuid::Uuid,
    };

    fn wire_client(
        lot_id: Uuid,
    ) -> (ClientHandle, mpsc::Receiver<Message>) {
        let (outbound, receiver) = mpsc::channel(16);
        (
            ClientHandle {
                id: 1,
                lot_id,
                outbound,
            },
            receiver,
        )
    }

    fn recv_server_message(receiver: &mut mpsc::Receiver<Message>) -> ServerMessage {
        match receiver.try_recv().expect("expected a frame") {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    fn assert_error(receiver: &mut mpsc::Receiver<Message>, expected: &str) {
        match recv_server_message(receiver) {
            ServerMessage::Error { error } => assert_eq!(error, expected),
            other => panic!("expected server_error, got {other:?}"),
        }
    }

    fn bid_frame(lot_id: Uuid, user_id: Uuid, amount: f64) -> String {
        serde_json::to_string(&ClientMessage::Bid(ClientBid {
            lot_id,
            user_id,
            amount,
        }))
        .unwrap()
    }

    /// Mock whose reads and commits share one stored lot, as the real
    /// tables would.
    fn storage_backed_harness(lot: AuctionLot) -> (TestHarness, Arc<Mutex<AuctionLot>>) {
        let lot_storage = Arc::new(Mutex::new(lot));
        let bid_storage: Arc<Mutex<Vec<Bid>>> = Arc::new(Mutex::new(Vec::new()));
        let mut db = MockDatabase::new();
        let reads = lot_storage.clone();
        db.expect_get_lot()
            .returning(move |_| Ok(reads.lock().unwrap().clone()));
        let lot_writes = lot_storage.clone();
        let bid_writes = bid_storage.clone();
        db.expect_commit_bid().returning(move |bid, lot| {
            *lot_writes.lock().unwrap() = lot.clone();
            bid_writes.lock().unwrap().push(bid.clone());
            Ok(())
        });
        let latest = bid_storage.clone();
        db.expect_get_latest_bid()
            .returning(move |_| Ok(latest.lock().unwrap().last().cloned()));
        (service_with_mock(db), lot_storage)
    }

    #[tokio::test]
    async fn valid_bid_is_broadcast_to_the_lot_group() {
        let lot_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let (mut harness, storage) =
            storage_backed_harness(active_lot(lot_id, 5000, time::Duration::seconds(600)));
        let (client, mut client_rx) = wire_client(lot_id);

        process_message(
            harness.service.clone(),
            InboundMessage {
                client,
                data: bid_frame(lot_id, user_id, 5100.0),
            },
        )
        .await;

        let broadcast = try_recv_broadcast(&mut harness.hub).expect("update broadcast");
        assert_eq!(broadcast.lot_id, lot_id);
        match serde_json::from_str::<ServerMessage>(&broadcast.data).unwrap() {
            ServerMessage::LotUpdate(update) => {
                assert_eq!(update.current_price, 5100.0);
                assert_eq!(update.state, "active");
                assert_eq!(update.last_bid_user_id, Some(user_id));
                assert_eq!(update.last_bid_amount, Some(5100.0));
            }
            other => panic!("expected lot update, got {other:?}"),
        }
        // No direct reply to the bidder; it learns from the broadcast.
        assert!(client_rx.try_recv().is_err());
        assert_eq!(
            storage.lock().unwrap().current_price,
            BigDecimal::from(5100)
        );
    }

    #[tokio::test]
    async fn low_bid_is_answered_with_an_error_and_no_broadcast() {
        let lot_id = Uuid::new_v4();
        let (mut harness, storage) =
            storage_backed_harness(active_lot(lot_id, 5000, time::Duration::seconds(600)));
        let (client, mut client_rx) = wire_client(lot_id);

        process_message(
            harness.service.clone(),
            InboundMessage {
                client,
                data: bid_frame(lot_id, Uuid::new_v4(), 4999.99),
            },
        )
        .await;

        assert_error(&mut client_rx, "bid amount is too low");
        assert!(try_recv_broadcast(&mut harness.hub).is_none());
        assert_eq!(
            storage.lock().unwrap().current_price,
            BigDecimal::from(5000)
        );
    }

    #[tokio::test]
    async fn lot_id_mismatch_never_reaches_the_use_case() {
        let subscribed_lot = Uuid::new_v4();
        let other_lot = Uuid::new_v4();
        // Any storage call would panic this mock.
        let mut harness = service_with_mock(MockDatabase::new());
        let (client, mut client_rx) = wire_client(subscribed_lot);

        process_message(
            harness.service.clone(),
            InboundMessage {
                client,
                data: bid_frame(other_lot, Uuid::new_v4(), 5100.0),
            },
        )
        .await;

        assert_error(&mut client_rx, "lot id mismatch");
        assert!(try_recv_broadcast(&mut harness.hub).is_none());
    }

    #[tokio::test]
    async fn join_lot_gets_the_snapshot_as_a_direct_reply() {
        let lot_id = Uuid::new_v4();
        let (harness, _storage) =
            storage_backed_harness(active_lot(lot_id, 5000, time::Duration::seconds(600)));
        let (client, mut client_rx) = wire_client(lot_id);

        process_message(
            harness.service.clone(),
            InboundMessage {
                client,
                data: serde_json::to_string(&ClientMessage::JoinLot(ClientJoinLot { lot_id }))
                    .unwrap(),
            },
        )
        .await;

        match recv_server_message(&mut client_rx) {
            ServerMessage::InitialState(state) => {
                assert_eq!(state.lot_id, lot_id);
                assert_eq!(state.current_price, 5000.0);
                assert_eq!(state.title, "Amber brooch");
            }
            other => panic!("expected initial state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_classified() {
        let lot_id = Uuid::new_v4();
        let harness = service_with_mock(MockDatabase::new());

        let cases = [
            ("not json at all", "invalid message format"),
            (r#"{"payload":{}}"#, "invalid message format"),
            (
                r#"{"type":"client_bid","payload":{"amount":"high"}}"#,
                "invalid bid message format",
            ),
            (
                r#"{"type":"client_teleport","payload":{}}"#,
                "unknown message type",
            ),
        ];
        for (raw, expected) in cases {
            let (client, mut client_rx) = wire_client(lot_id);
            process_message(
                harness.service.clone(),
                InboundMessage {
                    client,
                    data: raw.to_string(),
                },
            )
            .await;
            assert_error(&mut client_rx, expected);
        }
    }
}
