use {
    crate::{
        api::ApiState,
        auction::api::{
            initial_state_message,
            send_error_to_client,
            send_to_client,
        },
        kernel::entities::LotId,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
    },
    anyhow::anyhow,
    axum::{
        extract::{
            ws::{
                Message,
                WebSocket,
            },
            Path,
            State,
            WebSocketUpgrade,
        },
        http::StatusCode,
        response::{
            IntoResponse,
            Response,
        },
    },
    axum_prometheus::metrics,
    futures::{
        stream::{
            SplitSink,
            SplitStream,
        },
        SinkExt,
        StreamExt,
    },
    std::{
        collections::HashMap,
        sync::{
            atomic::Ordering,
            Arc,
        },
        time::Duration,
    },
    tokio::{
        sync::mpsc,
        time::{
            timeout,
            Instant,
        },
    },
};

// Time allowed to write a frame to the peer.
const WRITE_WAIT: Duration = Duration::from_secs(10);

// Inactivity deadline on the read side, refreshed by any inbound frame.
const PONG_WAIT: Duration = Duration::from_secs(60);

// Ping cadence. Must be shorter than PONG_WAIT.
const PING_PERIOD: Duration = Duration::from_millis(PONG_WAIT.as_millis() as u64 * 9 / 10);

const MAX_MESSAGE_SIZE: usize = 512;

const OUTBOUND_QUEUE_LEN: usize = 256;
const CONTROL_CHAN_LEN: usize = 64;
const BROADCAST_CHAN_LEN: usize = 1024;
const INBOUND_CHAN_LEN: usize = 1024;

pub type ClientId = usize;

/// Cheap, cloneable reference to one connected client. The hub stores the
/// outbound sender; everything else only ever needs the ids.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    pub id:            ClientId,
    pub lot_id:        LotId,
    pub(crate) outbound: mpsc::Sender<Message>,
}

impl ClientHandle {
    /// Non-blocking enqueue to this client's writer pump. A full or closed
    /// queue drops the frame; the broadcast path is responsible for evicting
    /// clients that stay full.
    pub fn send_text(&self, data: String) -> bool {
        match self.outbound.try_send(Message::Text(data)) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    client_id = self.id,
                    lot_id = %self.lot_id,
                    error = %err,
                    "client outbound queue unavailable, dropping frame"
                );
                false
            }
        }
    }
}

#[derive(Debug)]
pub struct LotBroadcast {
    pub lot_id: LotId,
    pub data:   String,
}

/// An inbound frame paired with the client that sent it. Consumed by the
/// auction message handler.
#[derive(Debug)]
pub struct InboundMessage {
    pub client: ClientHandle,
    pub data:   String,
}

/// Non-blocking sender side of the hub's channels. Every method drops the
/// item and logs when the target channel is full, so no caller can be
/// stalled by the hub.
#[derive(Clone)]
pub struct HubHandle {
    register_tx:   mpsc::Sender<ClientHandle>,
    unregister_tx: mpsc::Sender<ClientHandle>,
    broadcast_tx:  mpsc::Sender<LotBroadcast>,
    inbound_tx:    mpsc::Sender<InboundMessage>,
}

impl HubHandle {
    pub fn register(&self, client: ClientHandle) -> bool {
        let client_id = client.id;
        match self.register_tx.try_send(client) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(client_id, error = %err, "register channel full, rejecting client");
                false
            }
        }
    }

    pub fn unregister(&self, client: ClientHandle) {
        let client_id = client.id;
        if let Err(err) = self.unregister_tx.try_send(client) {
            tracing::error!(client_id, error = %err, "unregister channel full, dropping request");
        }
    }

    pub fn broadcast_to_lot(&self, lot_id: LotId, data: String) {
        if let Err(err) = self.broadcast_tx.try_send(LotBroadcast { lot_id, data }) {
            tracing::error!(lot_id = %lot_id, error = %err, "broadcast channel full, dropping update");
        }
    }

    pub fn send_inbound(&self, message: InboundMessage) {
        let client_id = message.client.id;
        if let Err(err) = self.inbound_tx.try_send(message) {
            tracing::warn!(client_id, error = %err, "inbound channel full, dropping frame");
        }
    }
}

/// Owns the registry of connections grouped by lot. All mutations happen on
/// the hub task in response to channel messages; nothing else ever touches
/// the registry.
pub struct Hub {
    pub(crate) clients: HashMap<LotId, HashMap<ClientId, mpsc::Sender<Message>>>,
    register_rx:        mpsc::Receiver<ClientHandle>,
    unregister_rx:      mpsc::Receiver<ClientHandle>,
    pub(crate) broadcast_rx: mpsc::Receiver<LotBroadcast>,
}

impl Hub {
    pub fn new() -> (Hub, HubHandle, mpsc::Receiver<InboundMessage>) {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_CHAN_LEN);
        let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_CHAN_LEN);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_CHAN_LEN);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHAN_LEN);
        (
            Hub {
                clients: HashMap::new(),
                register_rx,
                unregister_rx,
                broadcast_rx,
            },
            HubHandle {
                register_tx,
                unregister_tx,
                broadcast_tx,
                inbound_tx,
            },
            inbound_rx,
        )
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!("WebSocket hub started");
        let mut exit_check_interval = tokio::time::interval(EXIT_CHECK_INTERVAL);
        loop {
            tokio::select! {
                maybe_client = self.register_rx.recv() => {
                    let client = maybe_client.ok_or_else(|| anyhow!("hub register channel closed"))?;
                    self.handle_register(client);
                }
                maybe_client = self.unregister_rx.recv() => {
                    let client = maybe_client.ok_or_else(|| anyhow!("hub unregister channel closed"))?;
                    self.handle_unregister(&client);
                }
                maybe_message = self.broadcast_rx.recv() => {
                    let message = maybe_message.ok_or_else(|| anyhow!("hub broadcast channel closed"))?;
                    self.handle_broadcast(&message);
                }
                _ = exit_check_interval.tick() => {
                    if SHOULD_EXIT.load(Ordering::Acquire) {
                        // Dropping the senders closes every writer pump.
                        self.clients.clear();
                        tracing::info!("WebSocket hub shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn handle_register(&mut self, client: ClientHandle) {
        let group = self.clients.entry(client.lot_id).or_default();
        group.insert(client.id, client.outbound);
        metrics::gauge!("ws_connected_clients").increment(1.0);
        tracing::info!(
            client_id = client.id,
            lot_id = %client.lot_id,
            lot_subscribers = group.len(),
            "client registered"
        );
    }

    fn handle_unregister(&mut self, client: &ClientHandle) {
        if let Some(group) = self.clients.get_mut(&client.lot_id) {
            if group.remove(&client.id).is_some() {
                metrics::gauge!("ws_connected_clients").decrement(1.0);
                tracing::info!(
                    client_id = client.id,
                    lot_id = %client.lot_id,
                    "client unregistered"
                );
            }
            if group.is_empty() {
                self.clients.remove(&client.lot_id);
                tracing::debug!(lot_id = %client.lot_id, "empty lot group removed");
            }
        }
    }

    fn handle_broadcast(&mut self, message: &LotBroadcast) {
        let Some(group) = self.clients.get_mut(&message.lot_id) else {
            return;
        };
        // Non-blocking per recipient. A client whose queue is full is
        // evicted on the spot instead of stalling the rest of the group.
        group.retain(|client_id, sender| {
            match sender.try_send(Message::Text(message.data.clone())) {
                Ok(()) => true,
                Err(err) => {
                    metrics::gauge!("ws_connected_clients").decrement(1.0);
                    tracing::warn!(
                        client_id,
                        lot_id = %message.lot_id,
                        error = %err,
                        "failed to deliver broadcast, evicting client"
                    );
                    false
                }
            }
        });
        if group.is_empty() {
            self.clients.remove(&message.lot_id);
        }
    }
}

pub async fn ws_route_handler(
    ws: WebSocketUpgrade,
    Path(lot_id): Path<String>,
    State(state): State<Arc<ApiState>>,
) -> Response {
    let lot_id: LotId = match lot_id.parse() {
        Ok(lot_id) => lot_id,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid lot id").into_response(),
    };
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| websocket_handler(socket, lot_id, state))
        .into_response()
}

async fn websocket_handler(stream: WebSocket, lot_id: LotId, state: Arc<ApiState>) {
    let client_id = state.client_counter.fetch_add(1, Ordering::SeqCst);
    let (outbound_sender, outbound_receiver) = mpsc::channel(OUTBOUND_QUEUE_LEN);
    let (ws_sender, ws_receiver) = stream.split();
    let client = ClientHandle {
        id:       client_id,
        lot_id,
        outbound: outbound_sender,
    };

    if !state.hub.register(client.clone()) {
        return;
    }

    // The first frame a subscriber sees is the current snapshot of its lot.
    match state.service.get_lot_state(lot_id).await {
        Ok(snapshot) => send_to_client(&client, &initial_state_message(&snapshot)),
        Err(err) => send_error_to_client(&client, &err.to_string()),
    }

    let writer = tokio::spawn(write_pump(client_id, lot_id, outbound_receiver, ws_sender));
    read_pump(client.clone(), ws_receiver, state.hub.clone()).await;

    // The hub drops the outbound sender, which lets the writer drain and
    // close the socket.
    state.hub.unregister(client);
    if let Err(err) = writer.await {
        tracing::debug!(client_id, error = ?err, "write pump terminated abnormally");
    }
}

async fn read_pump(client: ClientHandle, mut receiver: SplitStream<WebSocket>, hub: HubHandle) {
    let mut deadline = Instant::now() + PONG_WAIT;
    let mut exit_check_interval = tokio::time::interval(EXIT_CHECK_INTERVAL);
    loop {
        tokio::select! {
            maybe_message = receiver.next() => {
                let message = match maybe_message {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => {
                        tracing::debug!(client_id = client.id, error = %err, "websocket read error");
                        return;
                    }
                    None => return,
                };
                deadline = Instant::now() + PONG_WAIT;
                match message {
                    Message::Text(text) => hub.send_inbound(InboundMessage {
                        client: client.clone(),
                        data:   text,
                    }),
                    Message::Binary(data) => match String::from_utf8(data) {
                        Ok(text) => hub.send_inbound(InboundMessage {
                            client: client.clone(),
                            data:   text,
                        }),
                        Err(_) => tracing::debug!(
                            client_id = client.id,
                            "dropping non-utf8 binary frame"
                        ),
                    },
                    Message::Close(_) => {
                        tracing::debug!(client_id = client.id, "client closed connection");
                        return;
                    }
                    // Axum answers pings itself; both directions refresh the
                    // deadline above.
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(client_id = client.id, "heartbeat deadline missed, closing");
                return;
            }
            _ = exit_check_interval.tick() => {
                if SHOULD_EXIT.load(Ordering::Acquire) {
                    return;
                }
            }
        }
    }
}

async fn write_pump(
    client_id: ClientId,
    lot_id: LotId,
    mut outbound: mpsc::Receiver<Message>,
    mut sender: SplitSink<WebSocket, Message>,
) {
    let mut ping_interval = tokio::time::interval(PING_PERIOD);
    let mut exit_check_interval = tokio::time::interval(EXIT_CHECK_INTERVAL);
    loop {
        tokio::select! {
            maybe_message = outbound.recv() => {
                match maybe_message {
                    Some(message) => {
                        match timeout(WRITE_WAIT, sender.send(message)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => {
                                tracing::debug!(client_id, lot_id = %lot_id, error = %err, "websocket write failed");
                                return;
                            }
                            Err(_) => {
                                tracing::warn!(client_id, lot_id = %lot_id, "websocket write deadline missed");
                                return;
                            }
                        }
                    }
                    None => {
                        // Queue closed by the hub; say goodbye properly.
                        let _ = timeout(WRITE_WAIT, sender.send(Message::Close(None))).await;
                        return;
                    }
                }
            }
            _ = ping_interval.tick() => {
                match timeout(WRITE_WAIT, sender.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {}
                    _ => {
                        tracing::debug!(client_id, lot_id = %lot_id, "failed to write ping");
                        return;
                    }
                }
            }
            _ = exit_check_interval.tick() => {
                if SHOULD_EXIT.load(Ordering::Acquire) {
                    let _ = timeout(WRITE_WAIT, sender.send(Message::Close(None))).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        uuid::Uuid,
    };

    fn test_client(
        id: ClientId,
        lot_id: LotId,
        capacity: usize,
    ) -> (ClientHandle, mpsc::Receiver<Message>) {
        let (outbound, receiver) = mpsc::channel(capacity);
        (
            ClientHandle {
                id,
                lot_id,
                outbound,
            },
            receiver,
        )
    }

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber_of_the_lot() {
        let (mut hub, _handle, _inbound) = Hub::new();
        let lot_a = Uuid::new_v4();
        let lot_b = Uuid::new_v4();
        let (first, mut first_rx) = test_client(1, lot_a, 8);
        let (second, mut second_rx) = test_client(2, lot_a, 8);
        let (other, mut other_rx) = test_client(3, lot_b, 8);
        hub.handle_register(first);
        hub.handle_register(second);
        hub.handle_register(other);

        hub.handle_broadcast(&LotBroadcast {
            lot_id: lot_a,
            data:   "update".to_string(),
        });

        assert_eq!(text(first_rx.try_recv().unwrap()), "update");
        assert_eq!(text(second_rx.try_recv().unwrap()), "update");
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted_without_disturbing_the_rest() {
        let (mut hub, _handle, _inbound) = Hub::new();
        let lot_id = Uuid::new_v4();
        let (fast, mut fast_rx) = test_client(1, lot_id, 8);
        let (slow, mut slow_rx) = test_client(2, lot_id, 1);
        hub.handle_register(fast);
        hub.handle_register(slow);

        for i in 0..3 {
            hub.handle_broadcast(&LotBroadcast {
                lot_id,
                data: format!("update-{i}"),
            });
        }

        // The fast client saw everything, in order.
        for i in 0..3 {
            assert_eq!(text(fast_rx.try_recv().unwrap()), format!("update-{i}"));
        }
        // The slow client got the first frame, then was evicted and its
        // queue closed.
        assert_eq!(text(slow_rx.try_recv().unwrap()), "update-0");
        assert!(slow_rx.recv().await.is_none());
        assert_eq!(hub.clients[&lot_id].len(), 1);
    }

    #[tokio::test]
    async fn unregister_drops_the_client_and_empty_groups() {
        let (mut hub, _handle, _inbound) = Hub::new();
        let lot_id = Uuid::new_v4();
        let (client, mut receiver) = test_client(1, lot_id, 8);
        hub.handle_register(client.clone());
        assert_eq!(hub.clients.len(), 1);

        hub.handle_unregister(&client);
        drop(client);
        assert!(hub.clients.is_empty());
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn broadcast_to_unknown_lot_is_a_no_op() {
        let (mut hub, _handle, _inbound) = Hub::new();
        hub.handle_broadcast(&LotBroadcast {
            lot_id: Uuid::new_v4(),
            data:   "update".to_string(),
        });
        assert!(hub.clients.is_empty());
    }

    #[tokio::test]
    async fn handle_methods_are_reachable_through_the_channels() {
        let (mut hub, handle, mut inbound_rx) = Hub::new();
        let lot_id = Uuid::new_v4();
        let (client, mut receiver) = test_client(7, lot_id, 8);

        assert!(handle.register(client.clone()));
        let registered = hub.register_rx.recv().await.unwrap();
        hub.handle_register(registered);

        handle.broadcast_to_lot(lot_id, "update".to_string());
        let broadcast = hub.broadcast_rx.recv().await.unwrap();
        hub.handle_broadcast(&broadcast);
        assert_eq!(text(receiver.try_recv().unwrap()), "update");

        handle.send_inbound(InboundMessage {
            client: client.clone(),
            data:   "frame".to_string(),
        });
        assert_eq!(inbound_rx.recv().await.unwrap().data, "frame");

        handle.unregister(client);
        let unregistered = hub.unregister_rx.recv().await.unwrap();
        hub.handle_unregister(&unregistered);
        assert!(hub.clients.is_empty());
    }
}
