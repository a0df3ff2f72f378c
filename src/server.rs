use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::constants::{OUTBOUND_QUEUE_LEN, TICK_MS};
use crate::error::RoomError;
use crate::registry::RoomRegistry;
use crate::room::{TickScheduler, Ticker};
use crate::server_protocol::{parse_client_message, ClientIntent, Dispatch, ServerEvent};
use crate::server_utils::make_id;
use crate::types::{ConnectionId, RoomId};

pub type SharedState = Arc<Mutex<ServerState>>;

struct ClientContext {
    tx: mpsc::Sender<String>,
    /// Dropped together with the context, which wakes the socket reader.
    _evicted: oneshot::Sender<()>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

/// Everything the connection handlers and tick tasks share. One lock guards
/// it, so intents and ticks never interleave.
pub struct ServerState {
    clients: HashMap<ConnectionId, ClientContext>,
    registry: RoomRegistry,
}

impl ServerState {
    pub fn new(registry: RoomRegistry) -> Self {
        Self {
            clients: HashMap::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// The returned receiver resolves once the client is removed from the
    /// state, whether by its own disconnect or by eviction.
    fn register_client(
        &mut self,
        client_id: &str,
        tx: mpsc::Sender<String>,
    ) -> oneshot::Receiver<()> {
        let (evicted_tx, evicted_rx) = oneshot::channel();
        self.clients.insert(
            client_id.to_string(),
            ClientContext {
                tx,
                _evicted: evicted_tx,
            },
        );
        evicted_rx
    }

    fn is_registered(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }
}

pub fn shared_state(registry: RoomRegistry) -> SharedState {
    Arc::new(Mutex::new(ServerState::new(registry)))
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Closes every room and stops their tick tasks.
pub async fn shutdown_rooms(state: &SharedState) -> usize {
    let mut guard = state.lock().await;
    guard.registry.shutdown()
}

async fn healthz(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(json!({ "ok": true, "rooms": guard.registry.room_count() }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_LEN);
    let mut evicted = state.lock().await.register_client(&client_id, tx);
    info!(connection = %client_id, "client connected");

    // The client context holds the only sender, so the writer drains and
    // closes the socket as soon as the client leaves the state.
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                return;
            }
        }
        let frame = CloseFrame {
            code: close_code::POLICY,
            reason: "connection closed by server".to_string().into(),
        };
        let _ = ws_sender.send(Message::Close(Some(frame))).await;
    });

    loop {
        let received = tokio::select! {
            received = ws_receiver.next() => received,
            _ = &mut evicted => {
                info!(connection = %client_id, "closing evicted client");
                break;
            }
        };
        let Some(Ok(message)) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&state, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(&state, &client_id, &text).await;
                } else {
                    send_error(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(&state, &client_id).await;
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) {
    let parsed = parse_client_message(raw);
    let mut guard = state.lock().await;
    if !guard.is_registered(client_id) {
        debug!(connection = client_id, "ignored message from evicted client");
        return;
    }

    let result = match parsed {
        Err(err) => {
            warn!(connection = client_id, error = %err, "rejected client message");
            Err(RoomError::from(err))
        }
        Ok(ClientIntent::CreateRoom { skin_id }) => {
            Ok(guard.registry.create_room(client_id, skin_id).dispatches)
        }
        Ok(ClientIntent::JoinRoom(request)) => {
            let mut scheduler = RoomTickScheduler {
                state: state.clone(),
            };
            guard
                .registry
                .join_room(client_id, &request, &mut scheduler)
                .map(|outcome| outcome.dispatches)
        }
        Ok(ClientIntent::PlayerInput(input)) => guard
            .registry
            .apply_input(client_id, &input)
            .map(|_| Vec::new()),
    };

    let dispatches = result.unwrap_or_else(|err| {
        debug!(connection = client_id, error = %err, "intent failed");
        vec![Dispatch::one(client_id, ServerEvent::error(&err))]
    });
    deliver(&mut guard, dispatches);
}

async fn handle_disconnect(state: &SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    let dispatches = disconnect_client_internal(&mut guard, client_id);
    deliver(&mut guard, dispatches);
    info!(connection = client_id, "client disconnected");
}

async fn send_error(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    deliver(
        &mut guard,
        vec![Dispatch::one(
            client_id,
            ServerEvent::Error {
                message: message.to_string(),
            },
        )],
    );
}

/// Forgets the client and frees its seat. The seat is released even when the
/// client entry is already gone, so no room outlives its connection.
fn disconnect_client_internal(state: &mut ServerState, client_id: &str) -> Vec<Dispatch> {
    state.clients.remove(client_id);
    state
        .registry
        .disconnect(client_id)
        .map(|outcome| outcome.dispatches)
        .unwrap_or_default()
}

/// Sends dispatches to their connections. A client whose queue rejects a
/// must-arrive event is disconnected, and the resulting leave notifications
/// are delivered in the same pass.
fn deliver(state: &mut ServerState, dispatches: Vec<Dispatch>) {
    let mut pending: VecDeque<Dispatch> = dispatches.into();
    while let Some(dispatch) = pending.pop_front() {
        let payload = match dispatch.event.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to encode server event");
                continue;
            }
        };
        let policy = if dispatch.event.droppable() {
            QueuePolicy::DropOnFull
        } else {
            QueuePolicy::DisconnectOnFull
        };

        let mut failed_clients = Vec::new();
        for client_id in &dispatch.to {
            let Some(client) = state.clients.get(client_id) else {
                continue;
            };
            if client.tx.try_send(payload.clone()).is_err() {
                match policy {
                    QueuePolicy::DropOnFull => {
                        debug!(connection = %client_id, "dropped snapshot for slow client");
                    }
                    QueuePolicy::DisconnectOnFull => failed_clients.push(client_id.clone()),
                }
            }
        }

        for client_id in failed_clients {
            warn!(connection = %client_id, "outbound queue full, disconnecting");
            pending.extend(disconnect_client_internal(state, &client_id));
        }
    }
}

/// Spawns one tokio task per running room.
struct RoomTickScheduler {
    state: SharedState,
}

impl TickScheduler for RoomTickScheduler {
    fn schedule(&mut self, room_id: &str) -> Ticker {
        let task = tokio::spawn(run_room_ticks(self.state.clone(), room_id.to_string()));
        Ticker::new(task.abort_handle())
    }
}

async fn run_room_ticks(state: SharedState, room_id: RoomId) {
    let period = Duration::from_millis(TICK_MS);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(room = %room_id, "tick loop started");

    loop {
        interval.tick().await;
        let mut guard = state.lock().await;
        let Some(dispatches) = guard.registry.tick_room(&room_id) else {
            break;
        };
        deliver(&mut guard, dispatches);
    }
    debug!(room = %room_id, "tick loop stopped");
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::registry::RegistryOptions;
    use crate::types::RoomStatus;

    fn test_state() -> SharedState {
        shared_state(RoomRegistry::new(RegistryOptions { seed: Some(11) }))
    }

    async fn connect(
        state: &SharedState,
        client_id: &str,
        capacity: usize,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(capacity);
        state.lock().await.register_client(client_id, tx);
        rx
    }

    fn next_json(rx: &mut mpsc::Receiver<String>) -> Value {
        let raw = rx.try_recv().expect("a queued message");
        serde_json::from_str(&raw).expect("valid json")
    }

    /// Skips snapshots until an event of `kind` shows up.
    async fn wait_for(rx: &mut mpsc::Receiver<String>, kind: &str) -> Value {
        let deadline = Duration::from_secs(2);
        tokio::time::timeout(deadline, async {
            loop {
                let raw = rx.recv().await.expect("channel open");
                let value: Value = serde_json::from_str(&raw).expect("valid json");
                if value["type"] == kind {
                    return value;
                }
            }
        })
        .await
        .expect("event arrived in time")
    }

    async fn create(state: &SharedState, rx: &mut mpsc::Receiver<String>) -> String {
        handle_client_message(state, "c1", r#"{"type":"createRoom","skinId":0}"#).await;
        let created = next_json(rx);
        assert_eq!(created["type"], "roomCreated");
        created["roomId"].as_str().expect("room id").to_string()
    }

    #[tokio::test]
    async fn create_room_acknowledges_creator() {
        let state = test_state();
        let mut rx = connect(&state, "c1", 16).await;

        let room_id = create(&state, &mut rx).await;

        let joined = next_json(&mut rx);
        assert_eq!(joined["type"], "joinedRoom");
        assert_eq!(joined["roomId"], room_id.as_str());
        assert_eq!(joined["playerId"], "c1");
        assert_eq!(joined["role"], "p1");

        let initial = next_json(&mut rx);
        assert_eq!(initial["type"], "gameState");
        assert_eq!(initial["players"]["c1"]["x"], 5);
    }

    #[tokio::test]
    async fn full_match_lifecycle() {
        let state = test_state();
        let mut rx1 = connect(&state, "c1", 64).await;
        let mut rx2 = connect(&state, "c2", 64).await;
        let room_id = create(&state, &mut rx1).await;

        let join = json!({ "type": "joinRoom", "roomId": room_id, "skinId": 1 }).to_string();
        handle_client_message(&state, "c2", &join).await;

        let joined = next_json(&mut rx2);
        assert_eq!(joined["role"], "p2");
        assert_eq!(next_json(&mut rx2)["playerCount"], 2);
        assert_eq!(next_json(&mut rx2)["type"], "gameStart");
        assert_eq!(
            state.lock().await.registry().room_status(&room_id),
            Some(RoomStatus::Running)
        );

        wait_for(&mut rx1, "gameStart").await;
        let tick = wait_for(&mut rx1, "gameState").await;
        assert_eq!(tick["players"]["c2"]["skinId"], 1);

        handle_disconnect(&state, "c1").await;
        wait_for(&mut rx2, "playerLeft").await;
        assert_eq!(state.lock().await.registry().room_count(), 1);

        handle_disconnect(&state, "c2").await;
        assert_eq!(state.lock().await.registry().room_count(), 0);
    }

    #[tokio::test]
    async fn errors_go_only_to_sender() {
        let state = test_state();
        let mut rx1 = connect(&state, "c1", 16).await;
        let mut rx2 = connect(&state, "c2", 16).await;
        create(&state, &mut rx1).await;
        while rx1.try_recv().is_ok() {}

        handle_client_message(&state, "c2", r#"{"type":"joinRoom","roomId":"QQQQQQ"}"#).await;
        let error = next_json(&mut rx2);
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "Room not found");

        handle_client_message(&state, "c2", "{not json").await;
        assert_eq!(next_json(&mut rx2)["type"], "error");

        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_disconnects_and_closes_room() {
        let state = test_state();
        let _rx = connect(&state, "c1", 1).await;

        handle_client_message(&state, "c1", r#"{"type":"createRoom"}"#).await;

        let guard = state.lock().await;
        assert_eq!(guard.registry().room_count(), 0);
        assert!(!guard.clients.contains_key("c1"));
    }

    #[tokio::test]
    async fn evicted_client_is_closed_and_ignored() {
        let state = test_state();
        let (tx, mut rx) = mpsc::channel(1);
        let mut evicted = state.lock().await.register_client("c1", tx);

        handle_client_message(&state, "c1", r#"{"type":"createRoom"}"#).await;
        assert_eq!(
            evicted.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        );
        assert_eq!(next_json(&mut rx)["type"], "roomCreated");
        assert!(rx.recv().await.is_none());

        handle_client_message(&state, "c1", r#"{"type":"createRoom"}"#).await;
        assert_eq!(state.lock().await.registry().room_count(), 0);

        handle_disconnect(&state, "c1").await;
        assert_eq!(state.lock().await.registry().room_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_frees_seat_without_client_entry() {
        let state = test_state();
        let mut rx1 = connect(&state, "c1", 16).await;
        create(&state, &mut rx1).await;
        state.lock().await.clients.remove("c1");

        handle_disconnect(&state, "c1").await;
        assert_eq!(state.lock().await.registry().room_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_rooms_releases_everything() {
        let state = test_state();
        let mut rx1 = connect(&state, "c1", 64).await;
        let _rx2 = connect(&state, "c2", 64).await;
        let room_id = create(&state, &mut rx1).await;
        let join = json!({ "type": "joinRoom", "roomId": room_id }).to_string();
        handle_client_message(&state, "c2", &join).await;

        assert_eq!(shutdown_rooms(&state).await, 1);
        assert_eq!(state.lock().await.registry().room_count(), 0);
    }
}
