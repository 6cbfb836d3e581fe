//! SketchRoom WebSocket Relay Server
//!
//! Relays canvas mutations between clients joined to the same canvas.
//!
//! ## Protocol
//!
//! Frames are JSON objects tagged by `type`, each carrying the sender's
//! `originator`:
//! ```json
//! { "type": "join", "canvasId": "c1", "originator": "tab-1" }
//! { "type": "element-create", "canvasId": "c1", "element": { ... }, "originator": "tab-1" }
//! ```
//! Mutations are broadcast to every peer in the room, the sender included,
//! stamped with `createdBy`/`updatedBy`/`deletedBy`.

mod room;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header::AUTHORIZATION},
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use room::CanvasRoom;
use serde::Deserialize;
use sketchroom_core::sync::{ClientMessage, OutboundFrame, RoomUser, ServerMessage};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_ADDR: &str = "0.0.0.0:3030";

/// A broadcast tagged with the connection that caused it.
type RoomEvent = (String, ServerMessage);

struct Room {
    tx: broadcast::Sender<RoomEvent>,
    state: CanvasRoom,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            state: CanvasRoom::new(),
        }
    }
}

/// Shared application state
struct AppState {
    rooms: DashMap<String, Room>,
}

impl AppState {
    fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to a room, returning its receiver and snapshot.
    fn join_room(
        &self,
        canvas_id: &str,
        peer_id: &str,
        user: RoomUser,
    ) -> (broadcast::Receiver<RoomEvent>, ServerMessage) {
        let mut room = self
            .rooms
            .entry(canvas_id.to_string())
            .or_insert_with(Room::new);
        let user_id = user.user_id.clone();
        let name = user.name.clone();
        let first = room.state.join(peer_id, user);
        let rx = room.tx.subscribe();
        let snapshot = room.state.snapshot();
        let users = ServerMessage::RoomUsers {
            users: room.state.users(),
        };
        let _ = room.tx.send((peer_id.to_string(), users));
        if first {
            let _ = room
                .tx
                .send((peer_id.to_string(), ServerMessage::UserJoined { user_id, name }));
        }
        (rx, snapshot)
    }

    /// Remove a connection, dropping the room once empty.
    fn leave_room(&self, canvas_id: &str, peer_id: &str) {
        let Some(mut room) = self.rooms.get_mut(canvas_id) else {
            return;
        };
        if let Some(user_id) = room.state.leave(peer_id) {
            let _ = room
                .tx
                .send((peer_id.to_string(), ServerMessage::UserLeft { user_id }));
        }
        let users = ServerMessage::RoomUsers {
            users: room.state.users(),
        };
        let _ = room.tx.send((peer_id.to_string(), users));
        if room.state.is_empty() {
            drop(room);
            self.rooms.remove(canvas_id);
        }
    }

    /// Apply a frame to its room. Returns an error meant for the sender only.
    fn apply(
        &self,
        canvas_id: &str,
        peer_id: &str,
        user_id: &str,
        frame: OutboundFrame,
    ) -> Option<ServerMessage> {
        let mut room = self.rooms.get_mut(canvas_id)?;
        match room.state.apply(frame.message, frame.originator, user_id) {
            Ok(Some(message)) => {
                let _ = room.tx.send((peer_id.to_string(), message));
                None
            }
            Ok(None) => None,
            Err(err) => Some(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
    name: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchroom_relay=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = match std::env::var("SKETCHROOM_RELAY_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid SKETCHROOM_RELAY_ADDR: {}", e);
            std::process::exit(2);
        }
    };

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("SketchRoom relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Cannot bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}

/// Index page
async fn index() -> &'static str {
    "SketchRoom Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// The bearer credential is an opaque user reference.
fn user_reference(headers: &HeaderMap, params: &ConnectParams) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| params.token.clone())
        .filter(|token| !token.is_empty())
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let peer_id = Uuid::new_v4().to_string();
    let user = RoomUser {
        user_id: user_reference(&headers, &params).unwrap_or_else(|| peer_id.clone()),
        name: params.name,
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer_id, user))
}

async fn send_json(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!("Cannot encode {}: {}", message.kind(), e);
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, peer_id: String, user: RoomUser) {
    info!("New connection: {} (user {})", peer_id, user.user_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<String> = None;
    let mut room_rx: Option<broadcast::Receiver<RoomEvent>> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match serde_json::from_str::<OutboundFrame>(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                let err = ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                    code: Some("invalid-message".to_string()),
                                };
                                if !send_json(&mut sender, &err).await {
                                    break;
                                }
                                continue;
                            }
                        };
                        let canvas_id = frame.message.canvas_id().to_string();
                        if matches!(frame.message, ClientMessage::Join { .. }) {
                            if let Some(old) = current_room.take() {
                                state.leave_room(&old, &peer_id);
                            }
                            let (rx, snapshot) = state.join_room(&canvas_id, &peer_id, user.clone());
                            room_rx = Some(rx);
                            current_room = Some(canvas_id.clone());
                            if !send_json(&mut sender, &snapshot).await {
                                break;
                            }
                            info!("Peer {} joined canvas {}", peer_id, canvas_id);
                            continue;
                        }
                        if current_room.as_deref() != Some(canvas_id.as_str()) {
                            debug!("Peer {} sent {} for unjoined canvas {}", peer_id, frame.message.kind(), canvas_id);
                            let err = ServerMessage::Error {
                                message: format!("not joined to canvas {}", canvas_id),
                                code: Some("not-joined".to_string()),
                            };
                            if !send_json(&mut sender, &err).await {
                                break;
                            }
                            continue;
                        }
                        if let Some(err) = state.apply(&canvas_id, &peer_id, &user.user_id, frame) {
                            if !send_json(&mut sender, &err).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary and ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => std::future::pending::<Option<RoomEvent>>().await,
                }
            } => {
                if let Some((from, server_msg)) = msg {
                    // Cursor moves are not echoed; mutations are.
                    if from == peer_id && matches!(server_msg, ServerMessage::CursorUpdated { .. }) {
                        continue;
                    }
                    if !send_json(&mut sender, &server_msg).await {
                        break;
                    }
                }
            }
        }
    }

    if let Some(ref room) = current_room {
        state.leave_room(room, &peer_id);
    }
    info!("Connection closed: {}", peer_id);
}
