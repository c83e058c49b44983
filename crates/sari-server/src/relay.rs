//! Realtime relay: authenticated WebSocket connections grouped into rooms.
//!
//! Every socket joins `user_{id}` on connect and `chat_{id}` rooms on
//! request. Events are published once on a broadcast channel and each
//! connection's send loop decides whether the event is for it. Nothing here
//! is persisted; a socket that is not connected misses the event.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{info, warn};

use sari_core::model::OnlineStatus;

use crate::error::ApiError;
use crate::session::{resolve_token, token_from_headers};
use crate::state::SharedState;
use crate::storage::now_millis;

/// Maximum broadcast channel capacity.
const BROADCAST_CAPACITY: usize = 1024;

pub fn user_room(user_id: &str) -> String {
    format!("user_{user_id}")
}

pub fn chat_room(chat_id: &str) -> String {
    format!("chat_{chat_id}")
}

/// Events a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinChat { chat_id: String },

    #[serde(rename_all = "camelCase")]
    LeaveChat { chat_id: String },

    /// Relay a message to everyone in the chat room. The rest of the
    /// payload is passed through untouched.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        chat_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },

    #[serde(rename_all = "camelCase")]
    Typing { chat_id: String, is_typing: bool },

    #[serde(rename_all = "camelCase")]
    MarkSeen { chat_id: String, message_id: String },

    UserOnline,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        chat_id: String,
        sender_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: String,
        chat_id: String,
        is_typing: bool,
    },

    #[serde(rename_all = "camelCase")]
    MessageSeen {
        message_id: String,
        chat_id: String,
        seen_by: String,
    },

    #[serde(rename_all = "camelCase")]
    UserStatus { user_id: String, status: OnlineStatus },

    /// A friend request addressed to the receiving user.
    FriendRequest { request: Value },

    /// A request the receiving user sent was accepted.
    FriendAccepted { request: Value },

    Error { message: String },
}

/// Who an event is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Room(String),
    Socket(u64),
}

/// An event plus its routing.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub target: Target,
    /// Socket that must not receive the event (usually its origin).
    pub except: Option<u64>,
    pub event: ServerEvent,
}

impl Envelope {
    /// Whether the socket `socket_id`, currently in `rooms`, gets this event.
    pub fn is_for(&self, socket_id: u64, rooms: &HashSet<String>) -> bool {
        if self.except == Some(socket_id) {
            return false;
        }
        match &self.target {
            Target::All => true,
            Target::Room(room) => rooms.contains(room),
            Target::Socket(id) => *id == socket_id,
        }
    }
}

/// Room-based fan-out hub.
pub struct Hub {
    tx: broadcast::Sender<Envelope>,
    next_socket: AtomicU64,
    /// Open socket count per user, for presence.
    connections: Mutex<HashMap<String, usize>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            next_socket: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    fn publish(&self, envelope: Envelope) {
        // No receivers just means nobody is connected.
        let _ = self.tx.send(envelope);
    }

    pub fn emit_to_room(&self, room: String, event: ServerEvent) {
        self.publish(Envelope { target: Target::Room(room), except: None, event });
    }

    pub fn emit_to_room_except(&self, room: String, except: u64, event: ServerEvent) {
        self.publish(Envelope { target: Target::Room(room), except: Some(except), event });
    }

    /// Deliver to every socket the user has open.
    pub fn emit_to_user(&self, user_id: &str, event: ServerEvent) {
        self.emit_to_room(user_room(user_id), event);
    }

    pub fn emit_to_socket(&self, socket_id: u64, event: ServerEvent) {
        self.publish(Envelope { target: Target::Socket(socket_id), except: None, event });
    }

    /// Deliver to every socket.
    pub fn broadcast(&self, event: ServerEvent) {
        self.publish(Envelope { target: Target::All, except: None, event });
    }

    /// Deliver to every socket except `except`.
    pub fn broadcast_except(&self, except: u64, event: ServerEvent) {
        self.publish(Envelope { target: Target::All, except: Some(except), event });
    }

    /// Register a new socket for `user_id`. Returns the socket id and
    /// whether this is the user's first open socket.
    pub fn connect(&self, user_id: &str) -> (u64, bool) {
        let socket_id = self.next_socket.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.lock().unwrap_or_else(|p| p.into_inner());
        let count = connections.entry(user_id.to_string()).or_insert(0);
        *count += 1;
        (socket_id, *count == 1)
    }

    /// Drop a socket. Returns whether it was the user's last one.
    pub fn disconnect(&self, user_id: &str) -> bool {
        let mut connections = self.connections.lock().unwrap_or_else(|p| p.into_inner());
        match connections.get_mut(user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                connections.remove(user_id);
                true
            }
            None => true,
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(user_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// `GET /ws`: authenticate, then upgrade. The token may come from the
/// query string, the session cookie or a bearer header.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Response {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| token_from_headers(&headers));
    let user = token.and_then(|t| resolve_token(&state, &t).ok().flatten());
    let Some(user) = user else {
        return ApiError::unauthenticated().into_response();
    };
    ws.on_upgrade(move |socket| handle_connection(socket, state, user.id))
}

/// Handle one authenticated WebSocket connection.
pub async fn handle_connection(socket: WebSocket, state: SharedState, user_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut broadcast_rx = state.hub.subscribe();

    let (socket_id, first_socket) = state.hub.connect(&user_id);
    let rooms = Arc::new(Mutex::new(HashSet::from([user_room(&user_id)])));
    info!("Socket {socket_id} connected: {user_id}");

    if first_socket {
        set_presence(&state, &user_id, socket_id, OnlineStatus::Online);
    }

    // Forward hub events meant for this socket.
    let rooms_for_send = rooms.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let envelope = match broadcast_rx.recv().await {
                Ok(envelope) => envelope,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Socket {socket_id} lagged, skipped {n} events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let deliver = {
                let rooms = rooms_for_send.lock().unwrap_or_else(|p| p.into_inner());
                envelope.is_for(socket_id, &rooms)
            };
            if !deliver {
                continue;
            }
            let Ok(json) = serde_json::to_string(&envelope.event) else {
                continue;
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Read incoming events from the client.
    let state_for_recv = state.clone();
    let user_for_recv = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        handle_client_event(&state_for_recv, &user_for_recv, socket_id, &rooms, event)
                    }
                    Err(e) => state_for_recv.hub.emit_to_socket(
                        socket_id,
                        ServerEvent::Error { message: format!("Unrecognized event: {e}") },
                    ),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Socket {socket_id} disconnected: {user_id}");
    if state.hub.disconnect(&user_id) {
        set_presence(&state, &user_id, socket_id, OnlineStatus::Offline);
    }
}

/// Apply one client event.
pub fn handle_client_event(
    state: &SharedState,
    user_id: &str,
    socket_id: u64,
    rooms: &Mutex<HashSet<String>>,
    event: ClientEvent,
) {
    let in_room = |room: &str| {
        rooms
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(room)
    };
    let not_joined = || ServerEvent::Error {
        message: "Join the chat before sending to it.".to_string(),
    };

    match event {
        ClientEvent::JoinChat { chat_id } => {
            let allowed = match state.db.get_chat(&chat_id) {
                Ok(Some(chat)) => chat.has_participant(user_id),
                Ok(None) => false,
                Err(e) => {
                    tracing::error!("Chat lookup failed: {e}");
                    false
                }
            };
            if allowed {
                rooms
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert(chat_room(&chat_id));
            } else {
                state.hub.emit_to_socket(
                    socket_id,
                    ServerEvent::Error { message: "Chat not found.".to_string() },
                );
            }
        }
        ClientEvent::LeaveChat { chat_id } => {
            rooms
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&chat_room(&chat_id));
        }
        ClientEvent::SendMessage { chat_id, mut payload } => {
            let room = chat_room(&chat_id);
            if !in_room(&room) {
                state.hub.emit_to_socket(socket_id, not_joined());
                return;
            }
            // Server-assigned fields win over anything the client sent.
            payload.remove("senderId");
            payload.remove("timestamp");
            state.hub.emit_to_room(
                room,
                ServerEvent::ReceiveMessage {
                    chat_id,
                    sender_id: user_id.to_string(),
                    payload,
                    timestamp: now_millis(),
                },
            );
        }
        ClientEvent::Typing { chat_id, is_typing } => {
            let room = chat_room(&chat_id);
            if !in_room(&room) {
                state.hub.emit_to_socket(socket_id, not_joined());
                return;
            }
            state.hub.emit_to_room_except(
                room,
                socket_id,
                ServerEvent::UserTyping {
                    user_id: user_id.to_string(),
                    chat_id,
                    is_typing,
                },
            );
        }
        ClientEvent::MarkSeen { chat_id, message_id } => {
            let room = chat_room(&chat_id);
            if !in_room(&room) {
                state.hub.emit_to_socket(socket_id, not_joined());
                return;
            }
            state.hub.emit_to_room(
                room,
                ServerEvent::MessageSeen {
                    message_id,
                    chat_id,
                    seen_by: user_id.to_string(),
                },
            );
        }
        ClientEvent::UserOnline => {
            set_presence(state, user_id, socket_id, OnlineStatus::Online);
        }
    }
}

/// Persist presence and tell every other socket about it.
fn set_presence(state: &SharedState, user_id: &str, socket_id: u64, status: OnlineStatus) {
    if let Err(e) = state.db.set_online_status(user_id, status) {
        tracing::error!("Failed to store presence for {user_id}: {e}");
    }
    state.hub.broadcast_except(
        socket_id,
        ServerEvent::UserStatus {
            user_id: user_id.to_string(),
            status,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rooms(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn error_event() -> ServerEvent {
        ServerEvent::Error { message: "x".into() }
    }

    #[test]
    fn room_targets_need_membership() {
        let env = Envelope {
            target: Target::Room(chat_room("c1")),
            except: None,
            event: error_event(),
        };
        assert!(env.is_for(1, &rooms(&["chat_c1"])));
        assert!(!env.is_for(1, &rooms(&["chat_c2", "user_u1"])));
    }

    #[test]
    fn except_excludes_origin() {
        let env = Envelope {
            target: Target::All,
            except: Some(7),
            event: error_event(),
        };
        assert!(!env.is_for(7, &rooms(&[])));
        assert!(env.is_for(8, &rooms(&[])));
    }

    #[test]
    fn socket_target_is_exact() {
        let env = Envelope {
            target: Target::Socket(3),
            except: None,
            event: error_event(),
        };
        assert!(env.is_for(3, &rooms(&[])));
        assert!(!env.is_for(4, &rooms(&[])));
    }

    #[test]
    fn presence_counts_sockets() {
        let hub = Hub::new();
        let (s1, first) = hub.connect("u1");
        assert!(first);
        let (s2, first) = hub.connect("u1");
        assert!(!first);
        assert_ne!(s1, s2);
        assert!(!hub.disconnect("u1"));
        assert!(hub.is_online("u1"));
        assert!(hub.disconnect("u1"));
        assert!(!hub.is_online("u1"));
    }

    #[test]
    fn client_events_parse() {
        let e: ClientEvent =
            serde_json::from_str(r#"{"type":"typing","chatId":"c1","isTyping":true}"#).unwrap();
        assert!(matches!(e, ClientEvent::Typing { ref chat_id, is_typing: true } if chat_id == "c1"));

        let e: ClientEvent = serde_json::from_str(
            r#"{"type":"send_message","chatId":"c1","content":"hi","kind":"text"}"#,
        )
        .unwrap();
        match e {
            ClientEvent::SendMessage { chat_id, payload } => {
                assert_eq!(chat_id, "c1");
                assert_eq!(payload.get("content"), Some(&Value::from("hi")));
                assert!(!payload.contains_key("type"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let e: ClientEvent = serde_json::from_str(r#"{"type":"user_online"}"#).unwrap();
        assert!(matches!(e, ClientEvent::UserOnline));
    }

    #[test]
    fn server_events_serialize_camel_case() {
        let json = serde_json::to_value(ServerEvent::MessageSeen {
            message_id: "m".into(),
            chat_id: "c".into(),
            seen_by: "u".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type":"message_seen","messageId":"m","chatId":"c","seenBy":"u"})
        );

        let mut payload = Map::new();
        payload.insert("content".into(), Value::from("hi"));
        let json = serde_json::to_value(ServerEvent::ReceiveMessage {
            chat_id: "c".into(),
            sender_id: "u".into(),
            payload,
            timestamp: 5,
        })
        .unwrap();
        assert_eq!(json["type"], "receive_message");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["senderId"], "u");
        assert_eq!(json["timestamp"], 5);
    }
}
