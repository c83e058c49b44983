//! Realtime relay tests: WebSocket handshake, rooms and presence.

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use common::{TestServer, TestUser, start_server};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &TestServer, user: &TestUser) -> Socket {
    let url = format!("ws://{}/ws?token={}", server.addr, user.token);
    let (mut socket, _) = connect_async(url).await.expect("ws connect");
    // The upgrade completes before the server subscribes the socket; any
    // reply proves the subscription is live.
    send(&mut socket, json!({ "type": "ping" })).await;
    next_event(&mut socket, "error").await;
    socket
}

async fn send(socket: &mut Socket, event: Value) {
    socket
        .send(Message::Text(event.to_string().into()))
        .await
        .expect("ws send");
}

/// Wait for the next event of the given type, skipping others.
async fn next_event(socket: &mut Socket, kind: &str) -> Value {
    let wait = async {
        while let Some(msg) = socket.next().await {
            let msg = msg.expect("ws frame");
            let Ok(text) = msg.to_text() else { continue };
            let Ok(event) = serde_json::from_str::<Value>(text) else { continue };
            if event["type"] == kind {
                return event;
            }
        }
        panic!("socket closed while waiting for {kind}");
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
}

/// Join a chat room and wait until the join has taken effect, using a
/// relayed message to ourselves as the acknowledgement.
async fn join(socket: &mut Socket, chat_id: &str) {
    send(socket, json!({ "type": "join_chat", "chatId": chat_id })).await;
    send(
        socket,
        json!({ "type": "send_message", "chatId": chat_id, "content": "__joined__" }),
    )
    .await;
    loop {
        let event = next_event(socket, "receive_message").await;
        if event["content"] == "__joined__" {
            break;
        }
    }
}

async fn chat_between(server: &TestServer, a: &TestUser, b: &TestUser) -> String {
    let (status, chat) = server
        .post_json("/chat/get-or-create", Some(&a.token), json!({ "friendId": b.id }))
        .await;
    assert_eq!(status, 200);
    chat["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn handshake_requires_valid_token() {
    let server = start_server().await;

    let err = connect_async(format!("ws://{}/ws?token=forged", server.addr))
        .await
        .expect_err("forged token accepted");
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status().as_u16(), 401),
        other => panic!("unexpected error: {other}"),
    }

    let err = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .expect_err("missing token accepted");
    assert!(matches!(err, tokio_tungstenite::tungstenite::Error::Http(_)));
}

#[tokio::test]
async fn messages_relay_within_chat_room() {
    let server = start_server().await;
    let ana = server.register("Ana", "ana@example.com", "password").await;
    let bo = server.register("Bo", "bo@example.com", "password").await;
    let chat_id = chat_between(&server, &ana, &bo).await;

    let mut ana_ws = connect(&server, &ana).await;
    let mut bo_ws = connect(&server, &bo).await;
    join(&mut ana_ws, &chat_id).await;
    join(&mut bo_ws, &chat_id).await;

    send(
        &mut ana_ws,
        json!({ "type": "send_message", "chatId": chat_id, "content": "hello", "senderId": "spoofed" }),
    )
    .await;
    let event = loop {
        let event = next_event(&mut bo_ws, "receive_message").await;
        if event["content"] == "hello" {
            break event;
        }
    };
    assert_eq!(event["chatId"], chat_id.as_str());
    assert_eq!(event["senderId"], ana.id.as_str());
    assert!(event["timestamp"].as_u64().unwrap() > 0);

    send(&mut ana_ws, json!({ "type": "typing", "chatId": chat_id, "isTyping": true })).await;
    let typing = next_event(&mut bo_ws, "user_typing").await;
    assert_eq!(typing["userId"], ana.id.as_str());
    assert_eq!(typing["isTyping"], true);

    send(
        &mut bo_ws,
        json!({ "type": "mark_seen", "chatId": chat_id, "messageId": "m1" }),
    )
    .await;
    let seen = next_event(&mut ana_ws, "message_seen").await;
    assert_eq!(seen["seenBy"], bo.id.as_str());
    assert_eq!(seen["messageId"], "m1");
}

#[tokio::test]
async fn outsiders_cannot_join_or_send() {
    let server = start_server().await;
    let ana = server.register("Ana", "ana@example.com", "password").await;
    let bo = server.register("Bo", "bo@example.com", "password").await;
    let cy = server.register("Cy", "cy@example.com", "password").await;
    let chat_id = chat_between(&server, &ana, &bo).await;

    let mut cy_ws = connect(&server, &cy).await;
    send(&mut cy_ws, json!({ "type": "join_chat", "chatId": chat_id })).await;
    let err = next_event(&mut cy_ws, "error").await;
    assert_eq!(err["message"], "Chat not found.");

    send(
        &mut cy_ws,
        json!({ "type": "send_message", "chatId": chat_id, "content": "sneaky" }),
    )
    .await;
    let err = next_event(&mut cy_ws, "error").await;
    assert!(err["message"].as_str().unwrap().contains("Join the chat"));

    send(&mut cy_ws, json!({ "type": "no_such_event" })).await;
    next_event(&mut cy_ws, "error").await;
}

#[tokio::test]
async fn presence_follows_connections() {
    let server = start_server().await;
    let ana = server.register("Ana", "ana@example.com", "password").await;
    let bo = server.register("Bo", "bo@example.com", "password").await;

    let mut ana_ws = connect(&server, &ana).await;
    let bo_ws = connect(&server, &bo).await;

    let online = loop {
        let event = next_event(&mut ana_ws, "user_status").await;
        if event["userId"] == bo.id.as_str() {
            break event;
        }
    };
    assert_eq!(online["status"], "online");
    let (_, profile) = server.get(&format!("/user/{}", bo.id), &ana.token).await;
    assert_eq!(profile["onlineStatus"], "online");

    drop(bo_ws);
    let offline = loop {
        let event = next_event(&mut ana_ws, "user_status").await;
        if event["userId"] == bo.id.as_str() && event["status"] == "offline" {
            break event;
        }
    };
    assert_eq!(offline["status"], "offline");
    let (_, profile) = server.get(&format!("/user/{}", bo.id), &ana.token).await;
    assert_eq!(profile["onlineStatus"], "offline");
}

#[tokio::test]
async fn logout_with_open_socket_keeps_presence() {
    let server = start_server().await;
    let ana = server.register("Ana", "ana@example.com", "password").await;
    let bo = server.register("Bo", "bo@example.com", "password").await;

    let _ana_ws = connect(&server, &ana).await;
    let (_, profile) = server.get(&format!("/user/{}", ana.id), &bo.token).await;
    assert_eq!(profile["onlineStatus"], "online");

    let (status, _) = server.post_json("/auth/logout", Some(&ana.token), json!({})).await;
    assert_eq!(status, 200);
    let (_, profile) = server.get(&format!("/user/{}", ana.id), &bo.token).await;
    assert_eq!(profile["onlineStatus"], "online");
}

#[tokio::test]
async fn friend_events_reach_user_rooms() {
    let server = start_server().await;
    let ana = server.register("Ana", "ana@example.com", "password").await;
    let bo = server.register("Bo", "bo@example.com", "password").await;

    let mut ana_ws = connect(&server, &ana).await;
    let mut bo_ws = connect(&server, &bo).await;

    let (_, request) = server
        .post_json("/friends/request", Some(&ana.token), json!({ "recipientId": bo.id }))
        .await;
    let event = next_event(&mut bo_ws, "friend_request").await;
    assert_eq!(event["request"]["id"], request["id"]);
    assert_eq!(event["request"]["requester"]["id"], ana.id.as_str());

    let request_id = request["id"].as_str().unwrap();
    server
        .put_json(&format!("/friends/accept/{request_id}"), &bo.token, json!({}))
        .await;
    let event = next_event(&mut ana_ws, "friend_accepted").await;
    assert_eq!(event["request"]["status"], "accepted");
}
