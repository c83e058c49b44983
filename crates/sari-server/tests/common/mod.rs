//! Shared harness: a server on an ephemeral port backed by an in-memory
//! database, plus helpers that drive the signup flow.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::oneshot;

use sari_server::config::Config;
use sari_server::state::{AppState, SharedState};
use sari_server::storage::Storage;

pub struct TestServer {
    pub base: String,
    pub addr: SocketAddr,
    pub state: SharedState,
    pub client: reqwest::Client,
    pub upload_dir: PathBuf,
    _shutdown: oneshot::Sender<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.upload_dir);
    }
}

/// A verified account and its session token.
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
}

pub async fn start_server() -> TestServer {
    let upload_dir = std::env::temp_dir().join(format!("sari-test-{}", uuid::Uuid::new_v4()));
    let config = Config::for_tests(upload_dir.clone());
    let db = Storage::open_in_memory().expect("open db");
    let state = Arc::new(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("local addr");
    let router = sari_server::app(state.clone());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        base: format!("http://{addr}"),
        addr,
        state,
        client: reqwest::Client::new(),
        upload_dir,
        _shutdown: shutdown_tx,
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// The OTP currently stored for a pending account.
    pub fn stored_otp(&self, user_id: &str) -> String {
        self.state
            .db
            .get_user(user_id)
            .expect("query user")
            .expect("user exists")
            .otp_code
            .expect("otp stored")
    }

    pub async fn post_json(&self, path: &str, token: Option<&str>, body: Value) -> (u16, Value) {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        send(req).await
    }

    pub async fn put_json(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        send(self.client.put(self.url(path)).bearer_auth(token).json(&body)).await
    }

    pub async fn get(&self, path: &str, token: &str) -> (u16, Value) {
        send(self.client.get(self.url(path)).bearer_auth(token)).await
    }

    pub async fn post_form(&self, path: &str, token: &str, form: reqwest::multipart::Form) -> (u16, Value) {
        send(self.client.post(self.url(path)).bearer_auth(token).multipart(form)).await
    }

    pub async fn put_form(&self, path: &str, token: &str, form: reqwest::multipart::Form) -> (u16, Value) {
        send(self.client.put(self.url(path)).bearer_auth(token).multipart(form)).await
    }

    /// Sign up and verify, returning the session.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> TestUser {
        let (status, body) = self
            .post_json(
                "/auth/signup",
                None,
                json!({ "name": name, "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, 200, "signup failed: {body}");
        let id = body["userId"].as_str().expect("userId").to_string();

        let otp = self.stored_otp(&id);
        let (status, body) = self
            .post_json("/auth/verify-otp", None, json!({ "userId": id, "otp": otp }))
            .await;
        assert_eq!(status, 200, "verify failed: {body}");
        TestUser {
            id,
            email: email.to_string(),
            token: body["token"].as_str().expect("token").to_string(),
        }
    }

    /// Make two users friends.
    pub async fn befriend(&self, a: &TestUser, b: &TestUser) {
        let (status, body) = self
            .post_json("/friends/request", Some(&a.token), json!({ "recipientId": b.id }))
            .await;
        assert_eq!(status, 200, "request failed: {body}");
        let request_id = body["id"].as_str().expect("request id").to_string();
        let (status, body) = self
            .put_json(&format!("/friends/accept/{request_id}"), &b.token, json!({}))
            .await;
        assert_eq!(status, 200, "accept failed: {body}");
    }
}

async fn send(req: reqwest::RequestBuilder) -> (u16, Value) {
    let resp = req.send().await.expect("request sent");
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}
