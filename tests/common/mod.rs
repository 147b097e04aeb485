#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use farewell_companion::api::ApiClient;
use farewell_companion::auth::AuthProvider;
use farewell_companion::connection::ConnectionResolver;
use farewell_companion::service::chat_gateway::ChatGateway;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum HealthMode {
    Healthy,
    Unavailable,
    Garbage,
    /// Accepts the request and never answers in time.
    Hanging,
}

/// Longer than any client timeout used in the tests.
pub const HANG: Duration = Duration::from_secs(30);

/// In-process stand-in for the companion backend.
#[derive(Clone)]
pub struct FakeBackend {
    pub health_calls: Arc<AtomicUsize>,
    pub chat_calls: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<Value>>>,
    pub auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    health_mode: Arc<Mutex<HealthMode>>,
    chat_hangs: Arc<AtomicBool>,
    replies: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
}

impl FakeBackend {
    pub fn new(mode: HealthMode) -> Self {
        Self {
            health_calls: Arc::new(AtomicUsize::new(0)),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            auth_headers: Arc::new(Mutex::new(Vec::new())),
            health_mode: Arc::new(Mutex::new(mode)),
            chat_hangs: Arc::new(AtomicBool::new(false)),
            replies: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queues a successful chat reply.
    pub fn reply(&self, message: &str, ready: bool, suggestions: &[&str]) {
        let body = json!({
            "message": message,
            "session_id": "echo",
            "suggestions": suggestions,
            "is_completion_ready": ready,
        });
        self.replies.lock().unwrap().push_back((StatusCode::OK, body.to_string()));
    }

    /// Queues an arbitrary raw reply.
    pub fn reply_raw(&self, status: StatusCode, body: &str) {
        self.replies.lock().unwrap().push_back((status, body.to_string()));
    }

    pub fn set_health(&self, mode: HealthMode) {
        *self.health_mode.lock().unwrap() = mode;
    }

    /// Makes every later `/api/chat` call stall past the request timeout.
    pub fn hang_chat(&self) {
        self.chat_hangs.store(true, Ordering::SeqCst);
    }

    pub fn health_count(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn chat_count(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Value {
        self.requests.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }

    /// Serves on an ephemeral local port and returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/api/health", get(health))
            .route("/api/chat", post(chat))
            .route("/api/farewell/guidance", post(guidance))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn health(State(backend): State<FakeBackend>) -> (StatusCode, String) {
    backend.health_calls.fetch_add(1, Ordering::SeqCst);
    let mode = *backend.health_mode.lock().unwrap();
    match mode {
        HealthMode::Healthy => (
            StatusCode::OK,
            json!({ "status": "healthy", "version": "1.0.0" }).to_string(),
        ),
        HealthMode::Unavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "status": "down" }).to_string(),
        ),
        HealthMode::Garbage => (StatusCode::OK, "<html>captive portal</html>".to_string()),
        HealthMode::Hanging => {
            tokio::time::sleep(HANG).await;
            (StatusCode::OK, json!({ "status": "healthy" }).to_string())
        }
    }
}

async fn chat(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    backend.chat_calls.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    backend.auth_headers.lock().unwrap().push(auth);
    let session_id = body["session_id"].clone();
    backend.requests.lock().unwrap().push(body);
    if backend.chat_hangs.load(Ordering::SeqCst) {
        tokio::time::sleep(HANG).await;
    }

    let queued = backend.replies.lock().unwrap().pop_front();
    queued.unwrap_or_else(|| {
        (
            StatusCode::OK,
            json!({
                "message": "我在听。",
                "session_id": session_id,
                "suggestions": [],
                "is_completion_ready": false,
            })
            .to_string(),
        )
    })
}

async fn guidance(Json(body): Json<Value>) -> (StatusCode, String) {
    let reply = json!({
        "guidance_text": format!("慢慢来，和{}好好告别。", body["farewell_name"].as_str().unwrap_or("")),
        "farewell_type": body["farewell_type"],
        "farewell_name": body["farewell_name"],
        "timestamp": "2024-01-20T10:00:00Z",
    });
    (StatusCode::OK, reply.to_string())
}

/// A local URL nothing is listening on.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(2);

pub fn api_client() -> ApiClient {
    ApiClient::new(PROBE_TIMEOUT, CHAT_TIMEOUT).unwrap()
}

pub fn resolver(default_url: &str, fallbacks: &[&str]) -> Arc<ConnectionResolver> {
    Arc::new(ConnectionResolver::new(
        default_url,
        fallbacks.iter().map(|s| s.to_string()),
        Arc::new(api_client()),
    ))
}

pub fn gateway(base: &str, auth: Option<Arc<dyn AuthProvider>>) -> ChatGateway {
    ChatGateway::new(api_client(), resolver(base, &[]), auth)
}
