use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use farewell_companion::auth::supabase::{SupabaseAuth, AUTH_SESSION_KEY};
use farewell_companion::auth::AuthProvider;
use farewell_companion::config::SupabaseConfig;
use farewell_companion::db::kv_store::{KeyValueStore, MemoryKvStore};
use farewell_companion::errors::NETWORK_FAILURE_TEXT;

const ANON_KEY: &str = "anon-key";

#[derive(Clone, Default)]
struct GoTrue {
    logouts: Arc<AtomicUsize>,
    refreshes: Arc<AtomicUsize>,
}

fn session(token: &str, expires_in: i64, email: &str, display_name: &str) -> Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": expires_in,
        "refresh_token": "refresh-1",
        "user": {
            "id": "0b7d7a5e-8c1e-4f2a-9d3b-5e6f7a8b9c0d",
            "email": email,
            "user_metadata": { "display_name": display_name }
        }
    })
}

fn reply(status: StatusCode, body: Value) -> (StatusCode, String) {
    (status, body.to_string())
}

async fn signup(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, String) {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(ANON_KEY) {
        return reply(StatusCode::UNAUTHORIZED, json!({ "message": "No API key found in request" }));
    }
    if body["password"].as_str().unwrap_or("").len() < 6 {
        return reply(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "code": 422, "msg": "Password should be at least 6 characters" }),
        );
    }
    let email = body["email"].as_str().unwrap_or("");
    let name = body["data"]["display_name"].as_str().unwrap_or("");
    reply(StatusCode::OK, session("access-1", 3600, email, name))
}

async fn token(
    State(gotrue): State<GoTrue>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    match params.get("grant_type").map(String::as_str) {
        Some("password") if body["password"] == "correct-horse" => {
            let email = body["email"].as_str().unwrap_or("");
            let expires_in = if email.starts_with("expiring") { 0 } else { 3600 };
            reply(StatusCode::OK, session("access-1", expires_in, email, "x"))
        }
        Some("password") => reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" }),
        ),
        Some("refresh_token") if body["refresh_token"] == "refresh-1" => {
            gotrue.refreshes.fetch_add(1, Ordering::SeqCst);
            reply(StatusCode::OK, session("access-2", 3600, "expiring@example.com", "x"))
        }
        _ => reply(StatusCode::BAD_REQUEST, json!({ "error": "unsupported_grant_type" })),
    }
}

async fn logout(State(gotrue): State<GoTrue>, headers: HeaderMap) -> StatusCode {
    assert_eq!(
        headers.get("authorization").and_then(|v| v.to_str().ok()),
        Some("Bearer access-1")
    );
    gotrue.logouts.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn spawn_gotrue() -> (GoTrue, SupabaseConfig) {
    let gotrue = GoTrue::default();
    let app = Router::new()
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(logout))
        .with_state(gotrue.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let config = SupabaseConfig { url: format!("http://{addr}"), anon_key: ANON_KEY.into() };
    (gotrue, config)
}

#[tokio::test]
async fn register_defaults_display_name_and_signs_in() {
    let (_, config) = spawn_gotrue().await;
    let auth = SupabaseAuth::connect(&config, Arc::new(MemoryKvStore::new())).await.unwrap();

    let resp = auth.register("xiaoyu@example.com", "secret-pw", None).await;
    assert!(resp.success);
    assert_eq!(resp.user.unwrap().display_name.as_deref(), Some("xiaoyu"));
    assert_eq!(auth.current_token().await.as_deref(), Some("access-1"));
}

#[tokio::test]
async fn weak_password_error_is_passed_through() {
    let (_, config) = spawn_gotrue().await;
    let auth = SupabaseAuth::connect(&config, Arc::new(MemoryKvStore::new())).await.unwrap();

    let resp = auth.register("xiaoyu@example.com", "123", Some("小雨")).await;
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("Password should be at least 6 characters"));
    assert!(auth.current_user().await.is_none());
}

#[tokio::test]
async fn bad_credentials_leave_anonymous_mode() {
    let (_, config) = spawn_gotrue().await;
    let auth = SupabaseAuth::connect(&config, Arc::new(MemoryKvStore::new())).await.unwrap();

    let resp = auth.login("xiaoyu@example.com", "wrong").await;
    assert_eq!(resp.error.as_deref(), Some("Invalid login credentials"));
    assert_eq!(auth.current_token().await, None);
}

#[tokio::test]
async fn session_survives_restart_and_logout_clears_it() {
    let (gotrue, config) = spawn_gotrue().await;
    let store = Arc::new(MemoryKvStore::new());

    let auth = SupabaseAuth::connect(&config, store.clone()).await.unwrap();
    assert!(auth.login("xiaoyu@example.com", "correct-horse").await.success);
    assert!(store.get(AUTH_SESSION_KEY).await.unwrap().is_some());

    let restarted = SupabaseAuth::connect(&config, store.clone()).await.unwrap();
    assert_eq!(
        restarted.current_user().await.and_then(|u| u.email).as_deref(),
        Some("xiaoyu@example.com")
    );

    assert!(restarted.logout().await.success);
    assert_eq!(gotrue.logouts.load(Ordering::SeqCst), 1);
    assert!(restarted.current_user().await.is_none());
    assert!(store.get(AUTH_SESSION_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_token_is_refreshed_once() {
    let (gotrue, config) = spawn_gotrue().await;
    let auth = SupabaseAuth::connect(&config, Arc::new(MemoryKvStore::new())).await.unwrap();

    assert!(auth.login("expiring@example.com", "correct-horse").await.success);
    assert_eq!(auth.current_token().await.as_deref(), Some("access-2"));
    assert_eq!(auth.current_token().await.as_deref(), Some("access-2"));
    assert_eq!(gotrue.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_provider_reports_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let config = SupabaseConfig { url, anon_key: ANON_KEY.into() };
    let auth = SupabaseAuth::connect(&config, Arc::new(MemoryKvStore::new())).await.unwrap();
    let resp = auth.login("xiaoyu@example.com", "correct-horse").await;
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some(NETWORK_FAILURE_TEXT));
}
