use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{AuthProvider, AuthResponse, AuthUser};
use crate::config::SupabaseConfig;
use crate::db::kv_store::KeyValueStore;
use crate::errors::AppError;

pub const AUTH_SESSION_KEY: &str = "auth_session";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredSession {
    access_token: String,
    refresh_token: Option<String>,
    /// Unix seconds.
    expires_at: Option<i64>,
    user: AuthUser,
}

impl StoredSession {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at - EXPIRY_MARGIN_SECS <= now)
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl From<GoTrueUser> for AuthUser {
    fn from(u: GoTrueUser) -> Self {
        let display_name = u
            .user_metadata
            .get("display_name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self { id: u.id, email: u.email, display_name }
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: GoTrueUser,
}

impl GoTrueSession {
    fn into_stored(self, now: i64) -> StoredSession {
        let expires_at = self.expires_at.or(self.expires_in.map(|secs| now + secs));
        StoredSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Email/password auth against a Supabase (GoTrue) project.
pub struct SupabaseAuth {
    client: Client,
    url: String,
    anon_key: String,
    store: Arc<dyn KeyValueStore>,
    session: Mutex<Option<StoredSession>>,
}

impl SupabaseAuth {
    /// Builds the provider and restores any session persisted by a previous run.
    pub async fn connect(
        config: &SupabaseConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Unexpected(format!("Failed to build HTTP client: {e}")))?;

        let restored = match store.get(AUTH_SESSION_KEY).await? {
            Some(raw) => serde_json::from_str::<StoredSession>(&raw)
                .inspect_err(|e| warn!("Discarding unreadable auth session: {e}"))
                .ok(),
            None => None,
        };
        if let Some(s) = &restored {
            info!("Restored auth session for {}", s.user.email.as_deref().unwrap_or(&s.user.id));
        }

        Ok(Self {
            client,
            url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            store,
            session: Mutex::new(restored),
        })
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
        token: Option<&str>,
    ) -> Result<serde_json::Value, AppError> {
        let url = format!("{}{path}", self.url);
        let mut builder = self.client.post(&url).header("apikey", &self.anon_key).json(&body);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        let resp = builder.send().await.map_err(|e| AppError::from_transport(&url, e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| AppError::from_transport(&url, e))?;

        if !status.is_success() {
            return Err(AppError::Auth(
                provider_error(&text).unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            ));
        }
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| AppError::MalformedResponse { url, message: e.to_string() })
    }

    async fn store_session(&self, session: Option<StoredSession>) -> Result<(), AppError> {
        match &session {
            Some(s) => {
                let raw = serde_json::to_string(s)
                    .map_err(|e| AppError::Unexpected(format!("Failed to encode session: {e}")))?;
                self.store.set(AUTH_SESSION_KEY, &raw).await?;
            }
            None => self.store.remove(AUTH_SESSION_KEY).await?,
        }
        *self.session.lock().await = session;
        Ok(())
    }

    async fn accept_session(&self, value: serde_json::Value) -> Result<AuthUser, AppError> {
        let session: GoTrueSession = serde_json::from_value(value).map_err(|e| {
            AppError::MalformedResponse { url: self.url.clone(), message: e.to_string() }
        })?;
        let stored = session.into_stored(Utc::now().timestamp());
        let user = stored.user.clone();
        self.store_session(Some(stored)).await?;
        Ok(user)
    }

    async fn try_register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Option<AuthUser>, AppError> {
        let display_name = display_name
            .map(str::to_string)
            .unwrap_or_else(|| default_display_name(email));
        let value = self
            .post(
                "/auth/v1/signup",
                json!({ "email": email, "password": password, "data": { "display_name": display_name } }),
                None,
            )
            .await?;

        // With email confirmation on, signup returns the bare user and no session.
        if value.get("access_token").is_some() {
            return self.accept_session(value).await.map(Some);
        }
        let user = value.get("user").cloned().unwrap_or(value);
        Ok(serde_json::from_value::<GoTrueUser>(user).ok().map(AuthUser::from))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredSession, AppError> {
        let value = self
            .post(
                "/auth/v1/token?grant_type=refresh_token",
                json!({ "refresh_token": refresh_token }),
                None,
            )
            .await?;
        self.accept_session(value).await?;
        self.session
            .lock()
            .await
            .clone()
            .ok_or(AppError::NotAuthenticated)
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> AuthResponse {
        info!("Registering user {email}");
        match self.try_register(email, password, display_name).await {
            Ok(user) => AuthResponse::ok(user),
            Err(e) => {
                error!("Registration failed for {email}: {e}");
                AuthResponse::failed(&e)
            }
        }
    }

    async fn login(&self, email: &str, password: &str) -> AuthResponse {
        info!("Signing in {email}");
        let result = match self
            .post(
                "/auth/v1/token?grant_type=password",
                json!({ "email": email, "password": password }),
                None,
            )
            .await
        {
            Ok(value) => self.accept_session(value).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(user) => AuthResponse::ok(Some(user)),
            Err(e) => {
                error!("Sign-in failed for {email}: {e}");
                AuthResponse::failed(&e)
            }
        }
    }

    async fn logout(&self) -> AuthResponse {
        let token = self.session.lock().await.as_ref().map(|s| s.access_token.clone());
        let remote = match token {
            Some(token) => self.post("/auth/v1/logout", json!({}), Some(&token)).await.map(|_| ()),
            None => Ok(()),
        };
        // the local session goes away even if the server call failed
        let local = self.store_session(None).await;

        match remote.and(local) {
            Ok(()) => {
                info!("Signed out");
                AuthResponse::ok(None)
            }
            Err(e) => {
                error!("Sign-out failed: {e}");
                AuthResponse::failed(&e)
            }
        }
    }

    async fn current_user(&self) -> Option<AuthUser> {
        self.session.lock().await.as_ref().map(|s| s.user.clone())
    }

    async fn current_token(&self) -> Option<String> {
        let session = self.session.lock().await.clone()?;
        if !session.is_expired(Utc::now().timestamp()) {
            return Some(session.access_token);
        }
        let refresh_token = session.refresh_token?;
        match self.refresh(&refresh_token).await {
            Ok(refreshed) => Some(refreshed.access_token),
            Err(e) => {
                warn!("Token refresh failed, continuing anonymously: {e}");
                None
            }
        }
    }
}

fn default_display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

/// GoTrue reports errors under several keys depending on the endpoint.
fn provider_error(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
