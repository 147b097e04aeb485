use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::connection::HealthProbe;
use crate::errors::AppError;
use crate::models::{ChatRequest, ChatResponse, GuidanceRequest, GuidanceResponse};

pub const HEALTH_PATH: &str = "/api/health";
pub const CHAT_PATH: &str = "/api/chat";
pub const GUIDANCE_PATH: &str = "/api/farewell/guidance";

/// Thin JSON client for the companion backend. The base URL is passed per call
/// because it is owned by the connection resolver, not by the client.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    probe_timeout: Duration,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(probe_timeout: Duration, request_timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Unexpected(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, probe_timeout, request_timeout })
    }

    /// `GET {base}/api/health`. Any JSON body counts as healthy.
    pub async fn health(&self, base: &str) -> Result<serde_json::Value, AppError> {
        let url = format!("{base}{HEALTH_PATH}");
        debug!("API request: GET {url}");
        let resp = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| AppError::from_transport(&url, e))?;
        read_json(&url, resp).await
    }

    /// `POST {base}/api/chat`.
    pub async fn chat(
        &self,
        base: &str,
        request: &ChatRequest,
        token: Option<&str>,
    ) -> Result<ChatResponse, AppError> {
        let url = format!("{base}{CHAT_PATH}");
        self.post_json(&url, request, token).await.inspect_err(|e| {
            error!("Chat request for session {} failed: {e}", request.session_id);
        })
    }

    /// `POST {base}/api/farewell/guidance`.
    pub async fn guidance(
        &self,
        base: &str,
        request: &GuidanceRequest,
        token: Option<&str>,
    ) -> Result<GuidanceResponse, AppError> {
        let url = format!("{base}{GUIDANCE_PATH}");
        self.post_json(&url, request, token).await.inspect_err(|e| {
            error!("Guidance request for {} failed: {e}", request.farewell_type);
        })
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T, AppError> {
        debug!("API request: POST {url}");
        let builder = self.client.post(url).timeout(self.request_timeout).json(body);
        let resp = with_bearer(builder, token)
            .send()
            .await
            .map_err(|e| AppError::from_transport(url, e))?;
        read_json(url, resp).await
    }
}

#[async_trait]
impl HealthProbe for ApiClient {
    async fn probe(&self, base: &str) -> Result<(), AppError> {
        self.health(base).await.map(|_| ())
    }
}

fn with_bearer(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

async fn read_json<T: DeserializeOwned>(url: &str, resp: Response) -> Result<T, AppError> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| AppError::from_transport(url, e))?;

    if !status.is_success() {
        let fallback = format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown Status")
        );
        return Err(AppError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
            message: server_message(&body).unwrap_or(fallback),
        });
    }

    serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Pulls `message` or `detail` out of an error body, if it is JSON and has one.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
