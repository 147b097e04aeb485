use std::sync::Arc;

use tracing::{info, warn};

use crate::api::ApiClient;
use crate::auth::AuthProvider;
use crate::connection::ConnectionResolver;
use crate::errors::AppError;
use crate::models::{ChatRequest, ChatResponse, GuidanceRequest, GuidanceResponse};

/// Routes backend calls through the resolved base URL, attaching the bearer
/// token when someone is signed in.
#[derive(Clone)]
pub struct ChatGateway {
    api: ApiClient,
    resolver: Arc<ConnectionResolver>,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl ChatGateway {
    pub fn new(
        api: ApiClient,
        resolver: Arc<ConnectionResolver>,
        auth: Option<Arc<dyn AuthProvider>>,
    ) -> Self {
        Self { api, resolver, auth }
    }

    pub fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let base = self.resolver.resolve().await;
        let token = self.token().await;
        self.api.chat(&base, request, token.as_deref()).await
    }

    pub async fn guidance(
        &self,
        farewell_type: &str,
        farewell_name: &str,
    ) -> Result<GuidanceResponse, AppError> {
        let base = self.resolver.resolve().await;
        let token = self.token().await;
        let request = GuidanceRequest {
            farewell_type: farewell_type.to_string(),
            farewell_name: farewell_name.to_string(),
        };
        self.api.guidance(&base, &request, token.as_deref()).await
    }

    /// Drops the cached backend and probes all candidates again.
    pub async fn reconnect(&self) -> String {
        self.resolver.reset().await;
        let base = self.resolver.resolve().await;
        info!("Reconnected to {base}");
        base
    }

    /// Whether the current backend answers its health check right now.
    pub async fn check_connection(&self) -> bool {
        let base = self.resolver.resolve().await;
        match self.api.health(&base).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Connection check against {base} failed: {e}");
                false
            }
        }
    }

    async fn token(&self) -> Option<String> {
        match &self.auth {
            Some(auth) => auth.current_token().await,
            None => None,
        }
    }
}
