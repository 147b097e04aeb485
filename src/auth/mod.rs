//! Optional sign-in. Without a provider, or without a signed-in user, the app
//! runs anonymously with a locally generated identity.

pub mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Uniform result of register/login/logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub success: bool,
    pub user: Option<AuthUser>,
    pub error: Option<String>,
}

impl AuthResponse {
    pub fn ok(user: Option<AuthUser>) -> Self {
        Self { success: true, user, error: None }
    }

    pub fn failed(err: &AppError) -> Self {
        Self { success: false, user: None, error: Some(crate::errors::user_message(err)) }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> AuthResponse;

    async fn login(&self, email: &str, password: &str) -> AuthResponse;

    async fn logout(&self) -> AuthResponse;

    async fn current_user(&self) -> Option<AuthUser>;

    /// Bearer token for backend requests; `None` means anonymous mode.
    async fn current_token(&self) -> Option<String>;
}
