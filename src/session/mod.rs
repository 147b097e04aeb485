//! Client-side state of one farewell conversation.

pub mod ids;
pub mod naming;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::AuthProvider;
use crate::catalog::{self, DEFAULT_GOODBYE_TEXT, DEFAULT_THEME, GREETING, GUIDE_PROMPTS, MAX_THEME_CHARS};
use crate::db::kv_store::KeyValueStore;
use crate::errors::{recovery_options, user_message, AppError, RecoveryOption};
use crate::models::{Author, ChatContext, ChatRequest, FarewellRecord, Message};
use crate::service::chat_gateway::ChatGateway;
use ids::MessageClock;

/// What the user picked before the conversation started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FarewellContext {
    pub farewell_type: String,
    /// Explicit name; when absent it is inferred from the first message.
    pub farewell_name: Option<String>,
    pub theme: String,
    pub tomb_style: String,
}

impl FarewellContext {
    pub fn new(
        farewell_type: impl Into<String>,
        theme: impl AsRef<str>,
        tomb_style: impl Into<String>,
    ) -> Self {
        Self {
            farewell_type: farewell_type.into(),
            farewell_name: None,
            theme: theme.as_ref().trim().chars().take(MAX_THEME_CHARS).collect(),
            tomb_style: tomb_style.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.farewell_name = Some(name.into());
        self
    }
}

/// Where a live session is in the flow. Completion consumes the session, so
/// there is no terminal variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Guiding,
    Chatting,
    ReadyToComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing was recorded or sent.
    Ignored,
    Replied { suggestions: Vec<String> },
}

/// A failed send, already translated for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SendFailure {
    pub message: String,
    pub options: &'static [RecoveryOption],
}

/// Allocates sessions for one device. Owned by the app root and passed down.
pub struct SessionFactory {
    device_user_id: String,
    auth: Option<Arc<dyn AuthProvider>>,
    history_window: usize,
}

impl SessionFactory {
    /// Uses a fresh in-memory device identity.
    pub fn new(history_window: usize) -> Self {
        Self { device_user_id: ids::generate_user_id(), auth: None, history_window }
    }

    /// Reuses the device identity persisted in `store`.
    pub async fn with_store(
        store: &dyn KeyValueStore,
        history_window: usize,
    ) -> Result<Self, AppError> {
        let device_user_id = ids::load_or_create_device_id(store).await?;
        Ok(Self { device_user_id, auth: None, history_window })
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn device_user_id(&self) -> &str {
        &self.device_user_id
    }

    /// Starts a new session seeded with the greeting. A signed-in user's id
    /// takes precedence over the device identity.
    pub async fn create(&self, context: FarewellContext) -> FarewellSession {
        let signed_in = match &self.auth {
            Some(auth) => auth.current_user().await.map(|u| u.id),
            None => None,
        };
        let user_id = signed_in.unwrap_or_else(|| self.device_user_id.clone());
        let session = FarewellSession::new(ids::generate_session_id(), user_id, context, self.history_window);
        info!("Started farewell session {}", session.session_id);
        session
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarewellSession {
    session_id: String,
    user_id: String,
    context: FarewellContext,
    messages: Vec<Message>,
    completion_ready: bool,
    exchanged: bool,
    inferred_name: Option<String>,
    /// Text of the last send that failed and has not been answered since.
    pending_retry: Option<String>,
    history_window: usize,
    clock: MessageClock,
}

impl FarewellSession {
    fn new(
        session_id: String,
        user_id: String,
        context: FarewellContext,
        history_window: usize,
    ) -> Self {
        let mut session = Self {
            session_id,
            user_id,
            context,
            messages: Vec::new(),
            completion_ready: false,
            exchanged: false,
            inferred_name: None,
            pending_retry: None,
            history_window: history_window.max(1),
            clock: MessageClock::default(),
        };
        session.push(Author::Assistant, GREETING.to_string());
        session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn context(&self) -> &FarewellContext {
        &self.context
    }

    /// Full conversation in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Trailing window for display.
    pub fn recent_messages(&self) -> &[Message] {
        let start = self.messages.len().saturating_sub(self.history_window);
        &self.messages[start..]
    }

    pub fn completion_ready(&self) -> bool {
        self.completion_ready
    }

    pub fn state(&self) -> FlowState {
        if !self.exchanged {
            FlowState::Guiding
        } else if self.completion_ready {
            FlowState::ReadyToComplete
        } else {
            FlowState::Chatting
        }
    }

    pub fn guide_prompts(&self) -> &'static [&'static str] {
        &GUIDE_PROMPTS
    }

    /// Explicit name, else the one inferred from the first message, if any yet.
    pub fn farewell_name(&self) -> Option<&str> {
        self.explicit_name().or(self.inferred_name.as_deref())
    }

    pub fn has_pending_retry(&self) -> bool {
        self.pending_retry.is_some()
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages.iter().rev().find(|m| m.is_user()).map(|m| m.text.as_str())
    }

    /// Records `text` and sends it to the backend.
    ///
    /// The user message stays in the history whatever happens next. On failure
    /// an assistant-authored notice is appended as well, and the returned
    /// [`SendFailure`] carries the display text and the recovery choices.
    /// Callers must not run two sends on one session at the same time.
    pub async fn send_message(
        &mut self,
        gateway: &ChatGateway,
        text: &str,
    ) -> Result<SendOutcome, SendFailure> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring blank message for session {}", self.session_id);
            return Ok(SendOutcome::Ignored);
        }
        self.push(Author::User, text.to_string());
        self.exchange(gateway, text.to_string()).await
    }

    /// Sends the last failed message again without recording it twice.
    /// Does nothing once that message has been answered.
    pub async fn retry_last(&mut self, gateway: &ChatGateway) -> Result<SendOutcome, SendFailure> {
        let Some(text) = self.pending_retry.clone() else {
            debug!("Nothing to retry for session {}", self.session_id);
            return Ok(SendOutcome::Ignored);
        };
        info!("Retrying last message for session {}", self.session_id);
        self.exchange(gateway, text).await
    }

    /// Turns the session into its permanent record. May be called in any state.
    pub fn complete(self) -> FarewellRecord {
        let now = Utc::now();
        let name = if self.context.theme.is_empty() {
            DEFAULT_THEME.to_string()
        } else {
            self.context.theme.clone()
        };
        let record = FarewellRecord {
            id: ids::generate_record_id(now),
            name,
            date: now.format("%Y-%m-%d").to_string(),
            image: catalog::tomb_style(&self.context.tomb_style).id.to_string(),
            goodbye_text: self.last_user_message().unwrap_or(DEFAULT_GOODBYE_TEXT).to_string(),
        };
        info!("Completed farewell session {} as record {}", self.session_id, record.id);
        record
    }

    async fn exchange(
        &mut self,
        gateway: &ChatGateway,
        text: String,
    ) -> Result<SendOutcome, SendFailure> {
        let request = self.build_request(text.clone());
        let result = gateway.chat(&request).await.and_then(|resp| {
            if resp.message.trim().is_empty() {
                Err(AppError::MalformedResponse {
                    url: gateway.resolver().current(),
                    message: "empty assistant message".to_string(),
                })
            } else {
                Ok(resp)
            }
        });

        match result {
            Ok(resp) => {
                if resp.session_id != self.session_id {
                    debug!("Backend echoed session id {} for {}", resp.session_id, self.session_id);
                }
                self.push(Author::Assistant, resp.message);
                self.pending_retry = None;
                self.completion_ready = resp.is_completion_ready;
                self.exchanged = true;
                Ok(SendOutcome::Replied { suggestions: resp.suggestions })
            }
            Err(e) => {
                warn!("Send failed for session {}: {e}", self.session_id);
                let message = user_message(&e);
                self.push(Author::Assistant, format!("（消息未能送达：{message}）"));
                self.pending_retry = Some(text);
                Err(SendFailure { message, options: recovery_options(&e) })
            }
        }
    }

    fn build_request(&mut self, text: String) -> ChatRequest {
        let farewell_name = self.resolve_name(&text);
        ChatRequest {
            message: text,
            session_id: self.session_id.clone(),
            user_id: Some(self.user_id.clone()),
            farewell_type: non_empty(&self.context.farewell_type),
            farewell_name: Some(farewell_name),
            context: Some(ChatContext {
                theme: non_empty(&self.context.theme),
                tomb_style: non_empty(&self.context.tomb_style),
                message_count: Some(self.messages.len()),
            }),
        }
    }

    fn explicit_name(&self) -> Option<&str> {
        self.context
            .farewell_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Infers at most once per session; later calls reuse the first answer.
    fn resolve_name(&mut self, text: &str) -> String {
        if let Some(name) = self.explicit_name() {
            return name.to_string();
        }
        self.inferred_name
            .get_or_insert_with(|| naming::infer_farewell_name(&self.context.farewell_type, text))
            .clone()
    }

    fn push(&mut self, author: Author, text: String) {
        let id = self.clock.next_id();
        self.messages.push(Message::new(id, author, text));
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
