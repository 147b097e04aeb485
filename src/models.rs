use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Author::User => "user",
            Author::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a farewell conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: String, author: Author, text: String) -> Self {
        Self { id, text, author, created_at: Utc::now() }
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }
}

/// Extra context forwarded with every chat request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tomb_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farewell_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farewell_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ChatContext>,
}

/// Response from `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub is_completion_ready: bool,
}

/// Body of `POST /api/farewell/guidance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidanceRequest {
    pub farewell_type: String,
    pub farewell_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidanceResponse {
    pub guidance_text: String,
    pub farewell_type: String,
    pub farewell_name: String,
    pub timestamp: String,
}

/// The persisted outcome of a completed farewell.
///
/// Field names are camelCase on disk so previously written collections stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarewellRecord {
    pub id: String,
    pub name: String,
    pub date: String,
    /// Tomb style id, e.g. `style2`.
    pub image: String,
    pub goodbye_text: String,
}
