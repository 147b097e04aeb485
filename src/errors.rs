use thiserror::Error;

/// Sentence shown whenever no backend could be reached.
pub const NETWORK_FAILURE_TEXT: &str = "网络连接失败，请检查后端服务是否正常运行";

/// Sentence shown when the backend answered with something we cannot read.
pub const MALFORMED_RESPONSE_TEXT: &str = "服务返回了无法识别的内容，请稍后再试";

/// Top-level application error.
/// All variants carry a human-readable message for logging; use [`user_message`]
/// for the text that is shown to the user.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Connectivity errors ──────────────────────────────────────────────────
    #[error("Backend unreachable at {url}: {message}")]
    BackendUnreachable { url: String, message: String },

    #[error("Request to {url} timed out")]
    RequestTimedOut { url: String },

    // ── Protocol errors ──────────────────────────────────────────────────────
    #[error("HTTP {status} from {url}: {message}")]
    HttpStatus { url: String, status: u16, message: String },

    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    // ── Auth errors ──────────────────────────────────────────────────────────
    #[error("{0}")]
    Auth(String),

    #[error("No signed-in user")]
    NotAuthenticated,

    // ── Storage errors ───────────────────────────────────────────────────────
    #[error("Storage operation failed: {message}")]
    StorageFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Record not found: {entity_type} with id '{id}'")]
    RecordNotFound { entity_type: String, id: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn storage(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::StorageFailed { message: message.into(), source }
    }

    /// Maps a transport-level reqwest failure onto the connectivity variants.
    pub fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::RequestTimedOut { url: url.to_string() }
        } else if err.is_decode() {
            AppError::MalformedResponse { url: url.to_string(), message: err.to_string() }
        } else {
            AppError::BackendUnreachable { url: url.to_string(), message: err.to_string() }
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, AppError::BackendUnreachable { .. } | AppError::RequestTimedOut { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, AppError::HttpStatus { .. } | AppError::MalformedResponse { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::EmptyField { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth(_) | AppError::NotAuthenticated)
    }
}

/// What the user may do after a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOption {
    RetryConnection,
    RetrySend,
    Cancel,
}

impl RecoveryOption {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryOption::RetryConnection => "重新连接",
            RecoveryOption::RetrySend => "重新发送",
            RecoveryOption::Cancel => "取消",
        }
    }
}

/// Translates any error into the single string surfaced to the user.
pub fn user_message(err: &AppError) -> String {
    match err {
        AppError::BackendUnreachable { .. } | AppError::RequestTimedOut { .. } => {
            NETWORK_FAILURE_TEXT.to_string()
        }
        AppError::HttpStatus { message, .. } => message.clone(),
        AppError::MalformedResponse { .. } => MALFORMED_RESPONSE_TEXT.to_string(),
        AppError::Auth(message) => message.clone(),
        AppError::NotAuthenticated => "请先登录".to_string(),
        AppError::EmptyField { .. } => "内容不能为空".to_string(),
        AppError::StorageFailed { .. } => "本地数据保存失败".to_string(),
        AppError::RecordNotFound { .. } => "找不到这条告别记录".to_string(),
        AppError::Unexpected(message) => message.clone(),
    }
}

pub fn recovery_options(err: &AppError) -> &'static [RecoveryOption] {
    if err.is_connectivity() {
        &[RecoveryOption::RetryConnection, RecoveryOption::RetrySend, RecoveryOption::Cancel]
    } else if err.is_protocol() {
        &[RecoveryOption::RetrySend, RecoveryOption::Cancel]
    } else {
        &[RecoveryOption::Cancel]
    }
}
