use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::kv_store::KeyValueStore;
use crate::errors::AppError;

/// Used whenever a locally generated user id fails validation.
pub const FALLBACK_USER_ID: &str = "00000000-0000-4000-8000-000000000000";

pub const DEVICE_USER_ID_KEY: &str = "device_user_id";

/// `session_<unix millis>_<12 hex chars>`
pub fn generate_session_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().timestamp_millis(), &random[..12])
}

/// `<unix millis>_<8 hex chars>`; sorts by creation time and stays unique
/// within one millisecond.
pub fn generate_record_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}", now.timestamp_millis(), &random[..8])
}

pub fn generate_user_id() -> String {
    checked_user_id(Uuid::new_v4().to_string())
}

pub fn checked_user_id(candidate: String) -> String {
    if is_canonical_user_id(&candidate) {
        candidate
    } else {
        warn!("Generated user id {candidate:?} is not a canonical v4 id, using fallback");
        FALLBACK_USER_ID.to_string()
    }
}

/// 8-4-4-4-12 hex digits, version nibble `4`, RFC 4122 variant.
pub fn is_canonical_user_id(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    let layout_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    });
    layout_ok
        && bytes[14] == b'4'
        && matches!(bytes[19].to_ascii_lowercase(), b'8' | b'9' | b'a' | b'b')
}

/// Loads the persisted device identity, replacing it when missing or malformed.
pub async fn load_or_create_device_id(store: &dyn KeyValueStore) -> Result<String, AppError> {
    if let Some(existing) = store.get(DEVICE_USER_ID_KEY).await? {
        if is_canonical_user_id(&existing) {
            return Ok(existing);
        }
        warn!("Stored device id {existing:?} is malformed, regenerating");
    }
    let id = generate_user_id();
    store.set(DEVICE_USER_ID_KEY, &id).await?;
    info!("Created device identity {id}");
    Ok(id)
}

/// Hands out message ids that increase strictly within one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageClock {
    last: i64,
}

impl MessageClock {
    pub fn next_id(&mut self) -> String {
        let now = Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        self.last.to_string()
    }
}
