use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_FALLBACK_URLS: &str = "http://127.0.0.1:8000,http://10.0.2.2:8000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://farewell.db?mode=rwc";

const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;
const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HISTORY_WINDOW: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub fallback_urls: Vec<String>,
    pub probe_timeout: Duration,
    pub chat_timeout: Duration,
    pub history_window: usize,
    pub database_url: String,
    pub supabase: Option<SupabaseConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            fallback_urls: parse_url_list(DEFAULT_FALLBACK_URLS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            chat_timeout: Duration::from_secs(DEFAULT_CHAT_TIMEOUT_SECS),
            history_window: DEFAULT_HISTORY_WINDOW,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            supabase: None,
        }
    }
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first if a `.env` should apply.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base_url = lookup("FAREWELL_API_BASE_URL")
            .map(|v| normalize_url(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let fallback_urls = parse_url_list(
            &lookup("FAREWELL_API_FALLBACK_URLS").unwrap_or_else(|| DEFAULT_FALLBACK_URLS.to_string()),
        );

        let probe_timeout = Duration::from_millis(parse_or_default(
            &lookup,
            "FAREWELL_PROBE_TIMEOUT_MS",
            DEFAULT_PROBE_TIMEOUT_MS,
        ));
        let chat_timeout = Duration::from_secs(parse_or_default(
            &lookup,
            "FAREWELL_CHAT_TIMEOUT_SECS",
            DEFAULT_CHAT_TIMEOUT_SECS,
        ));
        let history_window =
            parse_or_default(&lookup, "FAREWELL_HISTORY_WINDOW", DEFAULT_HISTORY_WINDOW).max(1);

        let database_url = lookup("FAREWELL_DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let supabase = match (lookup("SUPABASE_URL"), lookup("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) if !url.trim().is_empty() && !anon_key.trim().is_empty() => {
                Some(SupabaseConfig { url: normalize_url(&url), anon_key: anon_key.trim().to_string() })
            }
            _ => None,
        };

        Self {
            api_base_url,
            fallback_urls,
            probe_timeout,
            chat_timeout,
            history_window,
            database_url,
            supabase,
        }
    }
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_url)
        .filter(|u| !u.is_empty())
        .collect()
}

fn parse_or_default<T: FromStr + Copy + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {key}={raw:?}, using {default}");
            default
        }),
    }
}
