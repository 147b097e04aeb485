use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::AppError;

/// Liveness check against one candidate base URL.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, base: &str) -> Result<(), AppError>;
}

/// Finds one reachable backend out of an ordered candidate list and caches it.
///
/// Discovery is best-effort: probes run one after another, each exactly once,
/// and when none answers the default URL is returned anyway.
pub struct ConnectionResolver {
    default_url: String,
    candidates: Vec<String>,
    probe: Arc<dyn HealthProbe>,
    /// Stays locked for a whole probe sequence so concurrent callers wait for
    /// the first result instead of probing again.
    resolved: Mutex<Option<String>>,
}

impl ConnectionResolver {
    pub fn new(
        default_url: impl Into<String>,
        fallbacks: impl IntoIterator<Item = String>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let default_url = default_url.into();
        let mut candidates = vec![default_url.clone()];
        for url in fallbacks {
            if !candidates.contains(&url) {
                candidates.push(url);
            }
        }
        Self { default_url, candidates, probe, resolved: Mutex::new(None) }
    }

    /// Probe order: default first, then the fallbacks as declared.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    pub async fn resolve(&self) -> String {
        let mut resolved = self.resolved.lock().await;
        if let Some(url) = resolved.as_ref() {
            return url.clone();
        }

        for candidate in &self.candidates {
            info!("Probing backend candidate {candidate}");
            match self.probe.probe(candidate).await {
                Ok(()) => {
                    info!("Backend resolved to {candidate}");
                    *resolved = Some(candidate.clone());
                    return candidate.clone();
                }
                Err(e) => warn!("Candidate {candidate} failed its health check: {e}"),
            }
        }

        warn!(
            "No backend candidate answered, falling back to {}",
            self.default_url
        );
        *resolved = Some(self.default_url.clone());
        self.default_url.clone()
    }

    /// Forgets the cached URL; the next `resolve` probes from scratch.
    pub async fn reset(&self) {
        *self.resolved.lock().await = None;
        info!("Backend resolution reset");
    }

    /// Last resolved URL, or the default if nothing has been resolved yet.
    /// Never probes. If a probe sequence is running this returns the default.
    pub fn current(&self) -> String {
        match self.resolved.try_lock() {
            Ok(guard) => guard.clone().unwrap_or_else(|| self.default_url.clone()),
            Err(_) => self.default_url.clone(),
        }
    }
}
