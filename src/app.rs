use std::sync::Arc;

use tracing::info;

use crate::api::ApiClient;
use crate::auth::supabase::SupabaseAuth;
use crate::auth::AuthProvider;
use crate::config::AppConfig;
use crate::connection::ConnectionResolver;
use crate::db::farewell_repository::FarewellRepository;
use crate::db::kv_store::{KeyValueStore, SqliteKvStore};
use crate::errors::AppError;
use crate::service::chat_gateway::ChatGateway;
use crate::session::SessionFactory;

/// Everything the flow needs, built once at startup and passed down.
pub struct AppContext {
    pub gateway: ChatGateway,
    pub sessions: SessionFactory,
    pub farewells: FarewellRepository,
    pub auth: Option<Arc<dyn AuthProvider>>,
}

impl AppContext {
    pub async fn build(config: &AppConfig) -> Result<Self, AppError> {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::connect(&config.database_url).await?);
        Self::with_store(config, store).await
    }

    /// Wires the components around an already opened store.
    pub async fn with_store(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, AppError> {
        let api = ApiClient::new(config.probe_timeout, config.chat_timeout)?;
        let resolver = Arc::new(ConnectionResolver::new(
            config.api_base_url.clone(),
            config.fallback_urls.clone(),
            Arc::new(api.clone()),
        ));
        info!("Backend candidates: {:?}", resolver.candidates());

        let auth: Option<Arc<dyn AuthProvider>> = match &config.supabase {
            Some(supabase) => {
                let provider: Arc<dyn AuthProvider> =
                    Arc::new(SupabaseAuth::connect(supabase, store.clone()).await?);
                Some(provider)
            }
            None => {
                info!("No auth provider configured, running anonymously");
                None
            }
        };

        let mut sessions = SessionFactory::with_store(store.as_ref(), config.history_window).await?;
        if let Some(auth) = &auth {
            sessions = sessions.with_auth(auth.clone());
        }

        Ok(Self {
            gateway: ChatGateway::new(api, resolver, auth.clone()),
            sessions,
            farewells: FarewellRepository::new(store),
            auth,
        })
    }
}
