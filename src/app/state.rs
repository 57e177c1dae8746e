use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::config::AppConfig;
use crate::chat::{ChatEvent, StreamingChatClient};
use crate::error::Result;
use crate::platform::{AppPaths, CredentialStore};

pub struct AppState {
    config: AppConfig,
    paths: AppPaths,
    credentials: CredentialStore,
}

impl AppState {
    pub fn new(config: AppConfig, paths: AppPaths, credentials: CredentialStore) -> Self {
        Self {
            config,
            paths,
            credentials,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Token for the chat backend: the configured one if present, otherwise
    /// whatever secure storage holds. Storage failures degrade to no token.
    pub async fn resolve_token(&self) -> Option<String> {
        if let Some(token) = &self.config.backend.auth_token {
            debug!("Using backend token from configuration");
            return Some(token.clone());
        }

        match self.credentials.retrieve_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Could not read backend token from secure storage: {}", e);
                None
            }
        }
    }

    pub async fn build_client(
        &self,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<StreamingChatClient> {
        let token = self.resolve_token().await;
        if token.is_none() {
            warn!("No backend token configured; requests will be sent unauthenticated");
        }

        let client_config = self.config.to_client_config(token)?;
        info!("Chat client targeting {}", client_config.endpoint);

        Ok(StreamingChatClient::new(client_config)?.with_events(events))
    }
}
