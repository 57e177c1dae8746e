use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;
use url::Url;

use crate::chat::ClientConfig;
use crate::error::{Error, Result};
use crate::platform::AppPaths;

const ENV_PREFIX: &str = "HEALTHCHAT";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Chat-stream endpoint the client POSTs to.
    pub endpoint: String,
    /// Bearer token. When unset the keyring entry is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Patient profile the conversation is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub show_conversation_id: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_logging: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/chat/stream".to_string(),
            auth_token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
        }
    }
}

impl AppConfig {
    /// Load defaults, then `config.toml`, then `HEALTHCHAT__*` environment
    /// overrides. A default file is written on first run; the flag reports
    /// whether that happened.
    pub async fn load_or_create(paths: &AppPaths) -> Result<(Self, bool)> {
        let config_file = paths.config_file();

        let created = !config_file.exists();
        if created {
            info!("Config file not found, creating default configuration");
            Self::default().save(paths).await?;
        }

        info!("Loading configuration from: {:?}", config_file);
        let environment = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true);
        let config = Self::from_sources(&config_file, environment)?;

        Ok((config, created))
    }

    fn from_sources(config_file: &Path, environment: Environment) -> Result<Self> {
        let settings = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(environment)
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub async fn save(&self, paths: &AppPaths) -> Result<()> {
        let config_file = paths.config_file();

        info!("Saving configuration to: {:?}", config_file);

        let config_content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(config::ConfigError::Message(e.to_string())))?;

        if let Some(parent) = config_file.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&config_file, config_content).await?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.backend.endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "Backend endpoint must be http or https, got {}",
                endpoint.scheme()
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::validation(format!(
                "Unknown log level {}, expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        if matches!(&self.chat.patient_id, Some(id) if id.trim().is_empty()) {
            return Err(Error::validation("Patient id must not be blank"));
        }

        Ok(())
    }

    /// Build the explicit client settings. `auth_token` is used only when the
    /// config itself carries none.
    pub fn to_client_config(&self, auth_token: Option<String>) -> Result<ClientConfig> {
        Ok(ClientConfig {
            endpoint: Url::parse(&self.backend.endpoint)?,
            auth_token: self.backend.auth_token.clone().or(auth_token),
            patient_id: self.chat.patient_id.clone(),
        })
    }

    /// Copy with the credential masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.backend.auth_token.is_some() {
            config.backend.auth_token = Some("********".to_string());
        }
        config
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(config::ConfigError::Message(e.to_string())))
    }
}
