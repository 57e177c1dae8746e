pub mod config;
pub mod state;

pub use config::{AppConfig, BackendConfig, ChatConfig, LoggingConfig};
pub use state::AppState;
