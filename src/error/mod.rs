use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Generic text surfaced when a failure carries no usable message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to get a response";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Secure storage error: {0}")]
    SecureStorage(#[from] keyring::Error),
}

impl Error {
    pub fn platform(msg: impl Into<String>) -> Self {
        Error::Platform(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Text suitable for a toast or status line.
    pub fn user_message(&self) -> String {
        match self {
            Error::Chat(err) => err.user_message(),
            other => {
                let text = other.to_string();
                if text.trim().is_empty() {
                    GENERIC_FAILURE_MESSAGE.to_string()
                } else {
                    text
                }
            }
        }
    }
}

/// Failures of a single streamed chat exchange.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Request to chat backend failed: {0}")]
    Transport(String),

    #[error("Chat backend returned {status}: {}", message_or_generic(.message))]
    Backend {
        status: u16,
        message: Option<String>,
    },

    #[error("Chat backend returned no response body")]
    MissingBody,

    #[error("Failed to read response stream: {0}")]
    Stream(String),
}

impl ChatError {
    pub fn transport(msg: impl Into<String>) -> Self {
        ChatError::Transport(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        ChatError::Stream(msg.into())
    }

    /// The backend's own error text when it sent one, otherwise a readable description.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Backend { message: Some(message), .. } if !message.trim().is_empty() => {
                message.clone()
            }
            ChatError::Backend { .. } => GENERIC_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

fn message_or_generic(message: &Option<String>) -> &str {
    message.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_prefers_server_message() {
        let err = ChatError::Backend {
            status: 429,
            message: Some("Too many requests".to_string()),
        };
        assert_eq!(err.user_message(), "Too many requests");
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_backend_error_falls_back_to_generic() {
        let err = ChatError::Backend { status: 500, message: None };
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);

        let blank = ChatError::Backend { status: 502, message: Some("  ".to_string()) };
        assert_eq!(blank.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_chat_error_converts_into_error() {
        let err: Error = ChatError::MissingBody.into();
        assert!(matches!(err, Error::Chat(ChatError::MissingBody)));
        assert_eq!(err.user_message(), "Chat backend returned no response body");
    }
}
