use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Response, StatusCode,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::chat::conversation::ConversationCell;
use crate::chat::sse::{parse_line, LineBuffer, Utf8StreamDecoder};
use crate::chat::types::{ChatEvent, ChatRequest, ErrorPayload, StreamFrame};
use crate::error::{ChatError, Error, Result};

/// Explicit connection settings for [`StreamingChatClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub auth_token: Option<String>,
    pub patient_id: Option<String>,
}

impl ClientConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            auth_token: None,
            patient_id: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_patient_id(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }
}

/// Sends one message per call and streams the assistant's reply back through
/// callbacks, tracking the conversation id the backend assigns.
pub struct StreamingChatClient {
    http: Client,
    config: ClientConfig,
    conversation: ConversationCell,
    loading: AtomicBool,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl StreamingChatClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| ChatError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            conversation: ConversationCell::new(),
            loading: AtomicBool::new(false),
            events: None,
        })
    }

    /// Route notifications (loading, new conversation, errors) to `sender`.
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<ChatEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.conversation.get()
    }

    /// Forget the current conversation so the next message starts a new one.
    pub fn reset(&self) {
        if let Some(id) = self.conversation.get() {
            info!("Resetting conversation {}", id);
        }
        self.conversation.clear();
    }

    /// Send `message` and stream the reply.
    ///
    /// `on_delta` receives each text fragment in wire order. `on_done` runs
    /// exactly once after the exchange ends, whether it succeeded or not.
    /// Failures are reported as [`ChatEvent::Error`] and never returned.
    pub async fn send<D, F>(&self, message: &str, mut on_delta: D, on_done: F)
    where
        D: FnMut(&str),
        F: FnOnce(),
    {
        self.set_loading(true);

        if let Err(e) = self.stream_reply(message, &mut on_delta).await {
            error!("Chat exchange failed: {}", e);
            self.notify(ChatEvent::Error(e.user_message()));
        }

        self.set_loading(false);
        on_done();
    }

    async fn stream_reply<D>(&self, message: &str, on_delta: &mut D) -> Result<()>
    where
        D: FnMut(&str),
    {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage.into());
        }

        let request_id = Uuid::new_v4();
        let request = ChatRequest::new(message)
            .with_patient_id(self.config.patient_id.clone())
            .with_conversation_id(self.conversation.get());

        debug!(
            "Sending chat request {}: conversation={:?}, patient={:?}",
            request_id, request.conversation_id, request.patient_id
        );

        let response = self
            .http
            .post(self.config.endpoint.clone())
            .headers(self.create_headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::backend_error(response).await.into());
        }

        if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            return Err(ChatError::MissingBody.into());
        }

        let frames = self.read_stream(response, on_delta).await?;
        info!("Chat request {} completed after {} frames", request_id, frames);
        Ok(())
    }

    fn create_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &self.config.auth_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::validation(format!("Invalid auth token format: {}", e)))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    async fn backend_error(response: Response) -> ChatError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!("Chat backend error {}: {}", status, body);

        let message = serde_json::from_str::<ErrorPayload>(&body)
            .ok()
            .and_then(|payload| payload.error);

        ChatError::Backend {
            status: status.as_u16(),
            message,
        }
    }

    /// Drain the body until the server closes it. Returns the number of
    /// frames processed.
    async fn read_stream<D>(&self, response: Response, on_delta: &mut D) -> Result<usize>
    where
        D: FnMut(&str),
    {
        let mut body = response.bytes_stream();
        let mut decoder = Utf8StreamDecoder::new();
        let mut buffer = LineBuffer::new();
        let mut frames = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ChatError::stream(e.to_string()))?;
            let text = decoder.decode(&chunk);

            for line in buffer.push(&text) {
                if let Some(frame) = parse_line(&line) {
                    self.handle_frame(frame, on_delta);
                    frames += 1;
                }
            }
        }

        buffer.push(&decoder.finish());
        if !buffer.remainder().is_empty() {
            debug!("Discarding unterminated trailing line: {:?}", buffer.remainder());
        }

        Ok(frames)
    }

    fn handle_frame<D>(&self, frame: StreamFrame, on_delta: &mut D)
    where
        D: FnMut(&str),
    {
        match frame {
            StreamFrame::Structured(frame) => {
                if let Some(id) = frame.conversation_id.as_deref() {
                    if self.conversation.try_set(id) {
                        info!("Conversation started: {}", id);
                        self.notify(ChatEvent::ConversationStarted(id.to_string()));
                    } else {
                        debug!("Ignoring conversation id {}, one is already held", id);
                    }
                }

                if let Some(text) = frame.delta_text() {
                    on_delta(text);
                }
            }
            StreamFrame::Text(text) => on_delta(&text),
        }
    }

    fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
        self.notify(ChatEvent::LoadingChanged(loading));
    }

    fn notify(&self, event: ChatEvent) {
        if let Some(sender) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> StreamingChatClient {
        let endpoint = Url::parse("http://localhost:9/api/chat/stream").unwrap();
        StreamingChatClient::new(ClientConfig::new(endpoint).with_auth_token("secret")).unwrap()
    }

    #[test]
    fn test_headers_carry_bearer_token() {
        let client = test_client();
        let headers = client.create_headers().unwrap();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_headers_without_token() {
        let endpoint = Url::parse("http://localhost:9/chat").unwrap();
        let client = StreamingChatClient::new(ClientConfig::new(endpoint)).unwrap();
        let headers = client.create_headers().unwrap();

        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_handle_frame_routes_content_and_conversation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = test_client().with_events(tx);
        let mut deltas = Vec::new();

        for line in [
            r#"data: {"conversationId":"abc123"}"#,
            r#"data: {"content":"Take "}"#,
            r#"data: {"conversationId":"other","choices":[{"delta":{"content":"with food"}}]}"#,
            "data: [DONE]",
            "data: .",
        ] {
            if let Some(frame) = parse_line(line) {
                client.handle_frame(frame, &mut |text: &str| deltas.push(text.to_string()));
            }
        }

        assert_eq!(deltas, vec!["Take ", "with food", "."]);
        assert_eq!(client.conversation_id().as_deref(), Some("abc123"));
        assert_eq!(rx.try_recv().unwrap(), ChatEvent::ConversationStarted("abc123".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_message_still_completes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = test_client().with_events(tx);
        let mut done = 0;

        client.send("   ", |_| panic!("no deltas expected"), || done += 1).await;

        assert_eq!(done, 1);
        assert!(!client.is_loading());
        assert_eq!(rx.recv().await, Some(ChatEvent::LoadingChanged(true)));
        assert_eq!(
            rx.recv().await,
            Some(ChatEvent::Error("Message must not be empty".to_string()))
        );
        assert_eq!(rx.recv().await, Some(ChatEvent::LoadingChanged(false)));
    }

    #[test]
    fn test_reset_clears_conversation() {
        let client = test_client();
        client.conversation.try_set("abc123");
        client.reset();
        assert_eq!(client.conversation_id(), None);
    }
}
