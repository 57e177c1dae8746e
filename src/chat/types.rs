use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of one chat-stream POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            patient_id: None,
            conversation_id: None,
        }
    }

    pub fn with_patient_id(mut self, patient_id: Option<String>) -> Self {
        self.patient_id = patient_id;
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }
}

/// One `data:` payload decoded from the response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Structured(StructuredFrame),
    /// Payload that was not valid JSON, forwarded as plain text.
    Text(String),
}

/// Fields picked out of a JSON frame. Each is read independently, so a
/// field of the wrong type only loses itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredFrame {
    pub conversation_id: Option<String>,
    pub content: Option<String>,
    /// Text from the `choices[0].delta.content` shape.
    pub choice_content: Option<String>,
}

impl StructuredFrame {
    pub fn from_value(value: &Value) -> Self {
        let text_at = |pointer: &str| value.pointer(pointer).and_then(Value::as_str).map(str::to_string);

        Self {
            conversation_id: text_at("/conversationId"),
            content: text_at("/content"),
            choice_content: text_at("/choices/0/delta/content"),
        }
    }

    /// Text delta carried by this frame: `content` first, then the nested
    /// choice delta.
    pub fn delta_text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .filter(|content| !content.is_empty())
            .or_else(|| self.choice_content.as_deref().filter(|content| !content.is_empty()))
    }
}

/// Error body returned with a non-success status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub error: Option<String>,
}

/// Notifications pushed to the UI layer while a message is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Busy flag changed; `true` on entry to `send`, `false` before `on_done`.
    LoadingChanged(bool),
    /// The backend assigned a conversation id to this session.
    ConversationStarted(String),
    /// A user-visible failure message.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_absent_ids() {
        let body = serde_json::to_value(ChatRequest::new("Hello")).unwrap();
        assert_eq!(body, json!({ "message": "Hello" }));
    }

    #[test]
    fn test_request_uses_camel_case_ids() {
        let request = ChatRequest::new("Any side effects?")
            .with_patient_id(Some("p-17".to_string()))
            .with_conversation_id(Some("abc123".to_string()));

        let body = serde_json::to_value(request).unwrap();
        assert_eq!(
            body,
            json!({
                "message": "Any side effects?",
                "patientId": "p-17",
                "conversationId": "abc123"
            })
        );
    }

    #[test]
    fn test_delta_text_prefers_direct_content() {
        let frame = StructuredFrame::from_value(&json!({
            "content": "direct",
            "choices": [{ "delta": { "content": "nested" } }]
        }));
        assert_eq!(frame.delta_text(), Some("direct"));
    }

    #[test]
    fn test_delta_text_reads_nested_choice() {
        let frame = StructuredFrame::from_value(&json!({ "choices": [{ "delta": { "content": "Y" } }] }));
        assert_eq!(frame.delta_text(), Some("Y"));

        let empty = StructuredFrame::from_value(&json!({ "choices": [{ "delta": {} }] }));
        assert_eq!(empty.delta_text(), None);

        let blank = StructuredFrame::from_value(&json!({
            "content": "",
            "choices": [{ "delta": { "content": "fallback" } }]
        }));
        assert_eq!(blank.delta_text(), Some("fallback"));
    }

    #[test]
    fn test_mistyped_field_only_loses_itself() {
        let frame = StructuredFrame::from_value(&json!({ "conversationId": 42, "content": "hi" }));
        assert_eq!(frame.conversation_id, None);
        assert_eq!(frame.delta_text(), Some("hi"));

        let frame = StructuredFrame::from_value(&json!({ "content": "hi", "choices": "x" }));
        assert_eq!(frame.delta_text(), Some("hi"));

        let frame = StructuredFrame::from_value(&json!({ "conversationId": "abc", "content": 7 }));
        assert_eq!(frame.conversation_id.as_deref(), Some("abc"));
        assert_eq!(frame.delta_text(), None);
    }

    #[test]
    fn test_error_payload_tolerates_missing_field() {
        let payload: ErrorPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.error.is_none());

        let payload: ErrorPayload = serde_json::from_str(r#"{"error":"Unauthorized"}"#).unwrap();
        assert_eq!(payload.error.as_deref(), Some("Unauthorized"));
    }
}
