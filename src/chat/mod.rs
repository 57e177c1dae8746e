pub mod client;
pub mod conversation;
pub mod sse;
pub mod types;

pub use client::{ClientConfig, StreamingChatClient};
pub use conversation::ConversationCell;
pub use types::{ChatEvent, ChatRequest, ErrorPayload, StreamFrame, StructuredFrame};
