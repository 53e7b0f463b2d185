//! Model stream event vocabulary.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::tool_call::{ToolCallRequest, ToolCallResponse};
use super::usage::UsageMetadata;
use crate::error::ConvoyError;

/// Stream of model events for one request.
///
/// `Err` items are transport failures; `ConvoyError::InvalidStream` marks a
/// malformed response that may be re-requested with the same prompt id.
pub type ModelEventStream = BoxStream<'static, Result<StreamEvent, ConvoyError>>;

/// Short reasoning summary emitted while the model thinks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThoughtSummary {
    pub subject: String,
    pub description: String,
}

/// Error payload carried by an `error` stream event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Payload of the `finished` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinishedInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

/// Token counts before and after history compression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompressionInfo {
    pub original_token_count: u32,
    pub new_token_count: u32,
}

/// Events produced by the agent-core while consuming a model response.
///
/// Unknown kinds deserialize into [`StreamEvent::Unknown`] and are dropped by
/// the processor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StreamEvent {
    Thought(ThoughtSummary),
    Content(String),
    ToolCallRequest(ToolCallRequest),
    Error(StructuredError),
    Finished(FinishedInfo),
    ChatCompressed(Option<ChatCompressionInfo>),
    UserCancelled,
    ToolCallConfirmation(serde_json::Value),
    ToolCallResponse(ToolCallResponse),
    MaxSessionTurns,
    LoopDetected,
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Wire name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Thought(_) => "thought",
            Self::Content(_) => "content",
            Self::ToolCallRequest(_) => "tool_call_request",
            Self::Error(_) => "error",
            Self::Finished(_) => "finished",
            Self::ChatCompressed(_) => "chat_compressed",
            Self::UserCancelled => "user_cancelled",
            Self::ToolCallConfirmation(_) => "tool_call_confirmation",
            Self::ToolCallResponse(_) => "tool_call_response",
            Self::MaxSessionTurns => "max_session_turns",
            Self::LoopDetected => "loop_detected",
            Self::Unknown => "unknown",
        }
    }
}
