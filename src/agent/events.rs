//! Events delivered to the UI for one conversation.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::{
    ConfirmationDetails, ThoughtSummary, ToolCall, ToolCallStatus, UsageMetadata,
};

/// Lifecycle of a conversation agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentState {
    Uninitialized,
    Bootstrapping,
    Ready,
    Sending,
    ToolsPending,
    Stopped,
}

/// One tool call as rendered in a tool group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolGroupItem {
    pub call_id: String,
    pub name: String,
    pub description: String,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationDetails>,
}

impl From<&ToolCall> for ToolGroupItem {
    fn from(call: &ToolCall) -> Self {
        Self {
            call_id: call.request.call_id.clone(),
            name: call.request.name.clone(),
            description: serde_json::Value::Object(call.request.args.clone()).to_string(),
            status: call.status,
            result_display: call.response.result_display.clone(),
            confirmation: call.confirmation.clone(),
        }
    }
}

/// Payload of a UI event, serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UiPayload {
    Start,
    Thought(ThoughtSummary),
    Content(String),
    ToolGroup(Vec<ToolGroupItem>),
    PreviewOpen { url: String },
    Error(String),
    Finish(Option<UsageMetadata>),
}

/// A UI event tagged with the user message it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEvent {
    #[serde(flatten)]
    pub payload: UiPayload,
    pub msg_id: String,
}

impl UiEvent {
    pub fn new(msg_id: impl Into<String>, payload: UiPayload) -> Self {
        Self {
            payload,
            msg_id: msg_id.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.payload {
            UiPayload::Start => "start",
            UiPayload::Thought(_) => "thought",
            UiPayload::Content(_) => "content",
            UiPayload::ToolGroup(_) => "tool_group",
            UiPayload::PreviewOpen { .. } => "preview_open",
            UiPayload::Error(_) => "error",
            UiPayload::Finish(_) => "finish",
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self.payload, UiPayload::Finish(_))
    }
}
