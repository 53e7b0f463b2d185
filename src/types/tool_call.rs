//! Tool-call data model shared by the stream processor, scheduler and merger.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::PartListUnion;
use crate::error::ConvoyError;

/// Arguments of a tool call, keyed by parameter name.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// A tool invocation requested by the model or by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub args: ToolArgs,
    #[serde(default)]
    pub is_client_initiated: bool,
    pub prompt_id: String,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        args: ToolArgs,
        prompt_id: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args,
            is_client_initiated: false,
            prompt_id: prompt_id.into(),
        }
    }

    pub fn client_initiated(mut self) -> Self {
        self.is_client_initiated = true;
        self
    }
}

/// Scheduler-reported status of a tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCallStatus {
    Validating,
    Scheduled,
    AwaitingApproval,
    Executing,
    Success,
    Error,
    Cancelled,
}

impl ToolCallStatus {
    /// `success`, `error` and `cancelled` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }
}

/// Result of executing (or refusing) a tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResponse {
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_parts: Option<PartListUnion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the user is asked to approve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    Edit,
    Exec,
    Mcp,
    Info,
}

/// Details shown to the user while a call awaits approval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationDetails {
    pub kind: ConfirmationKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

/// The user's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmationOutcome {
    ProceedOnce,
    ProceedAlways,
    ProceedAlwaysServer,
    ProceedAlwaysTool,
    ModifyWithEditor,
    Cancel,
}

impl ConfirmationOutcome {
    pub fn allows_execution(self) -> bool {
        !matches!(self, Self::Cancel)
    }

    /// Whether the approval should be remembered for the rest of the session.
    pub fn is_sticky(self) -> bool {
        matches!(
            self,
            Self::ProceedAlways | Self::ProceedAlwaysServer | Self::ProceedAlwaysTool
        )
    }
}

impl FromStr for ConfirmationOutcome {
    type Err = ConvoyError;

    /// Parse a UI confirm key. `allow_always` is the key sent in unattended mode.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "proceed_once" | "allow_once" => Ok(Self::ProceedOnce),
            "proceed_always" | "allow_always" => Ok(Self::ProceedAlways),
            "proceed_always_server" => Ok(Self::ProceedAlwaysServer),
            "proceed_always_tool" => Ok(Self::ProceedAlwaysTool),
            "modify_with_editor" => Ok(Self::ModifyWithEditor),
            "cancel" | "reject" => Ok(Self::Cancel),
            other => Err(ConvoyError::InvalidArgument(format!(
                "unknown confirm key '{other}'"
            ))),
        }
    }
}

/// A tool call as reported by the scheduler on each update tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub request: ToolCallRequest,
    pub status: ToolCallStatus,
    #[serde(default)]
    pub response: ToolCallResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationDetails>,
}

impl ToolCall {
    pub fn new(request: ToolCallRequest, status: ToolCallStatus) -> Self {
        let response = ToolCallResponse {
            call_id: request.call_id.clone(),
            ..Default::default()
        };
        Self {
            request,
            status,
            response,
            confirmation: None,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.request.call_id
    }
}

/// A [`ToolCall`] as delivered when its batch completes.
///
/// Completion batches may still contain non-terminal entries; consumers filter
/// on [`ToolCallStatus::is_terminal`].
pub type CompletedToolCall = ToolCall;
