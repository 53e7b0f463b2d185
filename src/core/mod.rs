//! Interfaces of the external agent-core library.
//!
//! Model inference, MCP plumbing and tool primitives live behind these traits.
//! The crate drives them; it never implements a provider itself.

pub mod formatter;

pub use formatter::{DefaultErrorFormatter, ErrorFormatter};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::AgentOptions;
use crate::auth::AuthType;
use crate::error::Result;
use crate::scheduler::{SchedulerEventSender, ToolScheduler};
use crate::types::{Content, ModelEventStream, PartUnion, ToolCallRequest, ToolCallResponse};

/// Result of loading hierarchical memory files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryLoad {
    pub memory_content: String,
    pub file_count: usize,
}

/// Answer returned to the core when the primary model reports capacity exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackDecision {
    RetryOnce,
    Stop,
}

/// Context handed to the fallback handler.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRequest {
    pub failed_model: String,
    pub fallback_model: Option<String>,
    pub error: Option<String>,
}

pub type FallbackHandler = Arc<dyn Fn(&FallbackRequest) -> FallbackDecision + Send + Sync>;

/// Model-facing conversation history.
#[async_trait]
pub trait ConversationHistory: Send + Sync {
    async fn add_history(&self, content: Content) -> Result<()>;
}

/// Direct tool invocation, used for client-initiated calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one call. Tool failures are reported through
    /// [`ToolCallResponse::error`]; `Err` is reserved for cancellation and
    /// infrastructure faults.
    async fn execute(
        &self,
        request: &ToolCallRequest,
        cancel: CancellationToken,
    ) -> Result<ToolCallResponse>;
}

/// One conversation's handle on the agent-core.
#[async_trait]
pub trait AgentCore: ConversationHistory {
    fn session_id(&self) -> &str;

    /// Load config and register tools and MCP servers.
    async fn initialize(&self) -> Result<()>;

    async fn refresh_auth(&self, auth_type: AuthType) -> Result<()>;

    /// Load (or reload) hierarchical memory into the core's context.
    async fn load_memory(&self) -> Result<MemoryLoad>;

    /// Build a scheduler that reports progress on `events`.
    fn create_scheduler(&self, events: SchedulerEventSender) -> Arc<dyn ToolScheduler>;

    /// Start one model request. The stream ends when the response does.
    async fn send_message_stream(
        &self,
        parts: Vec<PartUnion>,
        prompt_id: &str,
        cancel: CancellationToken,
    ) -> Result<ModelEventStream>;

    fn set_fallback_handler(&self, handler: FallbackHandler);

    fn error_formatter(&self) -> Arc<dyn ErrorFormatter> {
        Arc::new(DefaultErrorFormatter)
    }

    fn tool_executor(&self) -> Arc<dyn ToolExecutor>;
}

/// Builds a core for a conversation; workers hold one of these.
pub trait AgentCoreFactory: Send + Sync {
    fn create(&self, options: &AgentOptions) -> Result<Arc<dyn AgentCore>>;
}

impl<F> AgentCoreFactory for F
where
    F: Fn(&AgentOptions) -> Result<Arc<dyn AgentCore>> + Send + Sync,
{
    fn create(&self, options: &AgentOptions) -> Result<Arc<dyn AgentCore>> {
        self(options)
    }
}
