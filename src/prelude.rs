//! Convenience re-exports for common use.

pub use crate::agent::{
    AgentOptions, AgentState, ConfirmRequest, ConversationAgent, TurnOutcome, UiEvent, UiPayload,
};
pub use crate::config::ConvoyConfig;
pub use crate::core::{AgentCore, AgentCoreFactory, ConversationHistory, ToolExecutor};
pub use crate::error::{ConvoyError, Result};
pub use crate::guard::ToolCallGuard;
pub use crate::models::ModelSelection;
pub use crate::process::{AgentProcessManager, InMemoryMessageStore, InProcessLauncher};
pub use crate::scheduler::{LocalScheduler, SchedulerEvent, ToolScheduler};
pub use crate::tools::{AgentTool, Tool, ToolArguments, ToolParameters, ToolRegistry};
pub use crate::types::{PartUnion, StreamEvent, ToolCallRequest, ToolCallStatus};
