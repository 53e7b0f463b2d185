//! Conversation agent: one model conversation with scheduled tool execution.

pub mod conversation;
pub mod events;
pub mod fallback;
pub mod options;
mod turn;

pub use conversation::{ConfirmRequest, ConversationAgent, TurnHandle, TurnOutcome};
pub use events::{AgentState, ToolGroupItem, UiEvent, UiPayload};
pub use fallback::fallback_handler;
pub use options::AgentOptions;
