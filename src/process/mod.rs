//! Agent process manager: each conversation runs in its own worker.
//!
//! The supervisor ([`AgentProcessManager`]) talks to workers over
//! newline-delimited JSON ([`ipc`]). A worker ([`worker::serve`]) hosts one
//! [`crate::agent::ConversationAgent`]. Isolation keeps a hung tool in one
//! conversation from stalling the others and makes environment-based key
//! rotation safe.

pub mod ipc;
pub mod launcher;
pub mod manager;
pub mod persist;
pub mod worker;

pub use ipc::{WorkerCommand, WorkerMessage};
pub use launcher::{
    ChildProcessLauncher, InProcessLauncher, WorkerConnection, WorkerLauncher, WorkerProcess,
    CONVERSATION_ENV,
};
pub use manager::{AgentProcessManager, ConversationEvent};
pub use persist::{
    compose_message, InMemoryMessageStore, MessagePosition, MessageStore, StoredContent,
    StoredMessage,
};
pub use worker::serve;
