//! Convoy: tool-call scheduling and stream resilience for multi-conversation
//! LLM chat clients.
//!
//! Each conversation is driven by a [`agent::ConversationAgent`] that streams
//! model output, schedules the tool calls it requests, merges their results
//! back into the next model turn, and survives transient stream failures.
//! Conversations run in isolated workers managed by
//! [`process::AgentProcessManager`].
//!
//! Model inference and tool primitives live behind the [`core::AgentCore`]
//! traits; this crate orchestrates them.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use convoy::prelude::*;
//!
//! # async fn example(core: Arc<dyn AgentCore>) -> convoy::error::Result<()> {
//! let options = ConvoyConfig::load(None)?.agent_options("conversation-1")?;
//! let agent = ConversationAgent::new(options, core);
//! let mut events = agent.subscribe();
//! let turn = agent.send("list the files here", "msg-1")?;
//! while let Ok(event) = events.recv().await {
//!     if event.is_finish() {
//!         break;
//!     }
//! }
//! turn.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod guard;
pub mod merger;
pub mod models;
pub mod prelude;
pub mod process;
pub mod scheduler;
pub mod stream;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
