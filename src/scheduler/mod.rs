//! Tool-call scheduling interface and a local confirm/execute scheduler.
//!
//! A scheduler receives a batch of requests and walks each call through
//! `validating → scheduled | awaiting_approval → executing → terminal`. Progress
//! is reported as [`SchedulerEvent`]s: one `ToolCallsUpdate` per transition and a
//! single `AllToolCallsComplete` once every call in the batch is terminal.

pub mod local;
pub mod tracked;

pub use local::LocalScheduler;
pub use tracked::{TrackedToolCall, TrackedToolCalls};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{CompletedToolCall, ConfirmationOutcome, ToolCall, ToolCallRequest};

/// Progress notifications from a scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Snapshot of the whole batch after any status change.
    ToolCallsUpdate(Vec<ToolCall>),
    /// Fired once per batch when every call is terminal.
    AllToolCallsComplete(Vec<CompletedToolCall>),
}

pub type SchedulerEventSender = mpsc::UnboundedSender<SchedulerEvent>;
pub type SchedulerEventReceiver = mpsc::UnboundedReceiver<SchedulerEvent>;

pub fn scheduler_channel() -> (SchedulerEventSender, SchedulerEventReceiver) {
    mpsc::unbounded_channel()
}

/// Confirm/execute state machine for tool calls.
#[async_trait]
pub trait ToolScheduler: Send + Sync {
    /// Accept a batch. Returns once the batch is queued; progress arrives as events.
    async fn schedule(&self, requests: Vec<ToolCallRequest>, cancel: CancellationToken) -> Result<()>;

    /// Deliver the user's decision for a call awaiting approval.
    async fn handle_confirmation(&self, call_id: &str, outcome: ConfirmationOutcome) -> Result<()>;
}
