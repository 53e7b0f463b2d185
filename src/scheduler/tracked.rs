//! Scheduler-reported calls plus the agent's own submission bookkeeping.

use std::collections::HashMap;

use crate::types::ToolCall;

/// A scheduler call annotated with whether its response went back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedToolCall {
    pub call: ToolCall,
    pub response_submitted: bool,
}

/// The current batch as last reported by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct TrackedToolCalls {
    calls: Vec<TrackedToolCall>,
}

impl TrackedToolCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked list with a scheduler snapshot.
    ///
    /// `response_submitted` survives for call ids present in both; ids missing
    /// from the snapshot belong to a superseded batch and are dropped.
    pub fn apply_update(&mut self, calls: Vec<ToolCall>) {
        let submitted: HashMap<String, bool> = self
            .calls
            .drain(..)
            .map(|t| (t.call.request.call_id, t.response_submitted))
            .collect();
        self.calls = calls
            .into_iter()
            .map(|call| TrackedToolCall {
                response_submitted: submitted.get(call.call_id()).copied().unwrap_or(false),
                call,
            })
            .collect();
    }

    pub fn mark_submitted<'a>(&mut self, call_ids: impl IntoIterator<Item = &'a str>) {
        for id in call_ids {
            if let Some(tracked) = self.calls.iter_mut().find(|t| t.call.call_id() == id) {
                tracked.response_submitted = true;
            }
        }
    }

    pub fn get(&self, call_id: &str) -> Option<&TrackedToolCall> {
        self.calls.iter().find(|t| t.call.call_id() == call_id)
    }

    pub fn calls(&self) -> &[TrackedToolCall] {
        &self.calls
    }

    /// Calls that finished but whose responses were never sent back.
    pub fn unsubmitted_terminal(&self) -> Vec<&ToolCall> {
        self.calls
            .iter()
            .filter(|t| !t.response_submitted && t.call.status.is_terminal())
            .map(|t| &t.call)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolArgs, ToolCallRequest, ToolCallStatus};

    fn call(id: &str, status: ToolCallStatus) -> ToolCall {
        ToolCall::new(ToolCallRequest::new(id, "read_file", ToolArgs::new(), "p1"), status)
    }

    #[test]
    fn submission_flag_survives_status_updates() {
        let mut tracked = TrackedToolCalls::new();
        tracked.apply_update(vec![call("a", ToolCallStatus::Executing)]);
        tracked.mark_submitted(["a"]);
        tracked.apply_update(vec![
            call("a", ToolCallStatus::Success),
            call("b", ToolCallStatus::Scheduled),
        ]);

        let a = tracked.get("a").unwrap();
        assert!(a.response_submitted);
        assert_eq!(a.call.status, ToolCallStatus::Success);
        assert!(!tracked.get("b").unwrap().response_submitted);
    }

    #[test]
    fn new_batch_supersedes_old_calls() {
        let mut tracked = TrackedToolCalls::new();
        tracked.apply_update(vec![call("a", ToolCallStatus::Success)]);
        tracked.apply_update(vec![call("b", ToolCallStatus::Success)]);
        assert!(tracked.get("a").is_none());
        assert_eq!(tracked.unsubmitted_terminal().len(), 1);
        tracked.clear();
        assert!(tracked.is_empty());
    }
}
