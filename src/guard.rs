//! In-flight tool-call registry.
//!
//! A call id is `protected` while its tool is executing and must not be
//! cancelled by stream-retry logic, and `completed` once it has reached a
//! terminal state. An id is in at most one of the two sets.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct GuardState {
    protected: HashSet<String>,
    completed: HashSet<String>,
}

/// Registry of protected / completed tool-call ids for one agent.
///
/// Cloning yields a handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct ToolCallGuard {
    state: Arc<Mutex<GuardState>>,
}

impl ToolCallGuard {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a plain set operation that cannot leave the state half-updated.
    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark a call as in flight. Idempotent.
    pub fn protect(&self, call_id: &str) {
        let mut state = self.lock();
        state.completed.remove(call_id);
        state.protected.insert(call_id.to_string());
    }

    pub fn is_protected(&self, call_id: &str) -> bool {
        self.lock().protected.contains(call_id)
    }

    /// Move a call from protected to completed (marks completed even if never protected).
    pub fn complete(&self, call_id: &str) {
        let mut state = self.lock();
        state.protected.remove(call_id);
        state.completed.insert(call_id.to_string());
    }

    pub fn is_completed(&self, call_id: &str) -> bool {
        self.lock().completed.contains(call_id)
    }

    /// Drop protection without marking completed, so a retry may protect the id again.
    pub fn unprotect(&self, call_id: &str) {
        self.lock().protected.remove(call_id);
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.protected.clear();
        state.completed.clear();
    }

    /// Protected ids, sorted for stable diagnostics.
    pub fn protected_call_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().protected.iter().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_moves_id_out_of_protected() {
        let guard = ToolCallGuard::new();
        guard.protect("call-1");
        assert!(guard.is_protected("call-1"));

        guard.complete("call-1");
        assert!(!guard.is_protected("call-1"));
        assert!(guard.is_completed("call-1"));
    }

    #[test]
    fn unprotect_is_not_terminal_and_allows_reprotect() {
        let guard = ToolCallGuard::new();
        guard.protect("call-1");
        guard.unprotect("call-1");
        assert!(!guard.is_protected("call-1"));
        assert!(!guard.is_completed("call-1"));

        guard.protect("call-1");
        assert!(guard.is_protected("call-1"));
    }

    #[test]
    fn complete_without_protect_still_marks_completed() {
        let guard = ToolCallGuard::new();
        guard.complete("never-protected");
        assert!(guard.is_completed("never-protected"));
        assert!(!guard.is_protected("never-protected"));
    }

    #[test]
    fn protect_is_idempotent_and_listed_once() {
        let guard = ToolCallGuard::new();
        guard.protect("b");
        guard.protect("a");
        guard.protect("b");
        assert_eq!(guard.protected_call_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn clear_empties_both_sets() {
        let guard = ToolCallGuard::new();
        guard.protect("a");
        guard.complete("b");
        guard.clear();
        assert!(guard.protected_call_ids().is_empty());
        assert!(!guard.is_completed("b"));
    }

    #[test]
    fn clones_share_state() {
        let guard = ToolCallGuard::new();
        let other = guard.clone();
        other.protect("shared");
        assert!(guard.is_protected("shared"));
    }
}
