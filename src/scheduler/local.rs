//! In-process scheduler over a [`ToolRegistry`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{SchedulerEvent, SchedulerEventSender, ToolScheduler};
use crate::error::{ConvoyError, Result};
use crate::tools::{cancelled_response, error_response, Tool, ToolKind, ToolRegistry};
use crate::types::{
    ConfirmationDetails, ConfirmationKind, ConfirmationOutcome, ToolCall, ToolCallRequest,
    ToolCallStatus,
};
use crate::util::lock;

/// Sequential confirm/execute scheduler.
///
/// Edit, execute and MCP tools wait for [`ToolScheduler::handle_confirmation`]
/// unless the user already answered `proceed_always*` for that tool.
#[derive(Clone)]
pub struct LocalScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<ToolRegistry>,
    events: SchedulerEventSender,
    pending: Mutex<HashMap<String, oneshot::Sender<ConfirmationOutcome>>>,
    always_allowed: Mutex<HashSet<String>>,
}

impl LocalScheduler {
    pub fn new(registry: Arc<ToolRegistry>, events: SchedulerEventSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                events,
                pending: Mutex::new(HashMap::new()),
                always_allowed: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Tools approved for the rest of the session, sorted.
    pub fn always_allowed(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.inner.always_allowed).iter().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("registry", &self.inner.registry)
            .finish()
    }
}

#[async_trait]
impl ToolScheduler for LocalScheduler {
    async fn schedule(&self, requests: Vec<ToolCallRequest>, cancel: CancellationToken) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_batch(requests, cancel).await });
        Ok(())
    }

    async fn handle_confirmation(&self, call_id: &str, outcome: ConfirmationOutcome) -> Result<()> {
        let sender = lock(&self.inner.pending).remove(call_id).ok_or_else(|| {
            ConvoyError::InvalidState(format!("no confirmation pending for call {call_id}"))
        })?;
        // A closed receiver means the batch was cancelled meanwhile.
        let _ = sender.send(outcome);
        Ok(())
    }
}

impl Inner {
    fn publish(&self, calls: &[ToolCall]) {
        // The agent may already have dropped its receiver after a stop.
        let _ = self.events.send(SchedulerEvent::ToolCallsUpdate(calls.to_vec()));
    }

    fn is_always_allowed(&self, tool_name: &str) -> bool {
        lock(&self.always_allowed).contains(tool_name)
    }

    /// Always ends with exactly one `AllToolCallsComplete`.
    async fn run_batch(&self, requests: Vec<ToolCallRequest>, cancel: CancellationToken) {
        let mut calls: Vec<ToolCall> = requests
            .into_iter()
            .map(|request| ToolCall::new(request, ToolCallStatus::Validating))
            .collect();
        self.publish(&calls);

        let mut tools: Vec<Option<Arc<dyn Tool>>> = Vec::with_capacity(calls.len());
        let mut approvals: HashMap<String, oneshot::Receiver<ConfirmationOutcome>> = HashMap::new();
        for call in calls.iter_mut() {
            match self.registry.prepare(&call.request) {
                Ok(tool) => {
                    let kind = tool.kind();
                    if kind.requires_confirmation() && !self.is_always_allowed(tool.name()) {
                        let (tx, rx) = oneshot::channel();
                        lock(&self.pending).insert(call.request.call_id.clone(), tx);
                        approvals.insert(call.request.call_id.clone(), rx);
                        call.status = ToolCallStatus::AwaitingApproval;
                        call.confirmation = Some(confirmation_details(kind, &call.request));
                    } else {
                        call.status = ToolCallStatus::Scheduled;
                    }
                    tools.push(Some(tool));
                }
                Err(err) => {
                    call.status = ToolCallStatus::Error;
                    call.response = error_response(&call.request, &err.to_string());
                    tools.push(None);
                }
            }
        }
        self.publish(&calls);

        for (index, tool) in tools.into_iter().enumerate() {
            let Some(tool) = tool else { continue };
            let call_id = calls[index].request.call_id.clone();

            if cancel.is_cancelled() {
                lock(&self.pending).remove(&call_id);
                cancel_call(&mut calls[index], "turn was aborted");
                self.publish(&calls);
                continue;
            }

            if let Some(rx) = approvals.remove(&call_id) {
                let outcome = if self.is_always_allowed(tool.name()) {
                    lock(&self.pending).remove(&call_id);
                    ConfirmationOutcome::ProceedAlways
                } else {
                    tokio::select! {
                        _ = cancel.cancelled() => ConfirmationOutcome::Cancel,
                        outcome = rx => outcome.unwrap_or(ConfirmationOutcome::Cancel),
                    }
                };
                if !outcome.allows_execution() {
                    lock(&self.pending).remove(&call_id);
                    let reason = if cancel.is_cancelled() {
                        "turn was aborted"
                    } else {
                        "user did not allow tool call"
                    };
                    cancel_call(&mut calls[index], reason);
                    self.publish(&calls);
                    continue;
                }
                if outcome.is_sticky() {
                    lock(&self.always_allowed).insert(tool.name().to_string());
                }
                calls[index].confirmation = None;
            }

            calls[index].status = ToolCallStatus::Executing;
            self.publish(&calls);

            tracing::debug!(call_id = %call_id, tool = %tool.name(), "executing tool");
            match self
                .registry
                .run(tool.as_ref(), &calls[index].request, cancel.clone())
                .await
            {
                Ok(response) => {
                    calls[index].status = if response.error.is_some() {
                        ToolCallStatus::Error
                    } else {
                        ToolCallStatus::Success
                    };
                    calls[index].response = response;
                }
                Err(ConvoyError::Canceled) => cancel_call(&mut calls[index], "turn was aborted"),
                Err(err) => {
                    calls[index].status = ToolCallStatus::Error;
                    calls[index].response = error_response(&calls[index].request, &err.to_string());
                }
            }
            self.publish(&calls);
        }

        let _ = self.events.send(SchedulerEvent::AllToolCallsComplete(calls));
    }
}

fn cancel_call(call: &mut ToolCall, reason: &str) {
    call.status = ToolCallStatus::Cancelled;
    call.confirmation = None;
    call.response = cancelled_response(&call.request, reason);
}

fn confirmation_details(kind: ToolKind, request: &ToolCallRequest) -> ConfirmationDetails {
    let arg = |key: &str| request.args.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let urls = arg("url").into_iter().collect();
    match kind {
        ToolKind::Edit => ConfirmationDetails {
            kind: ConfirmationKind::Edit,
            title: format!(
                "Confirm Edit: {}",
                arg("file_path").unwrap_or_else(|| request.name.clone())
            ),
            prompt: None,
            urls,
        },
        ToolKind::Execute => ConfirmationDetails {
            kind: ConfirmationKind::Exec,
            title: "Confirm Shell Command".into(),
            prompt: arg("command"),
            urls,
        },
        ToolKind::Mcp => ConfirmationDetails {
            kind: ConfirmationKind::Mcp,
            title: format!("Confirm MCP Tool: {}", request.name),
            prompt: None,
            urls,
        },
        _ => ConfirmationDetails {
            kind: ConfirmationKind::Info,
            title: format!("Confirm: {}", request.name),
            prompt: None,
            urls,
        },
    }
}
