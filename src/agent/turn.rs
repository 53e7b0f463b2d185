//! One user turn: stream, schedule tools, merge results, repeat.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::conversation::{AgentInner, TurnOutcome};
use super::events::{AgentState, ToolGroupItem, UiPayload};
use crate::error::{enrich_error_message, ConvoyError, Result};
use crate::merger::merge_completed;
use crate::scheduler::SchedulerEvent;
use crate::stream::{normalize_tool_params, process_stream, NormalizedEvent, StreamContext, StreamStatus};
use crate::types::{
    CompletedToolCall, ConfirmationOutcome, PartUnion, ToolCallRequest, ToolCallStatus,
    UsageMetadata,
};

/// Confirm key sent on the user's behalf in YOLO mode.
const YOLO_CONFIRM_KEY: &str = "allow_always";

/// Tools whose `url` argument is mirrored to the UI as a preview.
const BROWSER_TOOL_PREFIXES: &[&str] = &["browser_", "chrome_", "playwright_", "web_navigate"];

struct StreamPass {
    requests: Vec<ToolCallRequest>,
    usage: Option<UsageMetadata>,
    /// Transport failure, already reported to the UI.
    error: Option<String>,
}

enum TurnEnd {
    Done(Option<UsageMetadata>),
    /// The model stream broke; the error event went out with the stream.
    Failed(String),
}

struct Turn<'a> {
    inner: &'a Arc<AgentInner>,
    msg_id: &'a str,
    cancel: &'a CancellationToken,
    /// Every call id protected during this turn.
    call_ids: Vec<String>,
}

pub(crate) async fn run(
    inner: &Arc<AgentInner>,
    msg_id: &str,
    cancel: &CancellationToken,
    parts: Vec<PartUnion>,
) -> TurnOutcome {
    let mut turn = Turn {
        inner,
        msg_id,
        cancel,
        call_ids: Vec::new(),
    };
    turn.emit(UiPayload::Start);

    let outcome = match turn.drive(parts).await {
        _ if cancel.is_cancelled() => {
            turn.release_unfinished();
            TurnOutcome::Cancelled
        }
        Ok(TurnEnd::Done(usage)) => {
            inner.reset_key_pass();
            inner.emit(msg_id, UiPayload::Finish(usage.clone()));
            return TurnOutcome::Completed { usage };
        }
        Ok(TurnEnd::Failed(error)) => {
            turn.release_unfinished();
            tracing::warn!(
                conversation_id = %inner.options.conversation_id,
                %msg_id,
                %error,
                "model stream failed"
            );
            TurnOutcome::Failed {
                error: enrich_error_message(&error),
            }
        }
        Err(err) => {
            turn.release_unfinished();
            let error = enrich_error_message(&err.to_string());
            tracing::warn!(
                conversation_id = %inner.options.conversation_id,
                %msg_id,
                error = %err,
                "turn failed"
            );
            turn.emit(UiPayload::Error(error.clone()));
            TurnOutcome::Failed { error }
        }
    };
    inner.emit(msg_id, UiPayload::Finish(None));
    outcome
}

fn preview_url(request: &ToolCallRequest) -> Option<String> {
    let name = request.name.to_ascii_lowercase();
    if !BROWSER_TOOL_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return None;
    }
    request
        .args
        .get("url")
        .and_then(|v| v.as_str())
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .map(str::to_string)
}

impl Turn<'_> {
    /// Emit unless the turn was stopped; after a stop only `finish` goes out.
    fn emit(&self, payload: UiPayload) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.inner.emit(self.msg_id, payload);
    }

    fn release_unfinished(&self) {
        for call_id in &self.call_ids {
            self.inner.guard.unprotect(call_id);
        }
    }

    async fn drive(&mut self, parts: Vec<PartUnion>) -> Result<TurnEnd> {
        // Continuations reuse the prompt id of the message that started them.
        let prompt_id = format!(
            "{}-{}",
            self.inner.core.session_id(),
            uuid::Uuid::new_v4().simple()
        );
        let mut input = parts;
        if let Some(prefix) = self.inner.take_history_prefix() {
            input.insert(0, PartUnion::Text(prefix));
        }
        let mut usage: Option<UsageMetadata> = None;

        loop {
            self.inner.set_state(AgentState::Sending);
            let Some(pass) = self.stream_with_retry(&input, &prompt_id).await? else {
                return Ok(TurnEnd::Done(usage));
            };
            if let Some(error) = pass.error {
                // Nothing will run these; let the guard forget them.
                for request in &pass.requests {
                    self.inner.guard.unprotect(&request.call_id);
                }
                return Ok(TurnEnd::Failed(error));
            }
            if let Some(pass_usage) = &pass.usage {
                usage.get_or_insert_with(UsageMetadata::default).merge(pass_usage);
            }
            if pass.requests.is_empty() {
                return Ok(TurnEnd::Done(usage));
            }

            self.inner.set_state(AgentState::ToolsPending);
            let Some(completed) = self.run_tools(pass.requests).await? else {
                return Ok(TurnEnd::Done(usage));
            };
            for call in completed.iter().filter(|c| c.status.is_terminal()) {
                self.inner.guard.complete(call.call_id());
            }

            let mut refresh_memory = false;
            let next = merge_completed(&completed, self.inner.core.as_ref(), || {
                refresh_memory = true
            })
            .await?;
            self.inner.tracked().mark_submitted(
                completed
                    .iter()
                    .filter(|c| c.status.is_terminal() && !c.request.is_client_initiated)
                    .map(|c| c.call_id()),
            );
            if refresh_memory {
                match self.inner.core.load_memory().await {
                    Ok(memory) => tracing::debug!(files = memory.file_count, "memory refreshed"),
                    Err(err) => tracing::warn!(error = %err, "memory refresh failed"),
                }
            }

            match next {
                Some(parts) if !parts.is_empty() && !self.cancel.is_cancelled() => input = parts,
                _ => return Ok(TurnEnd::Done(usage)),
            }
        }
    }

    /// Run one model request, retrying invalid streams.
    ///
    /// Requests from a stream found invalid are discarded with it; only the
    /// retried stream's calls run. `None` means the turn was stopped.
    async fn stream_with_retry(
        &mut self,
        input: &[PartUnion],
        prompt_id: &str,
    ) -> Result<Option<StreamPass>> {
        let formatter = self.inner.core.error_formatter();
        let mut retry = self.inner.options.retry.start();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let stream = self
                .inner
                .core
                .send_message_stream(input.to_vec(), prompt_id, self.cancel.clone())
                .await?;
            let ctx = StreamContext {
                auth_type: self.inner.auth_type,
                formatter: formatter.as_ref(),
                cancel: self.cancel,
            };

            let mut requests = Vec::new();
            let result = {
                let this = &*self;
                process_stream(stream, &ctx, |event| this.on_stream_event(event, &mut requests))
                    .await
            };
            self.call_ids
                .extend(requests.iter().map(|r| r.call_id.clone()));

            if result.status == StreamStatus::UserCancelled || self.cancel.is_cancelled() {
                return Ok(None);
            }

            if let Some(reason) = result.invalid_stream {
                for request in &requests {
                    self.inner.guard.unprotect(&request.call_id);
                }
                let Some(delay) = retry.next_delay() else {
                    return Err(ConvoyError::InvalidStream(format!(
                        "{reason} (gave up after {} retries)",
                        retry.max()
                    )));
                };
                tracing::warn!(
                    conversation_id = %self.inner.options.conversation_id,
                    %reason,
                    attempt = retry.attempt(),
                    discarded = requests.len(),
                    "invalid stream; retrying"
                );
                self.emit(UiPayload::Error(format!(
                    "Invalid stream detected ({reason}); retrying ({}/{})...",
                    retry.attempt(),
                    retry.max()
                )));
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            return Ok(Some(StreamPass {
                requests,
                usage: result.usage_metadata,
                error: result.error,
            }));
        }
    }

    fn on_stream_event(&self, event: NormalizedEvent, requests: &mut Vec<ToolCallRequest>) {
        match event {
            NormalizedEvent::Thought(thought) => self.emit(UiPayload::Thought(thought)),
            NormalizedEvent::Content(text) => self.emit(UiPayload::Content(text)),
            NormalizedEvent::Error(message) => {
                self.emit(UiPayload::Error(enrich_error_message(&message)))
            }
            NormalizedEvent::ToolCallRequest(mut request) => {
                request.args = normalize_tool_params(&request.name, std::mem::take(&mut request.args));
                self.inner.guard.protect(&request.call_id);
                if let Some(url) = preview_url(&request) {
                    self.emit(UiPayload::PreviewOpen { url });
                }
                requests.push(request);
            }
            NormalizedEvent::Finished(_) => {}
        }
    }

    /// Schedule `requests` and wait for the batch to complete.
    ///
    /// A batch aborted by an earlier stop may still report on the shared
    /// channel; events naming calls outside this batch are skipped.
    async fn run_tools(
        &self,
        requests: Vec<ToolCallRequest>,
    ) -> Result<Option<Vec<CompletedToolCall>>> {
        let scheduler = self.inner.scheduler()?;
        let mut events = self.inner.scheduler_events.lock().await;
        while events.try_recv().is_ok() {}

        let batch: HashSet<String> = requests.iter().map(|r| r.call_id.clone()).collect();
        let in_batch = |calls: &[CompletedToolCall]| {
            calls.iter().all(|c| batch.contains(c.call_id()))
        };
        scheduler.schedule(requests, self.cancel.clone()).await?;
        let mut auto_confirmed: HashSet<String> = HashSet::new();

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                event = events.recv() => event,
            };
            match event {
                Some(
                    SchedulerEvent::ToolCallsUpdate(calls)
                    | SchedulerEvent::AllToolCallsComplete(calls),
                ) if !in_batch(calls.as_slice()) => {
                    tracing::debug!(
                        conversation_id = %self.inner.options.conversation_id,
                        "skipping scheduler event from an earlier batch"
                    );
                }
                None => {
                    return Err(ConvoyError::InvalidState(
                        "tool scheduler stopped reporting".into(),
                    ))
                }
                Some(SchedulerEvent::ToolCallsUpdate(calls)) => {
                    self.emit(UiPayload::ToolGroup(
                        calls.iter().map(ToolGroupItem::from).collect(),
                    ));
                    let awaiting: Vec<String> = calls
                        .iter()
                        .filter(|c| c.status == ToolCallStatus::AwaitingApproval)
                        .map(|c| c.call_id().to_string())
                        .collect();
                    self.inner.tracked().apply_update(calls);
                    if self.inner.options.yolo_mode {
                        for call_id in awaiting {
                            if auto_confirmed.insert(call_id.clone()) {
                                let outcome: ConfirmationOutcome = YOLO_CONFIRM_KEY.parse()?;
                                scheduler.handle_confirmation(&call_id, outcome).await?;
                            }
                        }
                    }
                }
                Some(SchedulerEvent::AllToolCallsComplete(calls)) => {
                    self.inner.tracked().apply_update(calls.clone());
                    return Ok(Some(calls));
                }
            }
        }
    }
}
