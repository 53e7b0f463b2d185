//! One conversation's agent: bootstrap, turns, confirmation relay, teardown.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use super::events::{AgentState, ToolGroupItem, UiEvent, UiPayload};
use super::fallback::fallback_handler;
use super::options::AgentOptions;
use super::turn;
use crate::auth::{ApiKeyManager, AuthType, KeyStatus};
use crate::core::AgentCore;
use crate::error::{ConvoyError, Result};
use crate::guard::ToolCallGuard;
use crate::scheduler::{
    scheduler_channel, SchedulerEventReceiver, SchedulerEventSender, ToolScheduler,
    TrackedToolCall, TrackedToolCalls,
};
use crate::stream::{dispatch_function_calls, DispatchContext, DispatchProgress};
use crate::types::{
    ConfirmationOutcome, PartUnion, ToolCall, ToolCallRequest, ToolCallResponse, ToolCallStatus,
    UsageMetadata,
};
use crate::util::lock;

const EVENT_CAPACITY: usize = 1024;

type Bootstrap = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

/// A user's answer to a tool confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// UI confirm key, e.g. `proceed_once` or `allow_always`.
    pub confirm_key: String,
    pub msg_id: String,
    pub call_id: String,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed { usage: Option<UsageMetadata> },
    Cancelled,
    Failed { error: String },
}

/// Handle for a submitted message.
#[derive(Debug)]
pub struct TurnHandle {
    pub request_id: String,
    task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Wait until the turn (including tool continuations) ends.
    pub async fn wait(self) -> Result<TurnOutcome> {
        self.task
            .await
            .map_err(|e| ConvoyError::InvalidState(format!("turn task failed: {e}")))
    }
}

pub(crate) struct AgentInner {
    pub(crate) options: AgentOptions,
    pub(crate) core: Arc<dyn AgentCore>,
    pub(crate) auth_type: AuthType,
    pub(crate) keys: Option<Arc<Mutex<ApiKeyManager>>>,
    pub(crate) guard: ToolCallGuard,
    tracked: Mutex<TrackedToolCalls>,
    scheduler: OnceLock<Arc<dyn ToolScheduler>>,
    pub(crate) scheduler_events: tokio::sync::Mutex<SchedulerEventReceiver>,
    events: broadcast::Sender<UiEvent>,
    state: watch::Sender<AgentState>,
    pub(crate) turn_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<CancellationToken>>,
    history_prefix: Mutex<Option<String>>,
    pub(crate) closed: CancellationToken,
}

impl AgentInner {
    pub(crate) fn set_state(&self, state: AgentState) {
        self.state.send_replace(state);
    }

    pub(crate) fn emit(&self, msg_id: &str, payload: UiPayload) {
        // No subscribers is fine; events are fire-and-forget.
        let _ = self.events.send(UiEvent::new(msg_id, payload));
    }

    pub(crate) fn tracked(&self) -> MutexGuard<'_, TrackedToolCalls> {
        lock(&self.tracked)
    }

    pub(crate) fn scheduler(&self) -> Result<Arc<dyn ToolScheduler>> {
        self.scheduler
            .get()
            .cloned()
            .ok_or_else(|| ConvoyError::InvalidState("tool scheduler not initialized".into()))
    }

    pub(crate) fn take_history_prefix(&self) -> Option<String> {
        lock(&self.history_prefix).take()
    }

    pub(crate) fn begin_turn(&self) -> CancellationToken {
        let token = self.closed.child_token();
        *lock(&self.active) = Some(token.clone());
        token
    }

    pub(crate) fn end_turn(&self, token: &CancellationToken) {
        // Turns are serialized by `turn_lock`, so the active slot is ours.
        lock(&self.active).take();
        if !token.is_cancelled() && !self.closed.is_cancelled() {
            self.set_state(AgentState::Ready);
        }
    }

    pub(crate) fn reset_key_pass(&self) {
        if let Some(keys) = &self.keys {
            lock(keys).reset_pass();
        }
    }
}

async fn bootstrap(inner: Arc<AgentInner>, events: SchedulerEventSender) -> Result<()> {
    inner.set_state(AgentState::Bootstrapping);
    let core = &inner.core;
    core.initialize().await?;
    core.refresh_auth(inner.auth_type).await?;
    let memory = core.load_memory().await?;
    tracing::debug!(
        conversation_id = %inner.options.conversation_id,
        memory_files = memory.file_count,
        "memory loaded"
    );
    core.set_fallback_handler(fallback_handler(inner.keys.clone()));
    let scheduler = core.create_scheduler(events);
    if inner.scheduler.set(scheduler).is_err() {
        return Err(ConvoyError::InvalidState("agent bootstrapped twice".into()));
    }
    inner.set_state(AgentState::Ready);
    Ok(())
}

/// Orchestrates one conversation against an [`AgentCore`].
///
/// Cheap to clone; clones share the same conversation. Turns are strictly
/// sequential: a second `send` waits until the running turn has finished.
#[derive(Clone)]
pub struct ConversationAgent {
    inner: Arc<AgentInner>,
    bootstrap: Bootstrap,
}

impl std::fmt::Debug for ConversationAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationAgent")
            .field("conversation_id", &self.inner.options.conversation_id)
            .field("state", &self.state())
            .finish()
    }
}

impl ConversationAgent {
    /// Create the agent and start bootstrapping in the background.
    ///
    /// A key string holding several keys enables rotation through the process
    /// environment; one worker process per conversation keeps that safe.
    pub fn new(options: AgentOptions, core: Arc<dyn AgentCore>) -> Self {
        let auth_type = options.auth_type();
        let keys = options
            .api_key
            .as_deref()
            .filter(|raw| auth_type.uses_api_key() && ApiKeyManager::is_multi_key(raw))
            .map(|raw| ApiKeyManager::new(raw, auth_type));
        Self::with_key_manager(options, core, keys)
    }

    /// Like [`ConversationAgent::new`] with an explicit key manager.
    pub fn with_key_manager(
        options: AgentOptions,
        core: Arc<dyn AgentCore>,
        keys: Option<ApiKeyManager>,
    ) -> Self {
        let (scheduler_tx, scheduler_rx) = scheduler_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(AgentState::Uninitialized);
        let inner = Arc::new(AgentInner {
            auth_type: options.auth_type(),
            history_prefix: Mutex::new(options.history_prefix.clone()),
            options,
            core,
            keys: keys.map(|k| Arc::new(Mutex::new(k))),
            guard: ToolCallGuard::new(),
            tracked: Mutex::new(TrackedToolCalls::new()),
            scheduler: OnceLock::new(),
            scheduler_events: tokio::sync::Mutex::new(scheduler_rx),
            events,
            state,
            turn_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            closed: CancellationToken::new(),
        });

        let boot_inner = Arc::clone(&inner);
        let bootstrap: Bootstrap = async move {
            let conversation_id = boot_inner.options.conversation_id.clone();
            let result = bootstrap(Arc::clone(&boot_inner), scheduler_tx).await;
            if let Err(err) = &result {
                tracing::error!(%conversation_id, error = %err, "agent bootstrap failed");
                boot_inner.set_state(AgentState::Stopped);
            }
            result.map_err(|e| e.to_string())
        }
        .boxed()
        .shared();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(bootstrap.clone());
        }
        Self { inner, bootstrap }
    }

    pub fn conversation_id(&self) -> &str {
        &self.inner.options.conversation_id
    }

    pub fn options(&self) -> &AgentOptions {
        &self.inner.options
    }

    /// Wait for bootstrap to finish.
    pub async fn ready(&self) -> Result<()> {
        wait_ready(&self.bootstrap).await
    }

    pub fn state(&self) -> AgentState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<AgentState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.inner.events.subscribe()
    }

    /// UI events as a stream; lagged receivers skip what they missed.
    pub fn events(&self) -> impl Stream<Item = UiEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|item| async move { item.ok() })
    }

    /// Submit a user message. The turn runs in the background.
    pub fn send(&self, message: impl Into<String>, msg_id: impl Into<String>) -> Result<TurnHandle> {
        self.send_parts(vec![PartUnion::Text(message.into())], msg_id)
    }

    pub fn send_parts(&self, parts: Vec<PartUnion>, msg_id: impl Into<String>) -> Result<TurnHandle> {
        if self.inner.closed.is_cancelled() {
            return Err(ConvoyError::InvalidState(format!(
                "conversation {} is shut down",
                self.conversation_id()
            )));
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let msg_id = msg_id.into();
        tracing::debug!(conversation_id = %self.conversation_id(), %request_id, %msg_id, "message accepted");
        let task = tokio::spawn(run_turn(
            Arc::clone(&self.inner),
            self.bootstrap.clone(),
            msg_id,
            parts,
        ));
        Ok(TurnHandle { request_id, task })
    }

    /// Abort the running turn. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let active = lock(&self.inner.active);
        let Some(token) = active.as_ref() else {
            return false;
        };
        token.cancel();
        drop(active);
        self.inner.set_state(AgentState::Stopped);
        tracing::debug!(conversation_id = %self.conversation_id(), "turn stopped");
        true
    }

    /// Relay a confirmation decision to the scheduler.
    pub async fn confirm_message(&self, request: ConfirmRequest) -> Result<()> {
        self.ready().await?;
        let outcome: ConfirmationOutcome = request.confirm_key.parse()?;
        self.inner
            .scheduler()?
            .handle_confirmation(&request.call_id, outcome)
            .await
    }

    /// Run client-initiated tool calls directly, outside the model loop.
    ///
    /// Calls run one after another and stop at the first failure.
    pub async fn invoke_client_tools(
        &self,
        msg_id: &str,
        requests: Vec<ToolCallRequest>,
    ) -> Result<Vec<ToolCallResponse>> {
        self.ready().await?;
        let _turn = self.inner.turn_lock.lock().await;
        let cancel = self.inner.begin_turn();
        let executor = self.inner.core.tool_executor();
        let ctx = DispatchContext {
            executor: executor.as_ref(),
            cancel: cancel.clone(),
        };
        let requests = requests
            .into_iter()
            .map(ToolCallRequest::client_initiated)
            .collect();

        let inner = &self.inner;
        let mut items: Vec<ToolGroupItem> = Vec::new();
        let responses = dispatch_function_calls(&ctx, requests, |progress| {
            match progress {
                DispatchProgress::ToolCallRequest { call_id, name, args } => {
                    let request = ToolCallRequest::new(call_id, name, args, msg_id);
                    items.push(ToolGroupItem::from(&ToolCall::new(
                        request,
                        ToolCallStatus::Executing,
                    )));
                }
                DispatchProgress::ToolCallError { call_id, error, .. } => {
                    if let Some(item) = items.iter_mut().find(|i| i.call_id == call_id) {
                        item.status = ToolCallStatus::Error;
                        item.result_display = Some(error);
                    }
                }
                DispatchProgress::ToolCallFinish {
                    call_id: Some(call_id),
                    ..
                } => {
                    if let Some(item) = items.iter_mut().find(|i| i.call_id == call_id) {
                        item.status = ToolCallStatus::Success;
                    }
                }
                // The batch summary changes no item.
                DispatchProgress::ToolCallFinish { call_id: None, .. } => return,
            }
            inner.emit(msg_id, UiPayload::ToolGroup(items.clone()));
        })
        .await;
        inner.end_turn(&cancel);
        Ok(responses)
    }

    /// Stop everything and forget per-conversation tool state.
    pub fn shutdown(&self) {
        self.stop();
        self.inner.closed.cancel();
        self.inner.guard.clear();
        self.inner.tracked().clear();
        self.inner.set_state(AgentState::Stopped);
    }

    pub fn protected_call_ids(&self) -> Vec<String> {
        self.inner.guard.protected_call_ids()
    }

    pub fn tracked_calls(&self) -> Vec<TrackedToolCall> {
        self.inner.tracked().calls().to_vec()
    }

    pub fn key_status(&self) -> Option<KeyStatus> {
        self.inner.keys.as_ref().map(|keys| lock(keys).status())
    }
}

async fn wait_ready(bootstrap: &Bootstrap) -> Result<()> {
    bootstrap
        .clone()
        .await
        .map_err(|e| ConvoyError::InvalidState(format!("agent initialization failed: {e}")))
}

async fn run_turn(
    inner: Arc<AgentInner>,
    bootstrap: Bootstrap,
    msg_id: String,
    parts: Vec<PartUnion>,
) -> TurnOutcome {
    if let Err(err) = wait_ready(&bootstrap).await {
        let error = err.to_string();
        inner.emit(&msg_id, UiPayload::Error(error.clone()));
        inner.emit(&msg_id, UiPayload::Finish(None));
        return TurnOutcome::Failed { error };
    }
    let _turn = inner.turn_lock.lock().await;
    if inner.closed.is_cancelled() {
        inner.emit(&msg_id, UiPayload::Finish(None));
        return TurnOutcome::Cancelled;
    }
    let cancel = inner.begin_turn();
    let outcome = turn::run(&inner, &msg_id, &cancel, parts).await;
    inner.end_turn(&cancel);
    outcome
}
