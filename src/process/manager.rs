//! Supervisor: one worker per conversation, events fanned out to subscribers.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::ipc::{write_line, LineReader, WorkerCommand, WorkerMessage};
use super::launcher::{WorkerLauncher, WorkerProcess};
use super::persist::{MessageStore, StoredMessage};
use crate::agent::{AgentOptions, ConfirmRequest, UiEvent, UiPayload};
use crate::error::{ConvoyError, Result};
use crate::util::lock;

const EVENT_CAPACITY: usize = 4096;
const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A UI event tagged with its conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationEvent {
    pub conversation_id: String,
    pub event: UiEvent,
}

#[derive(Default)]
struct Pending {
    ready: Option<oneshot::Sender<Result<()>>>,
    accepts: HashMap<String, oneshot::Sender<Result<String>>>,
    /// Accepted messages that have not reported `finish` yet.
    unfinished: BTreeSet<String>,
}

struct WorkerHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    pending: Arc<Mutex<Pending>>,
    process: WorkerProcess,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WorkerHandle {
    async fn terminate(self, grace: Duration) -> Result<()> {
        let Self {
            commands,
            process,
            mut reader,
            writer,
            ..
        } = self;
        let _ = commands.send(WorkerCommand::Shutdown);
        drop(commands);
        let _ = tokio::time::timeout(grace, writer).await;
        let result = process.terminate(grace).await;
        if tokio::time::timeout(grace, &mut reader).await.is_err() {
            reader.abort();
        }
        result
    }
}

#[derive(Clone)]
struct Relay {
    conversation_id: String,
    pending: Arc<Mutex<Pending>>,
    events: broadcast::Sender<ConversationEvent>,
    store: Arc<dyn MessageStore>,
}

impl Relay {
    async fn publish(&self, event: UiEvent) {
        if let Some(row) = StoredMessage::from_event(&self.conversation_id, &event) {
            if let Err(err) = self.store.record(row).await {
                tracing::warn!(conversation_id = %self.conversation_id, error = %err, "failed to persist message");
            }
        }
        let _ = self.events.send(ConversationEvent {
            conversation_id: self.conversation_id.clone(),
            event,
        });
    }

    async fn handle(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::Ready { .. } => {
                if let Some(ready) = lock(&self.pending).ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            WorkerMessage::Accepted { msg_id, request_id } => {
                let reply = {
                    let mut pending = lock(&self.pending);
                    pending.unfinished.insert(msg_id.clone());
                    pending.accepts.remove(&msg_id)
                };
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(request_id));
                }
            }
            WorkerMessage::Failed { msg_id, error } => {
                let waiter = {
                    let mut pending = lock(&self.pending);
                    match &msg_id {
                        Some(id) => pending.accepts.remove(id).map(Waiter::Accept),
                        None => pending.ready.take().map(Waiter::Ready),
                    }
                };
                match waiter {
                    Some(Waiter::Accept(reply)) => {
                        let _ = reply.send(Err(ConvoyError::InvalidState(error)));
                    }
                    Some(Waiter::Ready(ready)) => {
                        let _ = ready.send(Err(ConvoyError::InvalidState(error)));
                    }
                    None => {
                        tracing::warn!(conversation_id = %self.conversation_id, %error, "worker reported a failure");
                        if let Some(msg_id) = msg_id {
                            self.publish(UiEvent::new(msg_id, UiPayload::Error(error))).await;
                        }
                    }
                }
            }
            WorkerMessage::Event { event } => {
                if event.is_finish() {
                    lock(&self.pending).unfinished.remove(&event.msg_id);
                }
                self.publish(event).await;
            }
        }
    }

    /// Fail everything still waiting and release a UI stuck in a turn.
    async fn worker_exited(&self) {
        let (ready, accepts, unfinished) = {
            let mut pending = lock(&self.pending);
            (
                pending.ready.take(),
                std::mem::take(&mut pending.accepts),
                std::mem::take(&mut pending.unfinished),
            )
        };
        if let Some(ready) = ready {
            let _ = ready.send(Err(ConvoyError::Ipc("worker exited before ready".into())));
        }
        for (_, reply) in accepts {
            let _ = reply.send(Err(ConvoyError::Ipc("worker exited".into())));
        }
        for msg_id in unfinished {
            tracing::error!(conversation_id = %self.conversation_id, %msg_id, "worker exited mid-turn");
            self.publish(UiEvent::new(
                msg_id.clone(),
                UiPayload::Error("Agent worker exited unexpectedly".into()),
            ))
            .await;
            self.publish(UiEvent::new(msg_id, UiPayload::Finish(None))).await;
        }
    }
}

enum Waiter {
    Accept(oneshot::Sender<Result<String>>),
    Ready(oneshot::Sender<Result<()>>),
}

async fn read_messages(messages: Box<dyn AsyncRead + Send + Unpin>, relay: Relay) {
    let mut reader = LineReader::new(messages);
    loop {
        match reader.next::<WorkerMessage>().await {
            Ok(Some(message)) => relay.handle(message).await,
            Ok(None) => break,
            Err(ConvoyError::Ipc(err)) => {
                tracing::warn!(conversation_id = %relay.conversation_id, %err, "skipping worker output");
            }
            Err(err) => {
                tracing::warn!(conversation_id = %relay.conversation_id, error = %err, "worker pipe failed");
                break;
            }
        }
    }
    relay.worker_exited().await;
}

async fn write_commands(
    mut commands: Box<dyn AsyncWrite + Send + Unpin>,
    mut outbox: mpsc::UnboundedReceiver<WorkerCommand>,
    conversation_id: String,
) {
    while let Some(command) = outbox.recv().await {
        if let Err(err) = write_line(&mut commands, &command).await {
            tracing::warn!(%conversation_id, error = %err, "failed to write worker command");
            break;
        }
    }
    let _ = commands.shutdown().await;
}

/// Owns the worker for every active conversation.
///
/// A crash or hang in one worker cannot block another conversation.
pub struct AgentProcessManager {
    launcher: Arc<dyn WorkerLauncher>,
    store: Arc<dyn MessageStore>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    events: broadcast::Sender<ConversationEvent>,
    start_timeout: Duration,
    reply_timeout: Duration,
}

impl AgentProcessManager {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, store: Arc<dyn MessageStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            launcher,
            store,
            workers: Mutex::new(HashMap::new()),
            events,
            start_timeout: DEFAULT_START_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, start: Duration, reply: Duration) -> Self {
        self.start_timeout = start;
        self.reply_timeout = reply;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.workers).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_running(&self, conversation_id: &str) -> bool {
        lock(&self.workers).contains_key(conversation_id)
    }

    /// Launch a worker for `options.conversation_id` and wait until its agent is ready.
    ///
    /// Starting a conversation that is already running is a no-op.
    pub async fn start(&self, options: AgentOptions) -> Result<()> {
        let conversation_id = options.conversation_id.clone();
        if self.is_running(&conversation_id) {
            return Ok(());
        }

        let connection = self.launcher.launch(&conversation_id).await?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let pending = Arc::new(Mutex::new(Pending {
            ready: Some(ready_tx),
            ..Pending::default()
        }));
        let relay = Relay {
            conversation_id: conversation_id.clone(),
            pending: Arc::clone(&pending),
            events: self.events.clone(),
            store: Arc::clone(&self.store),
        };
        let (commands, outbox) = mpsc::unbounded_channel();
        let handle = WorkerHandle {
            reader: tokio::spawn(read_messages(connection.messages, relay)),
            writer: tokio::spawn(write_commands(
                connection.commands,
                outbox,
                conversation_id.clone(),
            )),
            commands,
            pending,
            process: connection.process,
        };

        let _ = handle.commands.send(WorkerCommand::Start {
            options: Box::new(options),
        });
        let ready = match tokio::time::timeout(self.start_timeout, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConvoyError::Ipc("worker exited before ready".into())),
            Err(_) => Err(ConvoyError::Ipc(format!(
                "worker for {conversation_id} did not become ready"
            ))),
        };
        if let Err(err) = ready {
            tracing::error!(%conversation_id, error = %err, "worker failed to start");
            if let Err(cleanup) = handle.terminate(SHUTDOWN_GRACE).await {
                tracing::warn!(%conversation_id, error = %cleanup, "worker cleanup failed");
            }
            return Err(err);
        }

        tracing::info!(%conversation_id, "conversation started");
        lock(&self.workers).insert(conversation_id, handle);
        Ok(())
    }

    fn channel(
        &self,
        conversation_id: &str,
    ) -> Result<(mpsc::UnboundedSender<WorkerCommand>, Arc<Mutex<Pending>>)> {
        lock(&self.workers)
            .get(conversation_id)
            .map(|handle| (handle.commands.clone(), Arc::clone(&handle.pending)))
            .ok_or_else(|| ConvoyError::WorkerNotFound(conversation_id.to_string()))
    }

    fn command(&self, conversation_id: &str, command: WorkerCommand) -> Result<()> {
        let (commands, _) = self.channel(conversation_id)?;
        commands
            .send(command)
            .map_err(|_| ConvoyError::Ipc(format!("worker for {conversation_id} is gone")))
    }

    /// Submit a user message; returns the worker's request id.
    pub async fn send(
        &self,
        conversation_id: &str,
        msg_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<String> {
        let (msg_id, message) = (msg_id.into(), message.into());
        let (commands, pending) = self.channel(conversation_id)?;
        self.store
            .record(StoredMessage::user(conversation_id, &msg_id, message.clone()))
            .await?;

        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&pending).accepts.insert(msg_id.clone(), reply_tx);
        commands
            .send(WorkerCommand::Send {
                msg_id: msg_id.clone(),
                message,
            })
            .map_err(|_| ConvoyError::Ipc(format!("worker for {conversation_id} is gone")))?;

        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConvoyError::Ipc("worker exited before accepting".into())),
            Err(_) => {
                lock(&pending).accepts.remove(&msg_id);
                Err(ConvoyError::Ipc(format!("worker did not accept {msg_id}")))
            }
        }
    }

    pub fn stop(&self, conversation_id: &str) -> Result<()> {
        self.command(conversation_id, WorkerCommand::Stop)
    }

    pub fn confirm(&self, conversation_id: &str, request: ConfirmRequest) -> Result<()> {
        self.command(conversation_id, WorkerCommand::Confirm { request })
    }

    /// Shut the worker down, killing it if it does not exit in time.
    pub async fn kill(&self, conversation_id: &str) -> Result<()> {
        let handle = lock(&self.workers)
            .remove(conversation_id)
            .ok_or_else(|| ConvoyError::WorkerNotFound(conversation_id.to_string()))?;
        tracing::info!(%conversation_id, "stopping conversation worker");
        handle.terminate(SHUTDOWN_GRACE).await
    }

    /// Kill every worker.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, WorkerHandle)> = lock(&self.workers).drain().collect();
        for (conversation_id, handle) in handles {
            if let Err(err) = handle.terminate(SHUTDOWN_GRACE).await {
                tracing::warn!(%conversation_id, error = %err, "worker shutdown failed");
            }
        }
    }

    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        self.store.messages(conversation_id).await
    }
}
