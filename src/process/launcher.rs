//! How worker processes are brought up.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::worker::serve;
use crate::config::WorkerConfig;
use crate::core::AgentCoreFactory;
use crate::error::{ConvoyError, Result};

/// Environment variable carrying the conversation id into a worker process.
pub const CONVERSATION_ENV: &str = "CONVOY_CONVERSATION_ID";

/// Default in-memory pipe size for in-process workers.
const PIPE_CAPACITY: usize = 64 * 1024;

/// A running worker.
#[derive(Debug)]
pub enum WorkerProcess {
    Child(Child),
    Task(JoinHandle<Result<()>>),
}

impl WorkerProcess {
    /// Wait up to `grace` for a clean exit, then kill.
    pub async fn terminate(self, grace: Duration) -> Result<()> {
        match self {
            Self::Child(mut child) => {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(status) => {
                        tracing::debug!(status = ?status?, "worker exited");
                    }
                    Err(_) => {
                        tracing::warn!(pid = ?child.id(), "worker did not exit; killing");
                        child.kill().await?;
                    }
                }
                Ok(())
            }
            Self::Task(mut task) => {
                match tokio::time::timeout(grace, &mut task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(err)) if err.is_cancelled() => Ok(()),
                    Ok(Err(err)) => Err(ConvoyError::Ipc(format!("worker task failed: {err}"))),
                    Err(_) => {
                        task.abort();
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Pipes to a freshly launched worker.
pub struct WorkerConnection {
    pub commands: Box<dyn AsyncWrite + Send + Unpin>,
    pub messages: Box<dyn AsyncRead + Send + Unpin>,
    pub process: WorkerProcess,
}

impl std::fmt::Debug for WorkerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConnection")
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, conversation_id: &str) -> Result<WorkerConnection>;
}

/// One OS process per conversation, speaking the protocol over stdio.
#[derive(Debug, Clone)]
pub struct ChildProcessLauncher {
    config: WorkerConfig,
}

impl ChildProcessLauncher {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WorkerLauncher for ChildProcessLauncher {
    async fn launch(&self, conversation_id: &str) -> Result<WorkerConnection> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .env(CONVERSATION_ENV, conversation_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConvoyError::Ipc(format!(
                    "failed to spawn worker {}: {e}",
                    self.config.program.display()
                ))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConvoyError::Ipc("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConvoyError::Ipc("worker stdout unavailable".into()))?;
        tracing::debug!(%conversation_id, pid = ?child.id(), "worker spawned");
        Ok(WorkerConnection {
            commands: Box::new(stdin),
            messages: Box::new(stdout),
            process: WorkerProcess::Child(child),
        })
    }
}

/// Runs the worker loop as a task over in-memory pipes.
///
/// Same protocol as [`ChildProcessLauncher`] without process isolation, so
/// multi-key rotation through the environment is shared between conversations.
#[derive(Clone)]
pub struct InProcessLauncher {
    factory: Arc<dyn AgentCoreFactory>,
}

impl InProcessLauncher {
    pub fn new(factory: Arc<dyn AgentCoreFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, conversation_id: &str) -> Result<WorkerConnection> {
        let (commands, worker_commands) = tokio::io::duplex(PIPE_CAPACITY);
        let (worker_messages, messages) = tokio::io::duplex(PIPE_CAPACITY);
        let task = tokio::spawn(serve(
            worker_commands,
            worker_messages,
            Arc::clone(&self.factory),
        ));
        tracing::debug!(%conversation_id, "in-process worker started");
        Ok(WorkerConnection {
            commands: Box::new(commands),
            messages: Box::new(messages),
            process: WorkerProcess::Task(task),
        })
    }
}
