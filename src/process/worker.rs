//! Worker side: host one conversation agent behind the line protocol.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};

use super::ipc::{write_line, LineReader, WorkerCommand, WorkerMessage};
use crate::agent::ConversationAgent;
use crate::core::AgentCoreFactory;
use crate::error::Result;

/// Serve commands from `reader` until `shutdown` or end of input.
///
/// The first command must be `start`; exactly one agent lives per worker.
pub async fn serve<R, W>(reader: R, mut writer: W, factory: Arc<dyn AgentCoreFactory>) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out, mut outbox) = mpsc::unbounded_channel::<WorkerMessage>();
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            write_line(&mut writer, &message).await?;
        }
        Ok::<_, crate::error::ConvoyError>(())
    });

    let mut commands = LineReader::new(reader);
    let mut agent: Option<ConversationAgent> = None;
    let mut forwarder = None;

    loop {
        let command = match commands.next::<WorkerCommand>().await {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable command");
                let _ = out.send(WorkerMessage::Failed {
                    msg_id: None,
                    error: err.to_string(),
                });
                continue;
            }
        };

        match command {
            WorkerCommand::Start { options } => {
                if agent.is_some() {
                    let _ = out.send(WorkerMessage::Failed {
                        msg_id: None,
                        error: "agent already started".into(),
                    });
                    continue;
                }
                let core = match factory.create(&options) {
                    Ok(core) => core,
                    Err(err) => {
                        let _ = out.send(WorkerMessage::Failed {
                            msg_id: None,
                            error: err.to_string(),
                        });
                        continue;
                    }
                };
                let conversation_id = options.conversation_id.clone();
                let started = ConversationAgent::new(*options, core);
                forwarder = Some(tokio::spawn(forward_events(started.subscribe(), out.clone())));
                let reply = match started.ready().await {
                    Ok(()) => WorkerMessage::Ready { conversation_id },
                    Err(err) => WorkerMessage::Failed {
                        msg_id: None,
                        error: err.to_string(),
                    },
                };
                let _ = out.send(reply);
                agent = Some(started);
            }
            WorkerCommand::Send { msg_id, message } => {
                let reply = match agent.as_ref().map(|a| a.send(message, msg_id.clone())) {
                    Some(Ok(handle)) => WorkerMessage::Accepted {
                        msg_id,
                        request_id: handle.request_id,
                    },
                    Some(Err(err)) => WorkerMessage::Failed {
                        msg_id: Some(msg_id),
                        error: err.to_string(),
                    },
                    None => not_started(Some(msg_id)),
                };
                let _ = out.send(reply);
            }
            WorkerCommand::Stop => {
                if let Some(agent) = &agent {
                    agent.stop();
                }
            }
            WorkerCommand::Confirm { request } => {
                let Some(agent) = &agent else {
                    let _ = out.send(not_started(Some(request.msg_id)));
                    continue;
                };
                let msg_id = request.msg_id.clone();
                if let Err(err) = agent.confirm_message(request).await {
                    let _ = out.send(WorkerMessage::Failed {
                        msg_id: Some(msg_id),
                        error: err.to_string(),
                    });
                }
            }
            WorkerCommand::Shutdown => break,
        }
    }

    if let Some(agent) = agent {
        agent.shutdown();
    }
    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    drop(out);
    match writer_task.await {
        Ok(result) => result,
        Err(err) => Err(crate::error::ConvoyError::Ipc(format!("writer task failed: {err}"))),
    }
}

fn not_started(msg_id: Option<String>) -> WorkerMessage {
    WorkerMessage::Failed {
        msg_id,
        error: "agent not started".into(),
    }
}

async fn forward_events(
    mut events: broadcast::Receiver<crate::agent::UiEvent>,
    out: mpsc::UnboundedSender<WorkerMessage>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if out.send(WorkerMessage::Event { event }).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "worker fell behind on ui events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
