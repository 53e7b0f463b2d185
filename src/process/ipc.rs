//! Supervisor/worker wire protocol: one JSON object per line.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use crate::agent::{AgentOptions, ConfirmRequest, UiEvent};
use crate::error::{ConvoyError, Result};

/// Supervisor → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    Start { options: Box<AgentOptions> },
    Send { msg_id: String, message: String },
    Stop,
    Confirm { request: ConfirmRequest },
    Shutdown,
}

/// Worker → supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Ready {
        conversation_id: String,
    },
    Accepted {
        msg_id: String,
        request_id: String,
    },
    Event {
        event: UiEvent,
    },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<String>,
        error: String,
    },
}

/// Write `message` as one line and flush.
pub async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads newline-delimited JSON values.
pub struct LineReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// Next decoded value; `None` at end of input. Blank lines are skipped.
    pub async fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str(line)
                .map(Some)
                .map_err(|e| ConvoyError::Ipc(format!("malformed message: {e}")));
        }
        Ok(None)
    }
}
