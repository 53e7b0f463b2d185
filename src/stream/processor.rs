//! Consume one model event stream and forward what the UI cares about.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthType;
use crate::core::ErrorFormatter;
use crate::error::ConvoyError;
use crate::types::{
    FinishedInfo, ModelEventStream, StreamEvent, ThoughtSummary, ToolCallRequest, UsageMetadata,
};

/// Events forwarded to the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedEvent {
    Thought(ThoughtSummary),
    Content(String),
    ToolCallRequest(ToolCallRequest),
    /// Already passed through the provider formatter.
    Error(String),
    Finished(FinishedInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Completed,
    UserCancelled,
    Error,
}

/// Outcome of one stream-consumption pass.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProcessingResult {
    pub status: StreamStatus,
    pub usage_metadata: Option<UsageMetadata>,
    /// Set when the transport reported a malformed response. Not forwarded to
    /// the sink; the caller decides whether to re-request.
    pub invalid_stream: Option<String>,
    /// Raw text of a terminal transport failure, already forwarded formatted.
    pub error: Option<String>,
}

impl StreamProcessingResult {
    fn new() -> Self {
        Self {
            status: StreamStatus::Completed,
            usage_metadata: None,
            invalid_stream: None,
            error: None,
        }
    }

    pub fn is_invalid_stream(&self) -> bool {
        self.invalid_stream.is_some()
    }
}

/// What the processor needs from its caller.
pub struct StreamContext<'a> {
    pub auth_type: AuthType,
    pub formatter: &'a dyn ErrorFormatter,
    pub cancel: &'a CancellationToken,
}

/// Drain `stream`, forwarding thought/content/tool-call/error/finished events to `sink`.
///
/// `error` events are reported but do not end iteration. Bookkeeping kinds
/// (compression, confirmations, loop detection, ...) are swallowed and unknown
/// kinds are dropped with a warning. A transport `Err` ends the pass.
pub async fn process_stream<F>(
    mut stream: ModelEventStream,
    ctx: &StreamContext<'_>,
    mut sink: F,
) -> StreamProcessingResult
where
    F: FnMut(NormalizedEvent),
{
    let mut result = StreamProcessingResult::new();

    loop {
        let item = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                result.status = StreamStatus::UserCancelled;
                break;
            }
            item = stream.next() => item,
        };
        let Some(item) = item else { break };

        let event = match item {
            Ok(event) => event,
            Err(ConvoyError::InvalidStream(message)) => {
                tracing::debug!(%message, "invalid stream");
                result.status = StreamStatus::Error;
                result.invalid_stream = Some(message);
                break;
            }
            Err(ConvoyError::Canceled) => {
                result.status = StreamStatus::UserCancelled;
                break;
            }
            Err(err) => {
                sink(NormalizedEvent::Error(
                    ctx.formatter.format_error(&err, ctx.auth_type),
                ));
                result.status = StreamStatus::Error;
                result.error = Some(err.to_string());
                break;
            }
        };

        match event {
            StreamEvent::Thought(thought) => sink(NormalizedEvent::Thought(thought)),
            StreamEvent::Content(text) => sink(NormalizedEvent::Content(text)),
            StreamEvent::ToolCallRequest(request) => sink(NormalizedEvent::ToolCallRequest(request)),
            StreamEvent::Error(error) => {
                sink(NormalizedEvent::Error(ctx.formatter.format(&error, ctx.auth_type)))
            }
            StreamEvent::Finished(info) => {
                if let Some(usage) = &info.usage_metadata {
                    result.usage_metadata = Some(usage.clone());
                }
                sink(NormalizedEvent::Finished(info));
            }
            StreamEvent::UserCancelled => result.status = StreamStatus::UserCancelled,
            StreamEvent::ChatCompressed(_)
            | StreamEvent::ToolCallConfirmation(_)
            | StreamEvent::ToolCallResponse(_)
            | StreamEvent::MaxSessionTurns
            | StreamEvent::LoopDetected => {
                tracing::trace!(kind = event.kind(), "stream event not surfaced");
            }
            StreamEvent::Unknown => tracing::warn!("dropping unknown stream event"),
        }
    }

    result
}
