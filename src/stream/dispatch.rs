//! Sequential execution of client-initiated tool calls.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::params::normalize_tool_params;
use crate::core::ToolExecutor;
use crate::types::{PartUnion, ToolArgs, ToolCallRequest, ToolCallResponse};

/// Progress reported while dispatching a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchProgress {
    ToolCallRequest {
        call_id: String,
        name: String,
        args: ToolArgs,
    },
    ToolCallError {
        call_id: String,
        name: String,
        error: String,
    },
    /// Emitted after each successful call with that call's parts, then once
    /// more without a `call_id` carrying the parts of the whole batch.
    ToolCallFinish {
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        response_parts: Vec<PartUnion>,
    },
}

pub struct DispatchContext<'a> {
    pub executor: &'a dyn ToolExecutor,
    pub cancel: CancellationToken,
}

/// Execute `calls` one after another.
///
/// Fail-fast: the first call that errors is reported as `ToolCallError` and
/// the remaining calls are never executed. Callers rely on this so the model
/// never sees results that depend on a failed predecessor.
///
/// Returns the responses of every call that was executed.
pub async fn dispatch_function_calls<F>(
    ctx: &DispatchContext<'_>,
    calls: Vec<ToolCallRequest>,
    mut on_progress: F,
) -> Vec<ToolCallResponse>
where
    F: FnMut(DispatchProgress),
{
    let mut responses = Vec::with_capacity(calls.len());
    let mut parts = Vec::new();

    for mut request in calls {
        request.args = normalize_tool_params(&request.name, std::mem::take(&mut request.args));
        on_progress(DispatchProgress::ToolCallRequest {
            call_id: request.call_id.clone(),
            name: request.name.clone(),
            args: request.args.clone(),
        });

        let mut call_parts = Vec::new();
        let failure = match ctx.executor.execute(&request, ctx.cancel.clone()).await {
            Ok(response) => {
                let error = response.error.clone();
                if let Some(list) = response.response_parts.clone() {
                    call_parts = list.into_vec();
                }
                responses.push(response);
                error
            }
            Err(err) => Some(err.to_string()),
        };

        if let Some(error) = failure {
            tracing::debug!(call_id = %request.call_id, tool = %request.name, %error, "dispatch stopped");
            on_progress(DispatchProgress::ToolCallError {
                call_id: request.call_id,
                name: request.name,
                error,
            });
            return responses;
        }

        parts.extend(call_parts.iter().cloned());
        on_progress(DispatchProgress::ToolCallFinish {
            call_id: Some(request.call_id),
            response_parts: call_parts,
        });
    }

    on_progress(DispatchProgress::ToolCallFinish {
        call_id: None,
        response_parts: parts,
    });
    responses
}
