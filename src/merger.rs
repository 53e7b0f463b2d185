//! Merge a completed tool batch into the next model turn.

use crate::core::ConversationHistory;
use crate::error::Result;
use crate::types::{CompletedToolCall, Content, PartUnion, ToolCallStatus};

/// Name of the tool whose success invalidates loaded memory.
pub const SAVE_MEMORY_TOOL: &str = "save_memory";

/// Collect the parts to resubmit for a completed batch.
///
/// Returns `None` when nothing goes back to the model. When every model-facing
/// call was cancelled the parts are appended to `history` as user turns instead
/// of being returned: the model learns the tools were cancelled without being
/// asked for another response. This is the only path that writes history
/// directly; the asymmetry with normal resubmission is intentional.
pub async fn merge_completed<H, F>(
    calls: &[CompletedToolCall],
    history: &H,
    mut on_memory_refresh: F,
) -> Result<Option<Vec<PartUnion>>>
where
    H: ConversationHistory + ?Sized,
    F: FnMut(),
{
    let terminal: Vec<&CompletedToolCall> = calls
        .iter()
        .filter(|call| call.status.is_terminal() && call.response.response_parts.is_some())
        .collect();

    // Client-initiated calls were already surfaced by whoever dispatched them.
    let model_calls: Vec<&CompletedToolCall> = terminal
        .iter()
        .copied()
        .filter(|call| !call.request.is_client_initiated)
        .collect();

    let memory_saved = terminal
        .iter()
        .any(|call| call.status == ToolCallStatus::Success && call.request.name == SAVE_MEMORY_TOOL);
    if memory_saved {
        on_memory_refresh();
    }

    if model_calls.is_empty() {
        return Ok(None);
    }

    if model_calls
        .iter()
        .all(|call| call.status == ToolCallStatus::Cancelled)
    {
        for call in &model_calls {
            let parts = call
                .response
                .response_parts
                .clone()
                .map(|list| list.into_vec().into_iter().map(PartUnion::into_part).collect())
                .unwrap_or_default();
            history.add_history(Content::user(parts)).await?;
        }
        tracing::debug!(count = model_calls.len(), "all tool calls cancelled; recorded in history");
        return Ok(None);
    }

    let parts = model_calls
        .iter()
        .filter_map(|call| call.response.response_parts.clone())
        .flat_map(|list| list.into_vec())
        .collect();
    Ok(Some(parts))
}
