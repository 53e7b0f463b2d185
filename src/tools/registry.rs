//! Tool registry and direct (non-interactive) tool invocation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::validation::validate_arguments;
use crate::core::ToolExecutor;
use crate::error::{ConvoyError, Result};
use crate::types::{Part, PartListUnion, ToolCallRequest, ToolCallResponse};

/// Registered tools keyed by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve and validate a request against its tool's schema.
    pub fn prepare(&self, request: &ToolCallRequest) -> Result<Arc<dyn Tool>> {
        let tool = self
            .get(&request.name)
            .ok_or_else(|| ConvoyError::ToolNotFound(request.name.clone()))?;
        validate_arguments(&request.name, &request.args, &tool.parameters().schema)?;
        Ok(tool)
    }

    /// Run an already prepared tool, mapping the outcome onto a response.
    ///
    /// Returns `Err(Canceled)` only when `cancel` fires; tool failures come
    /// back as a response carrying `error`.
    pub async fn run(
        &self,
        tool: &dyn Tool,
        request: &ToolCallRequest,
        cancel: CancellationToken,
    ) -> Result<ToolCallResponse> {
        let ctx = ToolExecutionContext {
            call_id: request.call_id.clone(),
            prompt_id: request.prompt_id.clone(),
            cancel: cancel.clone(),
        };
        let args = ToolArguments::new(request.args.clone());
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ConvoyError::Canceled),
            outcome = tool.execute(&args, &ctx) => outcome,
        };
        match outcome {
            Ok(value) => Ok(success_response(request, value)),
            Err(ConvoyError::Canceled) => Err(ConvoyError::Canceled),
            Err(err) => {
                tracing::debug!(call_id = %request.call_id, tool = %request.name, error = %err, "tool failed");
                Ok(error_response(request, &err.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(
        &self,
        request: &ToolCallRequest,
        cancel: CancellationToken,
    ) -> Result<ToolCallResponse> {
        let tool = match self.prepare(request) {
            Ok(tool) => tool,
            Err(err) => return Ok(error_response(request, &err.to_string())),
        };
        self.run(tool.as_ref(), request, cancel).await
    }
}

/// Response for a tool that produced `value`.
pub fn success_response(request: &ToolCallRequest, value: serde_json::Value) -> ToolCallResponse {
    let display = match &value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    ToolCallResponse {
        call_id: request.call_id.clone(),
        response_parts: Some(PartListUnion::from(vec![Part::function_response(
            &request.call_id,
            &request.name,
            serde_json::json!({ "output": value }),
        )])),
        result_display: Some(display),
        error: None,
    }
}

/// Response for a call that failed before or during execution.
pub fn error_response(request: &ToolCallRequest, message: &str) -> ToolCallResponse {
    ToolCallResponse {
        call_id: request.call_id.clone(),
        response_parts: Some(PartListUnion::from(vec![Part::function_response(
            &request.call_id,
            &request.name,
            serde_json::json!({ "error": message }),
        )])),
        result_display: Some(message.to_string()),
        error: Some(message.to_string()),
    }
}

/// Response for a call the user rejected or the turn aborted.
pub fn cancelled_response(request: &ToolCallRequest, reason: &str) -> ToolCallResponse {
    let message = format!("[Operation Cancelled] Reason: {reason}");
    ToolCallResponse {
        call_id: request.call_id.clone(),
        response_parts: Some(PartListUnion::from(vec![Part::function_response(
            &request.call_id,
            &request.name,
            serde_json::json!({ "error": message }),
        )])),
        result_display: Some(message),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AgentTool, ToolParameters};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with_tool(AgentTool::new(
                "read_file",
                "Read a file",
                ToolParameters::object().string("file_path", "Path", true).build(),
                |args, _| async move { Ok::<_, ConvoyError>(json!(format!("contents of {}", args.get_str("file_path")?))) },
            ))
            .with_tool(AgentTool::new(
                "explode",
                "Always fails",
                ToolParameters::empty(),
                |_, _| async { Err::<serde_json::Value, _>(ConvoyError::tool("explode", "boom")) },
            ))
    }

    fn request(name: &str, args: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest::new("c1", name, args.as_object().cloned().unwrap_or_default(), "p1")
    }

    #[tokio::test]
    async fn success_wraps_output_in_function_response() {
        let response = registry()
            .execute(&request("read_file", json!({"file_path": "a.txt"})), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.error, None);
        assert_eq!(response.result_display.as_deref(), Some("contents of a.txt"));
        let parts = response.response_parts.unwrap().into_vec();
        let part = parts[0].clone().into_part();
        let fr = part.function_response.unwrap();
        assert_eq!(fr.id.as_deref(), Some("c1"));
        assert_eq!(fr.response, json!({"output": "contents of a.txt"}));
    }

    #[tokio::test]
    async fn unknown_tools_and_bad_arguments_become_error_responses() {
        let reg = registry();
        let missing = reg
            .execute(&request("nope", json!({})), CancellationToken::new())
            .await
            .unwrap();
        assert!(missing.error.unwrap().contains("Tool not found: nope"));

        let invalid = reg
            .execute(&request("read_file", json!({})), CancellationToken::new())
            .await
            .unwrap();
        assert!(invalid.error.unwrap().contains("file_path"));

        let failed = reg
            .execute(&request("explode", json!({})), CancellationToken::new())
            .await
            .unwrap();
        assert!(failed.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_execution() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = registry()
            .execute(&request("read_file", json!({"file_path": "a"})), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvoyError::Canceled));
    }
}
