//! Per-conversation agent options.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::auth::AuthType;
use crate::config::McpServerEntry;
use crate::models::ModelSelection;
use crate::util::retry::StreamRetryPolicy;

/// Everything a conversation agent needs at construction.
///
/// Serializable so a supervisor can hand it to a worker process.
#[derive(Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct AgentOptions {
    #[builder(into)]
    pub conversation_id: String,
    pub model: ModelSelection,
    /// Raw key string; several keys separated by commas or newlines enable rotation.
    #[builder(into)]
    #[serde(default)]
    pub api_key: Option<String>,
    #[builder(into)]
    #[serde(default)]
    pub base_url: Option<String>,
    #[builder(into)]
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    /// Auto-approve tool confirmations.
    #[builder(default)]
    #[serde(default)]
    pub yolo_mode: bool,
    /// Context injected before the first message, e.g. after a restart.
    #[builder(into)]
    #[serde(default)]
    pub history_prefix: Option<String>,
    #[builder(default)]
    #[serde(default)]
    pub retry: StreamRetryPolicy,
    #[builder(default)]
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerEntry>,
}

impl AgentOptions {
    pub fn auth_type(&self) -> AuthType {
        self.model.auth_type()
    }
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("conversation_id", &self.conversation_id)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("base_url", &self.base_url)
            .field("workspace", &self.workspace)
            .field("yolo_mode", &self.yolo_mode)
            .field("retry", &self.retry)
            .field("mcp_servers", &self.mcp_servers.keys().collect::<Vec<_>>())
            .finish()
    }
}
