//! Configuration system (layered: code > env > TOML file).

pub mod mcp;

pub use mcp::{
    import_servers, to_core_map, McpServer, McpServerEntry, McpServerStatus, McpServerStore,
    McpToolInfo, McpTransport,
};

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::AgentOptions;
use crate::error::{ConvoyError, Result};
use crate::models::ModelSelection;
use crate::util::retry::StreamRetryPolicy;

pub const DEFAULT_MODEL: &str = "gemini:gemini-2.5-pro";
const CONFIG_FILE: &str = "convoy.toml";
const MCP_STORE_FILE: &str = "mcp_servers.json";

/// How the supervisor spawns a worker process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Runtime configuration for conversations and workers.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConvoyConfig {
    /// `provider:model`.
    pub model: Option<String>,
    /// One or more keys separated by commas or newlines.
    pub api_keys: Option<String>,
    pub base_url: Option<String>,
    /// Auto-approve every tool confirmation.
    pub yolo: bool,
    pub retry: StreamRetryPolicy,
    pub workspace: Option<PathBuf>,
    pub mcp_store: Option<PathBuf>,
    pub worker: Option<WorkerConfig>,
}

impl fmt::Debug for ConvoyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvoyConfig")
            .field("model", &self.model)
            .field("api_keys", &self.api_keys.as_ref().map(|_| ".."))
            .field("base_url", &self.base_url)
            .field("yolo", &self.yolo)
            .field("retry", &self.retry)
            .field("workspace", &self.workspace)
            .field("mcp_store", &self.mcp_store)
            .field("worker", &self.worker)
            .finish()
    }
}

/// `~/.convoy`, or `.convoy` when no home directory is known.
pub fn default_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".convoy"))
        .unwrap_or_else(|| PathBuf::from(".convoy"))
}

fn parse_bool(var: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConvoyError::Configuration(format!(
            "{var}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ConvoyError::Configuration(format!("{var}: expected a number, got '{raw}'")))
}

impl ConvoyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read a TOML file; a missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// File (explicit path or `~/.convoy/convoy.toml`) overlaid with the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_dir().join(CONFIG_FILE));
        let mut config = Self::from_file(&path)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Overlay `CONVOY_*` variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("CONVOY_MODEL") {
            self.model = Some(model);
        }
        if let Some(keys) = lookup("CONVOY_API_KEYS") {
            self.api_keys = Some(keys);
        }
        if let Some(url) = lookup("CONVOY_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Some(raw) = lookup("CONVOY_YOLO") {
            self.yolo = parse_bool("CONVOY_YOLO", &raw)?;
        }
        if let Some(raw) = lookup("CONVOY_STREAM_RETRIES") {
            self.retry.max_retries = parse_number("CONVOY_STREAM_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("CONVOY_STREAM_RETRY_DELAY_MS") {
            self.retry.delay_ms = parse_number("CONVOY_STREAM_RETRY_DELAY_MS", &raw)?;
        }
        if let Some(dir) = lookup("CONVOY_WORKSPACE") {
            self.workspace = Some(PathBuf::from(dir));
        }
        if let Some(program) = lookup("CONVOY_WORKER") {
            let mut parts = program.split_whitespace().map(str::to_string);
            if let Some(first) = parts.next() {
                self.worker = Some(WorkerConfig {
                    program: PathBuf::from(first),
                    args: parts.collect(),
                });
            }
        }
        Ok(())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_keys(mut self, keys: impl Into<String>) -> Self {
        self.api_keys = Some(keys.into());
        self
    }

    pub fn with_yolo(mut self, yolo: bool) -> Self {
        self.yolo = yolo;
        self
    }

    pub fn model_selection(&self) -> Result<ModelSelection> {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL).parse()
    }

    pub fn mcp_store(&self) -> McpServerStore {
        McpServerStore::new(
            self.mcp_store
                .clone()
                .unwrap_or_else(|| default_dir().join(MCP_STORE_FILE)),
        )
    }

    /// Options for a new conversation, with enabled MCP servers from the store.
    pub fn agent_options(&self, conversation_id: impl Into<String>) -> Result<AgentOptions> {
        let servers = self.mcp_store().load()?;
        Ok(AgentOptions::builder()
            .conversation_id(conversation_id)
            .model(self.model_selection()?)
            .maybe_api_key(self.api_keys.clone())
            .maybe_base_url(self.base_url.clone())
            .maybe_workspace(self.workspace.clone())
            .yolo_mode(self.yolo)
            .retry(self.retry)
            .mcp_servers(to_core_map(&servers, None))
            .build())
    }
}
