//! MCP server configuration: persisted shape, import, and the agent-core map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvoyError, Result};

/// Placeholder in header values replaced by a credential at dispatch time.
pub const TOKEN_PLACEHOLDER: &str = "<token>";

/// How the agent-core reaches an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    StreamableHttp {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum McpServerStatus {
    Connected,
    Disconnected,
    Error,
    Testing,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A user-editable MCP server entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub status: McpServerStatus,
    pub transport: McpTransport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<McpToolInfo>>,
    /// The JSON this entry was imported from, kept for round-trip editing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_json: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// An entry in the map handed to the agent-core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum McpServerEntry {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    Remote {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(rename = "httpUrl", default, skip_serializing_if = "Option::is_none")]
        http_url: Option<String>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

/// The `{"mcpServers": {...}}` document users paste in.
#[derive(Debug, Deserialize)]
struct ImportDocument {
    #[serde(rename = "mcpServers")]
    mcp_servers: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportEntry {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    url: Option<String>,
    http_url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    description: Option<String>,
    #[serde(default)]
    disabled: bool,
}

/// Parse servers from a `{"mcpServers": {...}}` JSON document.
///
/// `command` selects stdio, `httpUrl` streamable HTTP, and `url` SSE unless
/// `type` names another remote transport.
pub fn import_servers(json: &str) -> Result<Vec<McpServer>> {
    let document: ImportDocument = serde_json::from_str(json)?;
    document
        .mcp_servers
        .into_iter()
        .map(|(name, raw)| -> Result<McpServer> {
            let original_json = serde_json::to_string_pretty(&raw)?;
            let entry: ImportEntry = serde_json::from_value(raw)?;
            let transport = transport_for(&name, &entry)?;
            Ok(McpServer {
                id: slug(&name),
                description: entry.description.clone().unwrap_or_default(),
                enabled: !entry.disabled,
                status: McpServerStatus::Unknown,
                transport,
                tools: None,
                original_json: Some(original_json),
                name,
            })
        })
        .collect()
}

fn transport_for(name: &str, entry: &ImportEntry) -> Result<McpTransport> {
    if let Some(command) = &entry.command {
        return Ok(McpTransport::Stdio {
            command: command.clone(),
            args: entry.args.clone(),
            env: entry.env.clone(),
        });
    }
    let headers = entry.headers.clone();
    if let Some(url) = &entry.http_url {
        return Ok(McpTransport::StreamableHttp {
            url: url.clone(),
            headers,
        });
    }
    let Some(url) = entry.url.clone() else {
        return Err(ConvoyError::Configuration(format!(
            "MCP server '{name}' needs one of command, url or httpUrl"
        )));
    };
    match entry.kind.as_deref() {
        None | Some("sse") => Ok(McpTransport::Sse { url, headers }),
        Some("http") => Ok(McpTransport::Http { url, headers }),
        Some("streamable_http") | Some("streamableHttp") | Some("streamable-http") => {
            Ok(McpTransport::StreamableHttp { url, headers })
        }
        Some(other) => Err(ConvoyError::Configuration(format!(
            "MCP server '{name}' has unsupported transport type '{other}'"
        ))),
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

fn substitute(headers: &BTreeMap<String, String>, token: Option<&str>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(key, value)| {
            let value = match token {
                Some(token) => value.replace(TOKEN_PLACEHOLDER, token),
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

impl McpServer {
    /// The agent-core entry for this server, substituting `<token>` when a credential is given.
    pub fn to_entry(&self, token: Option<&str>) -> McpServerEntry {
        match &self.transport {
            McpTransport::Stdio { command, args, env } => McpServerEntry::Stdio {
                command: command.clone(),
                args: args.clone(),
                env: env.clone(),
            },
            McpTransport::Sse { url, headers } | McpTransport::Http { url, headers } => {
                McpServerEntry::Remote {
                    url: Some(url.clone()),
                    http_url: None,
                    headers: substitute(headers, token),
                }
            }
            McpTransport::StreamableHttp { url, headers } => McpServerEntry::Remote {
                url: None,
                http_url: Some(url.clone()),
                headers: substitute(headers, token),
            },
        }
    }
}

/// Build the `name → entry` map for every enabled server.
pub fn to_core_map(servers: &[McpServer], token: Option<&str>) -> BTreeMap<String, McpServerEntry> {
    servers
        .iter()
        .filter(|server| server.enabled)
        .map(|server| (server.name.clone(), server.to_entry(token)))
        .collect()
}

/// JSON-file backed list of MCP servers.
#[derive(Debug, Clone)]
pub struct McpServerStore {
    path: PathBuf,
}

impl McpServerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all servers; a missing file is an empty list.
    pub fn load(&self) -> Result<Vec<McpServer>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, servers: &[McpServer]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(servers)?)?;
        Ok(())
    }

    /// Insert or replace servers by id.
    pub fn upsert(&self, incoming: Vec<McpServer>) -> Result<Vec<McpServer>> {
        let mut servers = self.load()?;
        for server in incoming {
            match servers.iter_mut().find(|s| s.id == server.id) {
                Some(existing) => *existing = server,
                None => servers.push(server),
            }
        }
        self.save(&servers)?;
        Ok(servers)
    }

    /// Remove a server by id, returning whether it existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut servers = self.load()?;
        let before = servers.len();
        servers.retain(|s| s.id != id);
        let removed = servers.len() != before;
        if removed {
            self.save(&servers)?;
        }
        Ok(removed)
    }
}
