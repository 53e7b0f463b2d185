//! CLI entry point for Convoy.

pub mod keys;
pub mod mcp;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Convoy conversation tooling
#[derive(Parser, Debug)]
#[command(name = "convoy", version, about = "Convoy: multi-conversation agent tooling")]
pub struct Cli {
    /// Config file (defaults to ~/.convoy/convoy.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage MCP server configuration
    Mcp(McpArgs),
    /// Inspect API key rotation
    Keys(KeysArgs),
    /// Print the resolved configuration (keys redacted)
    Config,
}

#[derive(Parser, Debug)]
pub struct McpArgs {
    #[command(subcommand)]
    pub command: McpCommands,
}

#[derive(Subcommand, Debug)]
pub enum McpCommands {
    /// Import servers from a `{"mcpServers": {...}}` JSON file
    Import(ImportArgs),
    /// List configured servers
    List,
    /// Remove a server by id
    Remove(RemoveArgs),
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// JSON file to import (`-` for stdin)
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommands,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// Show how a key string would rotate (never prints keys)
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Keys separated by commas or new lines
    pub keys: String,

    /// Provider the keys belong to
    #[arg(short, long, default_value = "gemini")]
    pub provider: String,
}
