//! `convoy mcp` handlers.

use std::io::Read;
use std::path::Path;

use crate::config::{import_servers, ConvoyConfig, McpServer, McpTransport};

fn endpoint(server: &McpServer) -> (&'static str, String) {
    match &server.transport {
        McpTransport::Stdio { command, args, .. } => {
            let mut line = command.clone();
            for arg in args {
                line.push(' ');
                line.push_str(arg);
            }
            ("stdio", line)
        }
        McpTransport::Sse { url, .. } => ("sse", url.clone()),
        McpTransport::Http { url, .. } => ("http", url.clone()),
        McpTransport::StreamableHttp { url, .. } => ("streamable_http", url.clone()),
    }
}

/// Handle `convoy mcp import <file>`.
pub fn handle_import(config: &ConvoyConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let raw = if file == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        raw
    } else {
        std::fs::read_to_string(file)?
    };
    let imported = import_servers(&raw)?;
    let names: Vec<String> = imported.iter().map(|s| s.id.clone()).collect();
    let store = config.mcp_store();
    let all = store.upsert(imported)?;
    println!(
        "Imported {} server(s): {} ({} total in {})",
        names.len(),
        names.join(", "),
        all.len(),
        store.path().display()
    );
    Ok(())
}

/// Handle `convoy mcp list`.
pub fn handle_list(config: &ConvoyConfig) -> Result<(), Box<dyn std::error::Error>> {
    let servers = config.mcp_store().load()?;
    if servers.is_empty() {
        println!("No MCP servers configured.");
        return Ok(());
    }
    for server in &servers {
        let (kind, target) = endpoint(server);
        let state = if server.enabled { "enabled" } else { "disabled" };
        println!("{:<20} {:<16} {:<9} {}", server.id, kind, state, target);
    }
    Ok(())
}

/// Handle `convoy mcp remove <id>`.
pub fn handle_remove(config: &ConvoyConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    if config.mcp_store().remove(id)? {
        println!("Removed {id}");
    } else {
        eprintln!("No server with id {id}");
        std::process::exit(1);
    }
    Ok(())
}
