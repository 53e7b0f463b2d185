//! Convoy CLI binary entry point.

use clap::Parser;
use convoy::cli::{Cli, Commands, KeysCommands, McpCommands};
use convoy::config::ConvoyConfig;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    // stdout may be a worker's IPC channel; logs always go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("convoy=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConvoyConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Mcp(args) => match args.command {
            McpCommands::Import(args) => convoy::cli::mcp::handle_import(&config, &args.file),
            McpCommands::List => convoy::cli::mcp::handle_list(&config),
            McpCommands::Remove(args) => convoy::cli::mcp::handle_remove(&config, &args.id),
        },
        Commands::Keys(args) => match args.command {
            KeysCommands::Inspect(args) => convoy::cli::keys::handle_inspect(&args.keys, &args.provider),
        },
        Commands::Config => {
            println!("{config:#?}");
            Ok(())
        }
    }
}
