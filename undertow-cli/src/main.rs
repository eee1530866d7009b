//! Undertow CLI - Command-line interface
//!
//! Starts the streaming server or inspects local content for development.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "On-demand torrent streaming server")]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::handle_command(cli.command).await
}
