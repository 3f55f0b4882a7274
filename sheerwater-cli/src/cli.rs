use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sheerwater",
    version,
    about = "Chat with the Sheerwater forecast-evaluation tools"
)]
pub struct Cli {
    /// Configuration file (defaults to config/chat.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// SSE endpoint of the tool server; overrides the configured server
    #[arg(long)]
    pub server_url: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    /// System prompt for this session
    #[arg(long)]
    pub system: Option<String>,
    #[arg(long, default_value = "local")]
    pub user: String,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Single exchange; prints the result as JSON
    Ask {
        #[arg(required = true)]
        prompt: Vec<String>,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Print the tool catalog
    Tools,
    /// Interactive chat (default)
    Chat,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }
}
