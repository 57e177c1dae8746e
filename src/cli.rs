use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "healthchat")]
#[command(about = "Streaming chat client for the health assistant backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding config.toml and logs
    #[arg(short, long)]
    pub config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Patient profile the conversation is about
        #[arg(short, long)]
        patient: Option<String>,

        /// Override the chat-stream endpoint
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// Manage the backend token kept in the OS keyring
    Token {
        /// Store a new token
        #[arg(short, long)]
        set: Option<String>,

        /// Remove the stored token
        #[arg(short, long, conflicts_with = "set")]
        remove: bool,
    },

    /// Show the resolved configuration
    Config,
}

impl Commands {
    pub fn default_chat() -> Self {
        Commands::Chat {
            patient: None,
            endpoint: None,
        }
    }
}
