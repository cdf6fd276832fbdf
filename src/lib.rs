// Declare the modules
pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod models;
pub mod parser;
pub mod prompts;
pub mod records;
pub mod state;
pub mod storage;

pub use conversation::{Conversation, ConversationState, ConversationView, Effect, Event};
pub use error::ChatError;
pub use state::{AppState, EventSink, NullSink};

use clap::Parser;

pub fn run() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = cli::Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cli::execute(cli))
}
