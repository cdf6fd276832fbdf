//! Terminal front-end: argument parsing, model config management, and the
//! interactive chat loop that renders conversation events.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::api::OpenAICompatibleProvider;
use crate::commands;
use crate::config;
use crate::models::{AssessmentSummary, ModelConfig, UserProfile};
use crate::records;
use crate::state::{AppState, EventSink};
use crate::storage::StorageManager;

#[derive(Parser, Debug)]
#[command(name = "triagechat", version, about = "Chat-driven home repair triage")]
pub struct Cli {
    /// SQLite database path (defaults to the local data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Chat as a signed-in user; skips the home profile questions
    #[arg(long)]
    pub user: Option<String>,

    /// Name of the model configuration to use (defaults to the first one)
    #[arg(long)]
    pub model_config: Option<String>,

    /// Override the backend request timeout, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive triage conversation (default)
    Chat,
    /// Store an API key for a model configuration in the OS keyring
    SetKey { name: String },
    /// List model configurations
    Models,
    /// Add a model configuration
    AddModel {
        #[arg(long)]
        name: String,
        #[arg(long)]
        api_url: String,
        /// `env:NAME` or `keyring`; omit for a proxy that holds the key
        #[arg(long)]
        key_ref: Option<String>,
        #[arg(long, default_value = "gpt-3.5-turbo")]
        model: String,
    },
    /// Remove a model configuration
    RemoveModel { name: String },
    /// Show saved assessments and community posts
    History,
}

pub async fn execute(cli: Cli) -> Result<()> {
    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => config::default_db_path()?,
    };
    let storage = StorageManager::new(&db_path).await?;
    storage.add_default_model_config_if_none().await?;

    match cli.command {
        Some(Command::SetKey { ref name }) => set_key(&storage, name).await,
        Some(Command::Models) => {
            for config in storage.list_model_configs().await? {
                println!(
                    "{}  {}  key: {}",
                    config.name,
                    config.api_url,
                    config.api_key_ref.as_deref().unwrap_or("none (proxy)")
                );
            }
            Ok(())
        }
        Some(Command::AddModel {
            ref name,
            ref api_url,
            ref key_ref,
            ref model,
        }) => {
            if name.trim().is_empty() || api_url.trim().is_empty() {
                anyhow::bail!("Name and API URL cannot be empty.");
            }
            let config = ModelConfig {
                id: Uuid::new_v4(),
                name: name.trim().to_string(),
                provider: "openai_compatible".to_string(),
                api_url: api_url.trim().to_string(),
                api_key_ref: key_ref.clone(),
                provider_options: Some(serde_json::json!({ "model": model }).to_string()),
            };
            storage.add_model_config(&config).await
        }
        Some(Command::RemoveModel { ref name }) => {
            let config = find_model_config(&storage, Some(name)).await?;
            storage.delete_model_config(config.id).await
        }
        Some(Command::History) => print_history(&storage).await,
        Some(Command::Chat) | None => chat(&cli, storage).await,
    }
}

async fn find_model_config(storage: &StorageManager, name: Option<&str>) -> Result<ModelConfig> {
    match name {
        Some(name) => storage
            .get_model_config_by_name(name)
            .await?
            .with_context(|| format!("No model configuration named '{}'", name)),
        None => storage
            .list_model_configs()
            .await?
            .into_iter()
            .next()
            .context("No model configurations available"),
    }
}

async fn set_key(storage: &StorageManager, name: &str) -> Result<()> {
    let mut config = find_model_config(storage, Some(name)).await?;
    println!("Paste the API key for '{}' and press enter:", config.name);

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read API key")?;
    let key = line.trim();
    if key.is_empty() {
        anyhow::bail!("API key cannot be empty.");
    }

    config::set_api_key_in_keyring(&config, key)?;
    config.api_key_ref = Some("keyring".to_string());
    storage.update_model_config(&config).await?;
    println!("Stored key for '{}' in the OS keyring.", config.name);
    Ok(())
}

async fn print_history(storage: &StorageManager) -> Result<()> {
    let assessments = storage.load_assessments().await?;
    println!("Saved assessments ({}):", assessments.len());
    for a in &assessments {
        println!(
            "  {}  {}  [{}] confidence {:?}",
            a.date.format("%Y-%m-%d %H:%M"),
            a.title,
            a.specialist_type,
            a.confidence
        );
    }

    let posts = storage.load_posts().await?;
    println!("Community posts ({}):", posts.len());
    for p in &posts {
        println!("  {}  {} by {}", p.date.format("%Y-%m-%d %H:%M"), p.title, p.author);
    }
    Ok(())
}

const HELP: &str =
    "Commands: /share [note]  /specialist  /save  /new  /quit  (anything else is sent to the assistant)";

async fn chat(cli: &Cli, storage: StorageManager) -> Result<()> {
    let model_config = find_model_config(&storage, cli.model_config.as_deref()).await?;
    let user = cli.user.as_ref().map(|name| UserProfile {
        name: name.clone(),
        ..Default::default()
    });

    let mut state = AppState::initialize(
        storage,
        Arc::new(OpenAICompatibleProvider::new()),
        Arc::new(TerminalSink::default()),
        model_config,
        user,
    )
    .await?;
    if let Some(secs) = cli.timeout_secs {
        state.request_timeout = Duration::from_secs(secs);
    }

    println!("{}", HELP);
    let mut conversation_id = commands::start_conversation(&state).await?.id;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        let outcome = match command {
            "/quit" | "/exit" => break,
            "/new" => {
                commands::discard_conversation(&state, conversation_id);
                commands::start_conversation(&state)
                    .await
                    .map(|view| conversation_id = view.id)
            }
            "/share" => {
                let note = Some(rest.to_string()).filter(|n| !n.is_empty());
                commands::request_peer_help(&state, conversation_id, note)
                    .await
                    .map(|_| ())
            }
            "/specialist" => commands::request_specialist(&state, conversation_id)
                .await
                .map(|_| ()),
            "/save" => commands::save_assessment(&state, conversation_id)
                .await
                .map(|_| ()),
            _ => commands::send_message(&state, conversation_id, line.to_string())
                .await
                .map(|_| ()),
        };

        if let Err(e) = outcome {
            println!("! {}", e);
        }
    }

    commands::discard_conversation(&state, conversation_id);
    Ok(())
}

/// Prints conversation events to stdout.
#[derive(Default)]
pub struct TerminalSink {
    // Messages already printed, per conversation id
    printed: Mutex<HashMap<String, usize>>,
}

fn print_summary(summary: &AssessmentSummary) {
    println!("\n===== Assessment =====");
    println!(
        "Project:       {}",
        summary.project.as_deref().unwrap_or(records::FALLBACK_PROJECT)
    );
    println!(
        "Diagnosis:     {}",
        summary.diagnosis.as_deref().unwrap_or(records::FALLBACK_DIAGNOSIS)
    );
    println!(
        "Complexity:    {}",
        summary.complexity.as_deref().unwrap_or(records::FALLBACK_COMPLEXITY)
    );
    println!(
        "DIY Feasible:  {}",
        summary.diy_feasible.as_deref().unwrap_or(records::FALLBACK_DIY)
    );
    if let Some(price) = &summary.estimated_price {
        println!("Estimate:      {}", price);
    }
    if let Some(safety) = &summary.safety_concerns {
        println!("Safety:        {}", safety);
    }
    println!("Next steps:");
    match &summary.next_steps {
        Some(steps) => steps.iter().for_each(|s| println!("  - {}", s)),
        None => records::GENERIC_NEXT_STEPS
            .iter()
            .for_each(|s| println!("  - {}", s)),
    }
    if let Some(specialist) = &summary.specialist_needed {
        println!("Specialist:    {}", specialist);
    }
    if let Some(advice) = records::guidance(summary) {
        println!("Advice:        {}", advice);
    }
    println!("======================");
    println!("/share [note] to ask friends, /specialist to find a pro, /save to keep it.\n");
}

impl EventSink for TerminalSink {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        match event {
            "conversation_updated" => {
                let id = payload["id"].as_str().unwrap_or_default().to_string();
                let Some(messages) = payload["messages"].as_array() else {
                    return;
                };
                let mut printed = match self.printed.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let seen = printed.entry(id).or_insert(0);
                for msg in messages.iter().skip(*seen) {
                    // The user's own line is already on screen.
                    if msg["role"] == "assistant" {
                        println!("\nassistant> {}\n", msg["content"].as_str().unwrap_or_default());
                    }
                }
                *seen = messages.len();
            }
            "conversation_discarded" => {
                if let Some(id) = payload["conversationId"].as_str() {
                    let mut printed = match self.printed.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    printed.remove(id);
                }
            }
            "assistant_typing" => {
                if payload["typing"] == true {
                    println!("(assistant is typing...)");
                }
            }
            "assessment_ready" => {
                match serde_json::from_value::<AssessmentSummary>(payload["assessment"].clone()) {
                    Ok(summary) => print_summary(&summary),
                    Err(e) => log::error!("Malformed assessment payload: {:?}", e),
                }
            }
            "record_saved" => println!(
                "Saved {}: {}",
                payload["kind"].as_str().unwrap_or("record"),
                payload["record"]["title"].as_str().unwrap_or_default()
            ),
            "specialist_requested" => println!(
                "Looking for a {} near you. Your assessment is saved.",
                payload["specialistType"].as_str().unwrap_or("professional")
            ),
            other => log::debug!("Unhandled UI event: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_chat_flags() {
        let cli = Cli::parse_from(["triagechat", "--user", "sam", "--timeout-secs", "5"]);
        assert_eq!(cli.user.as_deref(), Some("sam"));
        assert_eq!(cli.timeout_secs, Some(5));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parses_add_model() {
        let cli = Cli::parse_from([
            "triagechat",
            "add-model",
            "--name",
            "proxy",
            "--api-url",
            "https://example.com/.netlify/functions",
        ]);
        match cli.command {
            Some(Command::AddModel {
                name,
                key_ref,
                model,
                ..
            }) => {
                assert_eq!(name, "proxy");
                assert_eq!(key_ref, None);
                assert_eq!(model, "gpt-3.5-turbo");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_terminal_sink_tracks_printed_messages() {
        let sink = TerminalSink::default();
        let payload = serde_json::json!({
            "id": "abc",
            "messages": [{ "role": "assistant", "content": "hi" }],
        });
        sink.emit("conversation_updated", payload);
        assert_eq!(sink.printed.lock().unwrap().get("abc"), Some(&1));
    }

    #[test]
    fn test_terminal_sink_forgets_discarded_conversations() {
        let sink = TerminalSink::default();
        for id in ["first", "second"] {
            sink.emit(
                "conversation_updated",
                serde_json::json!({ "id": id, "messages": [] }),
            );
        }
        sink.emit(
            "conversation_discarded",
            serde_json::json!({ "conversationId": "first" }),
        );

        let printed = sink.printed.lock().unwrap();
        assert!(!printed.contains_key("first"));
        assert!(printed.contains_key("second"));
    }
}
