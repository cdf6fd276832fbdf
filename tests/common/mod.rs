//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Connection, SqliteConnection};

use triagechat_lib::api::LLMApiProvider;
use triagechat_lib::models::{ConversationMessage, ModelConfig, UserContext, UserProfile};
use triagechat_lib::storage::StorageManager;
use triagechat_lib::{AppState, EventSink};

pub const OUTLET_ASSESSMENT: &str = "Thanks, I have everything I need.

**PROJECT ASSESSMENT COMPLETE**
**Project:** Dead garage outlet
**Diagnosis:** Tripped GFCI upstream
**Complexity:** Low
**DIY Feasible:** Yes
**Estimated Price:** $0-25
**Safety Concerns:** Switch off the breaker before opening the box
**Recommended Next Steps:**
1. Press reset on the bathroom GFCI
2. Test the outlet with a lamp
**Specialist Needed:** Licensed Electrician if it still fails";

/// What the scripted backend does on its next call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    Hang,
}

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct Call {
    pub messages: Vec<ConversationMessage>,
    pub context: Option<UserContext>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Backend that plays back a fixed list of replies.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMApiProvider for ScriptedProvider {
    async fn send_conversation(
        &self,
        _config: &ModelConfig,
        api_key: Option<&str>,
        messages: &[ConversationMessage],
        context: Option<&UserContext>,
        timeout: Duration,
    ) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(Call {
            messages: messages.to_vec(),
            context: context.cloned(),
            api_key: api_key.map(str::to_string),
            timeout,
        });
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(reason)) => Err(anyhow::anyhow!(reason)),
            Some(Reply::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(anyhow::anyhow!("script exhausted")),
        }
    }
}

/// Sink that keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingSink {
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn payloads(&self, event: &str) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
    }
}

/// Proxy-style config: no key reference, so no credential lookup happens.
pub fn proxy_config() -> ModelConfig {
    ModelConfig {
        api_key_ref: None,
        ..triagechat_lib::config::default_model_config()
    }
}

pub struct Harness {
    pub state: AppState,
    pub provider: Arc<ScriptedProvider>,
    pub sink: Arc<RecordingSink>,
}

pub async fn harness_with(
    storage: StorageManager,
    replies: Vec<Reply>,
    user: Option<UserProfile>,
) -> Harness {
    let provider = Arc::new(ScriptedProvider::new(replies));
    let sink = Arc::new(RecordingSink::default());
    let mut state = AppState::initialize(
        storage,
        provider.clone(),
        sink.clone(),
        proxy_config(),
        user,
    )
    .await
    .expect("Failed to initialize state");
    state.request_timeout = Duration::from_secs(5);
    Harness {
        state,
        provider,
        sink,
    }
}

pub async fn harness(replies: Vec<Reply>) -> Harness {
    let storage = StorageManager::in_memory()
        .await
        .expect("Failed to open in-memory store");
    harness_with(storage, replies, None).await
}

pub fn text(reply: &str) -> Reply {
    Reply::Text(reply.to_string())
}

/// Takes the write lock on an on-disk store from a second connection, so every
/// write through `StorageManager` fails once SQLite's busy timeout runs out.
/// Run `ROLLBACK` on the returned connection to release it.
pub async fn lock_database(db_path: &Path) -> SqliteConnection {
    let url = format!("sqlite://{}", db_path.to_string_lossy());
    let mut conn = SqliteConnection::connect(&url)
        .await
        .expect("Failed to open locking connection");
    sqlx::query("BEGIN EXCLUSIVE")
        .execute(&mut conn)
        .await
        .expect("Failed to lock database");
    conn
}

pub async fn unlock_database(mut conn: SqliteConnection) {
    sqlx::query("ROLLBACK")
        .execute(&mut conn)
        .await
        .expect("Failed to release database lock");
}
