use crate::api::{LLMApiProvider, ProviderOptions};
use crate::conversation::Conversation;
use crate::models::{CommunityPost, ModelConfig, SavedAssessment, UserContext, UserProfile};
use crate::storage::StorageManager;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Receives UI events from the command layer.
///
/// The presentation layer implements this; `event` names are listed in
/// [`crate::commands`].
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: serde_json::Value);
}

/// Sink that drops every event, for headless use.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &str, _payload: serde_json::Value) {}
}

/// Persisted data, loaded once at startup and rewritten after every change.
#[derive(Debug, Default)]
pub struct AppData {
    pub user_context: Option<UserContext>,
    pub assessments: Vec<SavedAssessment>,
    pub posts: Vec<CommunityPost>,
}

// Application state handed to every command
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<StorageManager>>,
    pub data: Arc<Mutex<AppData>>,
    pub api_provider: Arc<dyn LLMApiProvider>,
    pub events: Arc<dyn EventSink>,
    pub conversations: Arc<DashMap<Uuid, Conversation>>, // Live conversations, dropped on discard
    pub model_config: ModelConfig,
    pub user: Option<UserProfile>, // Signed-in user, if any
    pub request_timeout: Duration,
}

impl AppState {
    /// Builds the state and loads the persisted user context and collections.
    pub async fn initialize(
        storage_manager: StorageManager,
        api_provider: Arc<dyn LLMApiProvider>,
        events: Arc<dyn EventSink>,
        model_config: ModelConfig,
        user: Option<UserProfile>,
    ) -> Result<Self, anyhow::Error> {
        let data = AppData {
            user_context: storage_manager.load_user_context().await?,
            assessments: storage_manager.load_assessments().await?,
            posts: storage_manager.load_posts().await?,
        };
        log::info!(
            "Loaded {} assessments and {} posts (user context cached: {})",
            data.assessments.len(),
            data.posts.len(),
            data.user_context.is_some()
        );

        let request_timeout = ProviderOptions::from_config(&model_config)?.timeout();

        Ok(Self {
            storage: Arc::new(Mutex::new(storage_manager)),
            data: Arc::new(Mutex::new(data)),
            api_provider,
            events,
            conversations: Arc::new(DashMap::new()),
            model_config,
            user,
            request_timeout,
        })
    }

    /// Name shown on community posts.
    pub fn author_name(&self) -> String {
        self.user
            .as_ref()
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "Anonymous".to_string())
    }
}
