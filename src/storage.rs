use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool};
use std::path::Path;
use uuid::Uuid;

use crate::config;
use crate::models::{CommunityPost, ModelConfig, SavedAssessment, UserContext};

// Namespaced keys for the wholesale-rewritten collections
pub const USER_CONTEXT_KEY: &str = "triage-user-context";
pub const ASSESSMENTS_KEY: &str = "triage-assessments";
pub const POSTS_KEY: &str = "triage-posts";

// Schema, one statement per entry
const MIGRATIONS: [&str; 2] = [
    "
    -- Namespaced JSON documents (user context, assessment and post collections)
    CREATE TABLE IF NOT EXISTS kv_store (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    )",
    "
    -- Model Configurations Table
    CREATE TABLE IF NOT EXISTS model_configs (
        id TEXT PRIMARY KEY NOT NULL, -- UUID
        name TEXT NOT NULL UNIQUE,
        provider TEXT NOT NULL, -- e.g., 'openai_compatible'
        api_url TEXT NOT NULL,
        api_key_ref TEXT, -- e.g., 'keyring', 'env:MY_API_KEY', or null for a proxy
        provider_options TEXT -- JSON blob for provider-specific settings
    )",
];

#[derive(Debug)]
pub struct StorageManager {
    pool: SqlitePool,
}

impl StorageManager {
    /// Opens (creating if needed) the database file at `db_path` and runs migrations.
    pub async fn new(db_path: &Path) -> Result<Self, anyhow::Error> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        log::info!("Connecting to database: {}", db_url);

        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(&db_url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database; kept on a single connection so it is never dropped.
    pub async fn in_memory() -> Result<Self, anyhow::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::info!("Running database migrations...");
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(pool)
                .await
                .context("Failed to run database migrations")?;
        }
        log::info!("Database migrations completed.");
        Ok(())
    }

    // --- Key-value documents ---

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, anyhow::Error> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Failed to read '{}' from store", key))?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                let value = serde_json::from_str(&raw)
                    .context(format!("Failed to parse stored '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), anyhow::Error> {
        let raw = serde_json::to_string(value).context(format!("Failed to serialize '{}'", key))?;
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await
        .context(format!("Failed to write '{}' to store", key))?;
        log::debug!("Rewrote store key '{}'", key);
        Ok(())
    }

    pub async fn load_user_context(&self) -> Result<Option<UserContext>, anyhow::Error> {
        self.get_json(USER_CONTEXT_KEY).await
    }

    pub async fn save_user_context(&self, context: &UserContext) -> Result<(), anyhow::Error> {
        log::info!("Saving user context");
        self.put_json(USER_CONTEXT_KEY, context).await
    }

    pub async fn load_assessments(&self) -> Result<Vec<SavedAssessment>, anyhow::Error> {
        Ok(self.get_json(ASSESSMENTS_KEY).await?.unwrap_or_default())
    }

    /// Replaces the whole assessment collection.
    pub async fn save_assessments(&self, assessments: &[SavedAssessment]) -> Result<(), anyhow::Error> {
        log::info!("Saving {} assessments", assessments.len());
        self.put_json(ASSESSMENTS_KEY, assessments).await
    }

    pub async fn load_posts(&self) -> Result<Vec<CommunityPost>, anyhow::Error> {
        Ok(self.get_json(POSTS_KEY).await?.unwrap_or_default())
    }

    /// Replaces the whole post collection.
    pub async fn save_posts(&self, posts: &[CommunityPost]) -> Result<(), anyhow::Error> {
        log::info!("Saving {} community posts", posts.len());
        self.put_json(POSTS_KEY, posts).await
    }

    // --- Model configurations ---

    /// Adds the default OpenAI-compatible model config if no configs exist.
    pub async fn add_default_model_config_if_none(&self) -> Result<(), anyhow::Error> {
        log::debug!("Checking for existing model configurations");
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM model_configs")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count model configs")?
            .try_get("count")?;

        if count == 0 {
            log::info!("No model configs found, adding a default OpenAI config.");
            self.add_model_config(&config::default_model_config()).await?;
        } else {
            log::debug!("Found {} existing model configs, skipping default.", count);
        }
        Ok(())
    }

    /// Fetches all model configurations.
    pub async fn list_model_configs(&self) -> Result<Vec<ModelConfig>, anyhow::Error> {
        log::debug!("Fetching all model configurations from database");
        let rows = sqlx::query(
            r#"
            SELECT id, name, provider, api_url, api_key_ref, provider_options
            FROM model_configs
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch model configs from database")?;

        let configs = rows
            .into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                Ok(ModelConfig {
                    id: Uuid::parse_str(&id).context("Failed to parse model config ID")?,
                    name: row.try_get("name")?,
                    provider: row.try_get("provider")?,
                    api_url: row.try_get("api_url")?,
                    api_key_ref: row.try_get("api_key_ref")?,
                    provider_options: row.try_get("provider_options")?,
                })
            })
            .collect::<Result<Vec<ModelConfig>, anyhow::Error>>()?;

        log::info!("Fetched {} model configurations", configs.len());
        Ok(configs)
    }

    /// Finds a model configuration by its display name.
    pub async fn get_model_config_by_name(&self, name: &str) -> Result<Option<ModelConfig>, anyhow::Error> {
        Ok(self
            .list_model_configs()
            .await?
            .into_iter()
            .find(|config| config.name == name))
    }

    pub async fn add_model_config(&self, config: &ModelConfig) -> Result<(), anyhow::Error> {
        log::info!("Adding new model config: {}", config.name);
        sqlx::query(
            r#"
            INSERT INTO model_configs (id, name, provider, api_url, api_key_ref, provider_options)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(config.id.to_string())
        .bind(&config.name)
        .bind(&config.provider)
        .bind(&config.api_url)
        .bind(&config.api_key_ref)
        .bind(&config.provider_options)
        .execute(&self.pool)
        .await
        .context("Failed to insert new model config into database")?;

        log::info!("Successfully added model config with ID: {}", config.id);
        Ok(())
    }

    pub async fn update_model_config(&self, config: &ModelConfig) -> Result<(), anyhow::Error> {
        let id_text = config.id.to_string();
        log::info!("Updating model config: {} ({})", config.name, id_text);

        let result = sqlx::query(
            r#"
            UPDATE model_configs
            SET name = ?, provider = ?, api_url = ?, api_key_ref = ?, provider_options = ?
            WHERE id = ?
            "#,
        )
        .bind(&config.name)
        .bind(&config.provider)
        .bind(&config.api_url)
        .bind(&config.api_key_ref)
        .bind(&config.provider_options)
        .bind(&id_text)
        .execute(&self.pool)
        .await
        .context("Failed to update model config in database")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to update non-existent model config: {}", id_text);
            return Err(anyhow::anyhow!("Model config not found for updating."));
        }
        Ok(())
    }

    pub async fn delete_model_config(&self, config_id: Uuid) -> Result<(), anyhow::Error> {
        let id_text = config_id.to_string();
        log::warn!("Deleting model config with ID: {}", id_text);

        let result = sqlx::query("DELETE FROM model_configs WHERE id = ?")
            .bind(&id_text)
            .execute(&self.pool)
            .await
            .context("Failed to delete model config from database")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to delete non-existent model config: {}", id_text);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssessmentSummary, Complexity};
    use chrono::Utc;

    fn sample_assessment(title: &str) -> SavedAssessment {
        SavedAssessment {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: "desc".into(),
            status: "active".into(),
            kind: "AI Triage".into(),
            date: Utc::now(),
            ai_complete: true,
            diagnosis: "diag".into(),
            confidence: Complexity::Low,
            specialist_type: "General Contractor".into(),
            next_steps: vec![],
            chat_transcript: vec![],
            summary: AssessmentSummary::default(),
        }
    }

    #[tokio::test]
    async fn test_user_context_roundtrip() {
        let storage = StorageManager::in_memory().await.unwrap();
        assert_eq!(storage.load_user_context().await.unwrap(), None);

        let ctx = UserContext {
            home_type: Some("Townhouse".into()),
            ..Default::default()
        };
        storage.save_user_context(&ctx).await.unwrap();
        assert_eq!(storage.load_user_context().await.unwrap(), Some(ctx));
    }

    #[tokio::test]
    async fn test_collections_are_rewritten_wholesale() {
        let storage = StorageManager::in_memory().await.unwrap();
        assert!(storage.load_assessments().await.unwrap().is_empty());

        storage
            .save_assessments(&[sample_assessment("a"), sample_assessment("b")])
            .await
            .unwrap();
        storage.save_assessments(&[sample_assessment("c")]).await.unwrap();

        let loaded = storage.load_assessments().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "c");
        assert!(storage.load_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_model_config_added_once() {
        let storage = StorageManager::in_memory().await.unwrap();
        storage.add_default_model_config_if_none().await.unwrap();
        storage.add_default_model_config_if_none().await.unwrap();

        let configs = storage.list_model_configs().await.unwrap();
        assert_eq!(configs.len(), 1);
        let by_name = storage
            .get_model_config_by_name("Default OpenAI Compatible")
            .await
            .unwrap();
        assert!(by_name.is_some());
    }

    #[tokio::test]
    async fn test_model_config_update_and_delete() {
        let storage = StorageManager::in_memory().await.unwrap();
        let mut config = config::default_model_config();
        storage.add_model_config(&config).await.unwrap();

        config.api_key_ref = None;
        config.api_url = "https://example.com/.netlify/functions/openai".into();
        storage.update_model_config(&config).await.unwrap();
        let stored = storage.list_model_configs().await.unwrap();
        assert_eq!(stored[0].api_key_ref, None);
        assert_eq!(stored[0].api_url, config.api_url);

        storage.delete_model_config(config.id).await.unwrap();
        assert!(storage.list_model_configs().await.unwrap().is_empty());

        let missing = config::default_model_config();
        assert!(storage.update_model_config(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_file_database_persists_between_managers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.sqlite");

        {
            let storage = StorageManager::new(&path).await.unwrap();
            storage
                .save_assessments(&[sample_assessment("kept")])
                .await
                .unwrap();
        }

        let reopened = StorageManager::new(&path).await.unwrap();
        let loaded = reopened.load_assessments().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "kept");
    }
}
