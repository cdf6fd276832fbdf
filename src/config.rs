use crate::models::ModelConfig;
use anyhow::{Context, Result};
use keyring::Entry;
use std::path::PathBuf;
use uuid::Uuid;

const KEYRING_SERVICE_PREFIX: &str = "triagechat_api_key";
const DB_FILE_NAME: &str = "triagechat.sqlite";

/// Default location of the SQLite store, under the platform's local data directory.
pub fn default_db_path() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("Failed to resolve local data directory")?;
    Ok(base.join("triagechat").join(DB_FILE_NAME))
}

/// Config used when the store has none: direct OpenAI calls with a key from the environment.
pub fn default_model_config() -> ModelConfig {
    ModelConfig {
        id: Uuid::new_v4(),
        name: "Default OpenAI Compatible".to_string(),
        provider: "openai_compatible".to_string(),
        api_url: "https://api.openai.com/v1".to_string(),
        api_key_ref: Some("env:OPENAI_API_KEY".to_string()),
        provider_options: Some(
            r#"{"model": "gpt-3.5-turbo", "max_tokens": 600, "temperature": 0.7}"#.to_string(),
        ),
    }
}

// --- API Key Retrieval ---

/// Retrieves the API key for a given model configuration.
/// `env:NAME` reads an environment variable, `keyring` reads the OS keyring, and
/// no reference at all means the endpoint is a proxy that needs no credential.
pub fn get_api_key(config: &ModelConfig) -> Result<Option<String>> {
    match config.api_key_ref.as_deref() {
        Some(ref_str) if ref_str.starts_with("env:") => {
            let env_var_name = ref_str.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            std::env::var(env_var_name)
                .map(Some)
                .context(format!(
                    "Failed to get API key from environment variable '{}'",
                    env_var_name
                ))
        }
        Some("keyring") => {
            let service_name = format!("{}-{}", KEYRING_SERVICE_PREFIX, config.id);
            let entry = Entry::new(&service_name, &config.name) // Use config name as "username"
                .context("Failed to create keyring entry")?;
            log::debug!("Retrieving API key from keyring for service: {}", service_name);
            entry.get_password().map(Some).context(format!(
                "Failed to get API key from keyring for '{}'. Run `triagechat set-key` first.",
                config.name
            ))
        }
        Some(other) => Err(anyhow::anyhow!("Unsupported api_key_ref format: {}", other)),
        None => {
            log::debug!("No API key reference for '{}', calling without credential", config.name);
            Ok(None)
        }
    }
}

/// Stores an API key in the OS keyring for the given model configuration.
pub fn set_api_key_in_keyring(config: &ModelConfig, api_key: &str) -> Result<()> {
    let service_name = format!("{}-{}", KEYRING_SERVICE_PREFIX, config.id);
    let entry = Entry::new(&service_name, &config.name)
        .context("Failed to create keyring entry for setting password")?;
    log::info!("Setting API key in keyring for service: {}", service_name);
    entry.set_password(api_key).context(format!(
        "Failed to set API key in keyring for '{}'",
        config.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_ref(key_ref: Option<&str>) -> ModelConfig {
        ModelConfig {
            api_key_ref: key_ref.map(str::to_string),
            ..default_model_config()
        }
    }

    #[test]
    fn test_env_key_is_read() {
        std::env::set_var("TRIAGECHAT_TEST_KEY_PRESENT", "sk-test");
        let key = get_api_key(&config_with_ref(Some("env:TRIAGECHAT_TEST_KEY_PRESENT"))).unwrap();
        assert_eq!(key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_missing_env_key_is_an_error() {
        let result = get_api_key(&config_with_ref(Some("env:TRIAGECHAT_TEST_KEY_ABSENT")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("TRIAGECHAT_TEST_KEY_ABSENT"));
    }

    #[test]
    fn test_no_reference_means_proxy() {
        assert_eq!(get_api_key(&config_with_ref(None)).unwrap(), None);
    }

    #[test]
    fn test_unsupported_reference() {
        assert!(get_api_key(&config_with_ref(Some("vault:abc"))).is_err());
    }

    #[test]
    fn test_default_model_config() {
        let config = default_model_config();
        assert_eq!(config.api_key_ref.as_deref(), Some("env:OPENAI_API_KEY"));
        assert_eq!(config.provider, "openai_compatible");
    }
}
