//! Secret provider: per-route signing secrets and backend API keys.
//!
//! Keys follow the parameter-store path layout `/promptrelay/{stage}/{COMMAND}/{NAME}`.
//! The provider is injected into the gateway and worker so neither reads ambient
//! process state at call sites, and so tests run without a real secret store.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Secret name for a route's webhook signing secret.
pub const SIGNING_SECRET_NAME: &str = "SIGNING_SECRET";

/// Secret name for a route's backend API key.
pub const API_KEY_NAME: &str = "API_KEY";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
}

/// Build the full key path for a route-scoped secret.
pub fn secret_key(stage: &str, command: &str, name: &str) -> String {
    format!(
        "/promptrelay/{}/{}/{}",
        stage,
        command.to_uppercase(),
        name
    )
}

/// Read-only secret lookup: `get(key) -> value | NotFound`.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get(&self, key: &str) -> Result<String, SecretError>;
}

/// Provider backed by environment variables.
/// `/promptrelay/dev/CLAUDE_SONNET/SIGNING_SECRET` maps to
/// `PROMPTRELAY_DEV_CLAUDE_SONNET_SIGNING_SECRET`.
pub struct EnvSecretProvider;

/// Environment variable name for a key path.
pub fn env_var_for_key(key: &str) -> String {
    key.trim_start_matches('/')
        .replace(['/', '-'], "_")
        .to_uppercase()
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get(&self, key: &str) -> Result<String, SecretError> {
        std::env::var(env_var_for_key(key))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }
}

/// In-memory provider (config `secrets.inline`, dev and tests).
pub struct StaticSecretProvider {
    values: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get(&self, key: &str) -> Result<String, SecretError> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }
}

/// Build the provider selected by config.
pub fn provider_from_config(config: &crate::config::Config) -> std::sync::Arc<dyn SecretProvider> {
    match config.secrets.provider {
        crate::config::SecretProviderKind::Env => std::sync::Arc::new(EnvSecretProvider),
        crate::config::SecretProviderKind::Inline => std::sync::Arc::new(
            StaticSecretProvider::new(config.secrets.inline.clone()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_path_layout() {
        assert_eq!(
            secret_key("dev", "claude_sonnet", SIGNING_SECRET_NAME),
            "/promptrelay/dev/CLAUDE_SONNET/SIGNING_SECRET"
        );
    }

    #[test]
    fn env_var_mapping() {
        assert_eq!(
            env_var_for_key("/promptrelay/dev/CLAUDE_SONNET/API_KEY"),
            "PROMPTRELAY_DEV_CLAUDE_SONNET_API_KEY"
        );
        assert_eq!(
            env_var_for_key("/promptrelay/prod/stable-image/API_KEY"),
            "PROMPTRELAY_PROD_STABLE_IMAGE_API_KEY"
        );
    }

    #[tokio::test]
    async fn static_provider_lookup() {
        let mut values = HashMap::new();
        values.insert("/promptrelay/dev/X/API_KEY".to_string(), "k".to_string());
        let p = StaticSecretProvider::new(values);
        assert_eq!(p.get("/promptrelay/dev/X/API_KEY").await.unwrap(), "k");
        assert!(matches!(
            p.get("/promptrelay/dev/Y/API_KEY").await,
            Err(SecretError::NotFound(_))
        ));
    }
}
