//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.promptrelay/config.json`) and environment.
//! Routes (command -> backend profile) live here; secrets never do — those come from the
//! injected secret provider at startup (signing secrets) or per task (backend API keys).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Deployment stage used in secret key paths (e.g. "dev", "prod").
    #[serde(default = "default_stage")]
    pub stage: String,

    /// Command routes: command identifier -> backend profile.
    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,

    /// Model backend endpoints and timeouts.
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Webhook signature verification settings.
    #[serde(default)]
    pub signing: SigningConfig,

    /// Callback delivery retry settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Secret provider selection and inline values (dev/tests only).
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// Gateway bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook HTTP endpoint (default 8787).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8787
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

fn default_stage() -> String {
    "dev".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            stage: default_stage(),
            routes: HashMap::new(),
            backends: BackendsConfig::default(),
            signing: SigningConfig::default(),
            delivery: DeliveryConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

/// Which kind of generative backend a route targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Text completion backend (chat-style messages API).
    Text,
    /// Image generation backend (prompt -> hosted image URL).
    Image,
}

/// How the delivered message is shown by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseType {
    /// Visible to the whole channel.
    #[default]
    InChannel,
    /// Visible only to the requesting user.
    Ephemeral,
}

impl ResponseType {
    /// Wire value used in the callback message payload.
    pub fn as_wire(&self) -> &'static str {
        match self {
            ResponseType::InChannel => "in_channel",
            ResponseType::Ephemeral => "ephemeral",
        }
    }
}

/// One command route: backend kind, model id, and response formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub kind: BackendKind,
    /// Model identifier passed through to the backend (e.g. "claude-sonnet-4").
    pub model_id: String,
    #[serde(default)]
    pub response_type: ResponseType,
}

/// Model backend endpoints. Base URLs are overridable so tests can point at a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendsConfig {
    /// Text backend base URL (messages API).
    #[serde(default)]
    pub text_base_url: Option<String>,

    /// Image backend base URL (image generation API).
    #[serde(default)]
    pub image_base_url: Option<String>,

    /// Per-call timeout for backend requests, in seconds (default 30).
    /// Mandatory bound: a model call may never block a worker task indefinitely.
    #[serde(default = "default_backend_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_timeout_secs() -> u64 {
    30
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            text_base_url: None,
            image_base_url: None,
            request_timeout_secs: default_backend_timeout_secs(),
        }
    }
}

/// Webhook signature settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningConfig {
    /// How old (seconds) a request timestamp may be before it is rejected as a replay (default 300).
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
}

fn default_freshness_window_secs() -> u64 {
    300
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: default_freshness_window_secs(),
        }
    }
}

/// Callback delivery retry settings. Delivery is at-most-a-few-times: a transient
/// callback failure is retried up to `max_attempts` total attempts with a doubling
/// delay, then the task is logged and abandoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    /// Total POST attempts to the callback URL (default 3).
    #[serde(default = "default_delivery_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds; doubled per subsequent retry (default 500).
    #[serde(default = "default_delivery_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_delivery_max_attempts() -> u32 {
    3
}

fn default_delivery_retry_delay_ms() -> u64 {
    500
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_delivery_max_attempts(),
            retry_delay_ms: default_delivery_retry_delay_ms(),
        }
    }
}

/// Secret provider selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretProviderKind {
    /// Environment variables (key path mapped to PROMPTRELAY_{STAGE}_{COMMAND}_{NAME}).
    #[default]
    Env,
    /// Inline map from this config file. Dev and tests only.
    Inline,
}

/// Secrets config: provider kind plus the inline map used when provider is "inline".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsConfig {
    #[serde(default)]
    pub provider: SecretProviderKind,
    /// Full key path -> value (e.g. "/promptrelay/dev/CLAUDE_SONNET/SIGNING_SECRET").
    #[serde(default)]
    pub inline: HashMap<String, String>,
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PROMPTRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".promptrelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or PROMPTRELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
