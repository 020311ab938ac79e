//! Command routing: command identifier -> backend route profile.
//!
//! The table is built once at startup from config plus the secret provider and is
//! immutable afterwards, so concurrent lookups need no locking (shared via `Arc`).

use crate::config::{BackendKind, Config, ResponseType};
use crate::secrets::{self, SecretProvider, API_KEY_NAME, SIGNING_SECRET_NAME};
use std::collections::HashMap;
use thiserror::Error;

/// Resolved route: everything the dispatcher and worker need for one command.
#[derive(Debug, Clone)]
pub struct RouteProfile {
    /// Command identifier (also the webhook path segment).
    pub command: String,
    pub kind: BackendKind,
    /// Model identifier passed to the backend.
    pub model_id: String,
    /// Webhook signing secret, loaded once at startup.
    pub signing_secret: String,
    /// Secret key path for the backend API key; resolved per task in the worker,
    /// never cached across requests.
    pub api_key_path: String,
    pub response_type: ResponseType,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("route {command}: missing signing secret: {source}")]
    MissingSigningSecret {
        command: String,
        source: crate::secrets::SecretError,
    },
}

/// Immutable command -> profile table.
#[derive(Debug)]
pub struct RouteTable {
    routes: HashMap<String, RouteProfile>,
}

impl RouteTable {
    /// Build the table from config. Fetches each route's signing secret from the
    /// provider; a route without one is a startup error, not a per-request surprise.
    pub async fn load(
        config: &Config,
        provider: &dyn SecretProvider,
    ) -> Result<Self, RouteError> {
        let mut routes = HashMap::new();
        for (command, rc) in &config.routes {
            let secret_path = secrets::secret_key(&config.stage, command, SIGNING_SECRET_NAME);
            let signing_secret =
                provider
                    .get(&secret_path)
                    .await
                    .map_err(|e| RouteError::MissingSigningSecret {
                        command: command.clone(),
                        source: e,
                    })?;
            routes.insert(
                command.clone(),
                RouteProfile {
                    command: command.clone(),
                    kind: rc.kind,
                    model_id: rc.model_id.clone(),
                    signing_secret,
                    api_key_path: secrets::secret_key(&config.stage, command, API_KEY_NAME),
                    response_type: rc.response_type,
                },
            );
        }
        Ok(Self { routes })
    }

    /// Pure lookup. Unknown commands are a reportable client error, not a crash.
    pub fn resolve(&self, command: &str) -> Result<&RouteProfile, RouteError> {
        self.routes
            .get(command)
            .ok_or_else(|| RouteError::UnknownCommand(command.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
