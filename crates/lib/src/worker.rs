//! Worker stage: model invocation and asynchronous result delivery.
//!
//! Receives [`DispatchTask`]s from the gateway hand-off channel; each task runs in its
//! own spawned task to completion or failure, with no shared mutable state. Backend
//! and credential failures are converted to a user-visible error message — the one
//! channel back to the user is the callback URL, so nothing is propagated raw.
//!
//! Delivery is at-most-a-few-times, not exactly-once: a transient callback failure is
//! retried up to the configured attempt bound with doubling backoff, then the task is
//! logged and abandoned.

use crate::backends::{BackendError, ImageBackendClient, TextBackendClient};
use crate::config::{BackendKind, Config, DeliveryConfig};
use crate::dispatch::DispatchTask;
use crate::secrets::SecretProvider;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Per-attempt timeout for callback POSTs.
const DELIVERY_TIMEOUT_SECS: u64 = 10;

/// Formatted message POSTed to the callback URL (platform message schema).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackMessage {
    pub response_type: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<MessageAttachment>>,
}

/// Image attachment with metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttachment {
    pub image_url: String,
    pub title: String,
    /// Plain-text stand-in for clients that cannot render the image.
    pub fallback: String,
}

/// Terminal result of one task's delivery attempt sequence. Only logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Backend succeeded and the formatted result reached the callback URL.
    Delivered { attempts: u32 },
    /// Backend failed; the formatted error message reached the callback URL.
    ErrorDelivered { attempts: u32 },
    /// All delivery attempts failed; the task is terminally abandoned.
    Abandoned { attempts: u32, reason: String },
}

/// Worker state shared by all spawned task handlers (clients are cheap clones, the
/// secret provider is read-only).
pub struct Worker {
    secrets: Arc<dyn SecretProvider>,
    text: TextBackendClient,
    image: ImageBackendClient,
    http: reqwest::Client,
    delivery: DeliveryConfig,
}

impl Worker {
    pub fn new(config: &Config, secrets: Arc<dyn SecretProvider>) -> Self {
        let timeout = Duration::from_secs(config.backends.request_timeout_secs);
        Self {
            secrets,
            text: TextBackendClient::new(config.backends.text_base_url.clone(), timeout),
            image: ImageBackendClient::new(config.backends.image_base_url.clone(), timeout),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
                .build()
                .expect("http client with timeout"),
            delivery: config.delivery.clone(),
        }
    }

    /// Start the receive loop. Each task is handled in its own spawned task so one slow
    /// model call never delays the next. The loop ends when the gateway drops its
    /// sender, and the returned handle resolves only after every in-flight handler has
    /// reached a terminal outcome; an accepted task is never dropped by shutdown.
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::Receiver<DispatchTask>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut handlers = JoinSet::new();
            loop {
                tokio::select! {
                    maybe_task = rx.recv() => match maybe_task {
                        Some(task) => {
                            let worker = self.clone();
                            handlers.spawn(async move { worker.handle(task).await });
                        }
                        None => break,
                    },
                    Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
                }
            }
            if !handlers.is_empty() {
                log::info!(
                    "hand-off channel closed, draining {} in-flight task(s)",
                    handlers.len()
                );
            }
            while handlers.join_next().await.is_some() {}
            log::info!("worker loop stopped");
        })
    }

    async fn handle(&self, task: DispatchTask) {
        let task_id = task.task_id.clone();
        match self.process(&task).await {
            DeliveryOutcome::Delivered { attempts } => {
                log::info!("task {}: delivered (attempts: {})", task_id, attempts);
            }
            DeliveryOutcome::ErrorDelivered { attempts } => {
                log::warn!(
                    "task {}: error message delivered (attempts: {})",
                    task_id,
                    attempts
                );
            }
            DeliveryOutcome::Abandoned { attempts, reason } => {
                log::error!(
                    "task {}: abandoned after {} attempts: {}",
                    task_id,
                    attempts,
                    reason
                );
            }
        }
    }

    /// Process one task to a terminal outcome: invoke the backend, format the result
    /// (or a user-visible error), and deliver to the callback URL with bounded retries.
    pub async fn process(&self, task: &DispatchTask) -> DeliveryOutcome {
        let (message, backend_ok) = match self.invoke_backend(task).await {
            Ok(msg) => (msg, true),
            Err(user_text) => (
                CallbackMessage {
                    response_type: "ephemeral",
                    text: user_text,
                    attachments: None,
                },
                false,
            ),
        };

        match self.deliver(&task.request.response_url, &message).await {
            Ok(attempts) if backend_ok => DeliveryOutcome::Delivered { attempts },
            Ok(attempts) => DeliveryOutcome::ErrorDelivered { attempts },
            Err((attempts, reason)) => DeliveryOutcome::Abandoned { attempts, reason },
        }
    }

    /// Invoke the resolved backend. Failures come back as the user-visible message text;
    /// details go to the log, never to the platform.
    async fn invoke_backend(&self, task: &DispatchTask) -> Result<CallbackMessage, String> {
        let api_key = match self.secrets.get(&task.profile.api_key_path).await {
            Ok(k) => k,
            Err(e) => {
                log::error!(
                    "task {}: credential lookup failed for {}: {}",
                    task.task_id,
                    task.profile.command,
                    e
                );
                return Err(format!(
                    "the {} command is not configured correctly. please contact an administrator.",
                    task.profile.command
                ));
            }
        };

        let prompt = task.request.text.trim();
        let result = match task.profile.kind {
            BackendKind::Text => self
                .text
                .generate(&task.profile.model_id, &api_key, prompt)
                .await
                .map(|reply| CallbackMessage {
                    response_type: task.profile.response_type.as_wire(),
                    text: reply,
                    attachments: None,
                }),
            BackendKind::Image => self
                .image
                .generate(&task.profile.model_id, &api_key, prompt)
                .await
                .map(|img| CallbackMessage {
                    response_type: task.profile.response_type.as_wire(),
                    text: format!("generated image for: {}", prompt),
                    attachments: Some(vec![MessageAttachment {
                        fallback: img.url.clone(),
                        image_url: img.url,
                        title: format!("input: {}", prompt),
                    }]),
                }),
        };

        result.map_err(|e| {
            log::error!(
                "task {}: backend {} failed: {}",
                task.task_id,
                task.profile.model_id,
                e
            );
            user_facing_error(&e)
        })
    }

    /// POST the formatted message to the callback URL with bounded retries.
    /// Returns the attempt count on success, or (attempts, reason) once exhausted.
    async fn deliver(
        &self,
        url: &str,
        message: &CallbackMessage,
    ) -> Result<u32, (u32, String)> {
        let max_attempts = self.delivery.max_attempts.max(1);
        let mut delay = Duration::from_millis(self.delivery.retry_delay_ms);
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self.http.post(url).json(message).send().await {
                Ok(res) if res.status().is_success() => return Ok(attempt),
                Ok(res) => {
                    last_error = format!("HTTP {}", res.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            if attempt < max_attempts {
                log::warn!(
                    "callback delivery attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    last_error,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
        Err((max_attempts, last_error))
    }
}

/// Sanitized error text for the user. Raw backend errors are logged, not forwarded.
fn user_facing_error(e: &BackendError) -> String {
    if e.is_timeout() {
        "the model did not respond in time. please try again.".to_string()
    } else {
        "something went wrong while generating a response. please try again.".to_string()
    }
}
