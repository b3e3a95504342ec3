/// Domain event publishing.
///
/// Lifecycle events are pushed to an HTTP webhook so downstream services
/// (profile bootstrap, notification fan-out) can react. Publishing is
/// strictly fire-and-forget: the request that produced the event never
/// waits for, and never fails on, delivery.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    UserRegistered {
        user_id: Uuid,
        email: String,
        role: String,
        timestamp: String,
    },
    UserLoggedIn {
        user_id: Uuid,
        timestamp: String,
    },
    PasswordResetRequested {
        email: String,
        reset_link: String,
        timestamp: String,
    },
}

impl AuthEvent {
    pub fn user_registered(user_id: Uuid, email: String, role: String) -> Self {
        Self::UserRegistered {
            user_id,
            email,
            role,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn user_logged_in(user_id: Uuid) -> Self {
        Self::UserLoggedIn {
            user_id,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn password_reset_requested(email: String, reset_link: String) -> Self {
        Self::PasswordResetRequested {
            email,
            reset_link,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "UserRegistered",
            Self::UserLoggedIn { .. } => "UserLoggedIn",
            Self::PasswordResetRequested { .. } => "PasswordResetRequested",
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: AuthEvent) -> Result<(), String>;
}

/// Detaches delivery from the caller. Failures are logged, never returned.
pub fn dispatch(publisher: Arc<dyn EventPublisher>, event: AuthEvent) {
    let name = event.name();
    tokio::spawn(async move {
        if let Err(e) = publisher.publish(event).await {
            tracing::error!(event = name, error = %e, "Event delivery failed");
        }
    });
}

pub struct HttpEventPublisher {
    http_client: reqwest::Client,
    webhook_url: String,
}

impl HttpEventPublisher {
    pub fn new(webhook_url: String, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            webhook_url,
        }
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, event: AuthEvent) -> Result<(), String> {
        self.http_client
            .post(&self.webhook_url)
            .json(&event)
            .send()
            .await
            .map_err(|e| format!("Failed to post event: {}", e))?
            .error_for_status()
            .map_err(|e| format!("Event sink returned error: {}", e))?;

        tracing::debug!(event = event.name(), "Event published");
        Ok(())
    }
}

/// Swallows all events. Used in tests and single-service deployments.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, event: AuthEvent) -> Result<(), String> {
        tracing::debug!(event = event.name(), "Event discarded (noop publisher)");
        Ok(())
    }
}
