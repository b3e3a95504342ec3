/// Out-of-band mail delivery.
///
/// The `Mailer` seam keeps the core independent of the transport: production
/// posts to an HTTP mail relay, tests use the no-op. Delivery is
/// fire-and-forget from the caller's perspective; failures are logged and
/// never surface as a request error.

use async_trait::async_trait;
use serde::Serialize;

use crate::validators::is_valid_email;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, recipient: &str, subject: &str, html_content: &str)
        -> Result<(), String>;
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderAddress,
}

#[derive(Clone)]
pub struct SenderAddress(String);

impl SenderAddress {
    pub fn parse(s: String) -> Result<Self, String> {
        let email = is_valid_email(&s).map_err(|e| format!("{:?}", e))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest {
    from: String,
    to: String,
    #[serde(rename = "Html")]
    html: String,
    #[serde(rename = "Subject")]
    subject: String,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderAddress, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }
}

#[async_trait]
impl Mailer for EmailClient {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), String> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner().to_string(),
            to: recipient.to_string(),
            subject: subject.to_string(),
            html: html_content.to_string(),
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send email: {}", e);
                format!("Failed to send email: {}", e)
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Email service returned error: {}", e);
                format!("Email service error: {}", e)
            })?;

        Ok(())
    }
}

/// Discards all mail. Used in tests and local setups without a relay.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        _html_content: &str,
    ) -> Result<(), String> {
        tracing::debug!(recipient = %recipient, subject = %subject, "Mail discarded (noop mailer)");
        Ok(())
    }
}
