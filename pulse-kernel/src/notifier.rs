//! Out-of-band delivery of issued secrets. The kernel never shows an OTP
//! to the requester directly; it hands the secret to the administrative
//! recipient through the hosted transactional-email API and reports a
//! plain accepted/rejected boolean back. No retries here.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("notifier transport error: {0}")]
    Transport(String),
}

/// What the notifier needs to compose the delivery.
#[derive(Debug, Clone)]
pub struct OtpDelivery {
    /// Administrative mailbox the secret is sent to.
    pub recipient_identity: String,
    /// Identity the requester typed into the login form.
    pub requester_identity: String,
    pub requester_name: Option<String>,
    pub secret: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns `Ok(true)` when the service accepted the message for
    /// delivery, `Ok(false)` on a negative acknowledgement.
    async fn deliver(&self, delivery: &OtpDelivery) -> Result<bool, NotifierError>;
}

/// Configuration for the hosted email API (EmailJS-compatible shape).
#[derive(Debug, Clone)]
pub struct EmailApiConfig {
    pub endpoint: String,
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
}

pub struct HttpNotifier {
    client: reqwest::Client,
    config: EmailApiConfig,
}

impl HttpNotifier {
    pub fn new(config: EmailApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(&self, delivery: &OtpDelivery) -> Result<bool, NotifierError> {
        let body = json!({
            "service_id": self.config.service_id,
            "template_id": self.config.template_id,
            "user_id": self.config.public_key,
            "template_params": {
                "user_name": delivery.requester_name.as_deref().unwrap_or(&delivery.requester_identity),
                "user_email": delivery.requester_identity,
                "otp": delivery.secret,
                "admin_email": delivery.recipient_identity,
            }
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        let accepted = response.status().is_success();
        info!(
            requester = %delivery.requester_identity,
            accepted,
            "otp delivery request completed"
        );
        Ok(accepted)
    }
}

/// Fallback when no email API is configured: the secret is written to the
/// kernel log so an operator can relay it manually. Always acknowledges.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, delivery: &OtpDelivery) -> Result<bool, NotifierError> {
        info!(
            requester = %delivery.requester_identity,
            secret = %delivery.secret,
            "no notifier configured; otp logged for manual relay"
        );
        Ok(true)
    }
}
