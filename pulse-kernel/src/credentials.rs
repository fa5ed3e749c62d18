//! OTP credential service: issues six-digit secrets, persists them in the
//! durable store keyed by the sanitized requester identity, and verifies
//! them with single-use, time-boxed semantics. At most one live credential
//! exists per identity; issuing again simply overwrites the previous one.
//!
//! Expiry is enforced at verification time, never by a background sweep:
//! the keys are tiny, one per identity, and self-overwriting on the next
//! issuance.

use crate::notifier::{Notifier, OtpDelivery};
use crate::store::{sanitize_segment, DurableStore, StoreError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::info;

/// How long a secret stays redeemable after issuance.
pub const OTP_TTL: Duration = Duration::minutes(10);

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The store could not be reached. Surfaced to the caller so "wrong
    /// code" and "service down" stay distinguishable.
    #[error("durable store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    /// The notifier errored or refused the message. The credential stays
    /// persisted; issuance and delivery are not transactional.
    #[error("otp delivery failed: {0}")]
    DeliveryFailed(String),
}

/// A live one-time credential, as returned from `issue`.
#[derive(Debug, Clone)]
pub struct Credential {
    pub subject_identity: String,
    pub secret: String,
    pub issued_at: OffsetDateTime,
}

/// Persisted form under `otp/{subject}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    secret: String,
    #[serde(with = "time::serde::rfc3339")]
    issued_at: OffsetDateTime,
}

fn otp_path(subject: &str) -> String {
    format!("otp/{subject}")
}

/// Uniformly random six-digit secret, `100000..=999999`.
fn generate_secret() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

pub struct CredentialService {
    store: Arc<dyn DurableStore>,
    notifier: Arc<dyn Notifier>,
    admin_recipient: String,
    ttl: Duration,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn DurableStore>,
        notifier: Arc<dyn Notifier>,
        admin_recipient: String,
    ) -> Self {
        Self {
            store,
            notifier,
            admin_recipient,
            ttl: OTP_TTL,
        }
    }

    /// Generates and persists a fresh credential for `identity`, then asks
    /// the notifier to deliver the secret to the administrative recipient.
    pub async fn issue(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<Credential, CredentialError> {
        let subject = sanitize_segment(identity);
        let secret = generate_secret();
        let issued_at = OffsetDateTime::now_utc();

        let record = StoredCredential {
            secret: secret.clone(),
            issued_at,
        };
        let value = serde_json::to_value(&record).map_err(StoreError::from)?;
        self.store.write(&otp_path(&subject), value).await?;
        info!(subject = %subject, "issued otp credential");

        let delivery = OtpDelivery {
            recipient_identity: self.admin_recipient.clone(),
            requester_identity: identity.to_string(),
            requester_name: display_name.map(str::to_string),
            secret: secret.clone(),
        };
        match self.notifier.deliver(&delivery).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(CredentialError::DeliveryFailed(
                    "notifier rejected the message".into(),
                ))
            }
            Err(e) => return Err(CredentialError::DeliveryFailed(e.to_string())),
        }

        Ok(Credential {
            subject_identity: subject,
            secret,
            issued_at,
        })
    }

    /// Checks `supplied` against the stored credential for `identity`.
    /// A true result consumes the credential. Absent, mismatching or
    /// expired credentials all yield `Ok(false)`; only store transport
    /// failures become errors.
    pub async fn verify(&self, identity: &str, supplied: &str) -> Result<bool, CredentialError> {
        self.verify_at(identity, supplied, OffsetDateTime::now_utc())
            .await
    }

    pub async fn verify_at(
        &self,
        identity: &str,
        supplied: &str,
        now: OffsetDateTime,
    ) -> Result<bool, CredentialError> {
        let subject = sanitize_segment(identity);
        let path = otp_path(&subject);

        let Some(value) = self.store.read(&path).await? else {
            return Ok(false);
        };
        let Ok(record) = serde_json::from_value::<StoredCredential>(value) else {
            // Unparseable leftovers cannot be redeemed.
            return Ok(false);
        };

        if now - record.issued_at >= self.ttl {
            // The expired value stays in place; it is already unusable and
            // the next issuance overwrites it.
            return Ok(false);
        }
        if supplied != record.secret {
            return Ok(false);
        }

        // Single use: consume before reporting success.
        self.store.delete(&path).await?;
        info!(subject = %subject, "otp credential verified and consumed");
        Ok(true)
    }
}
