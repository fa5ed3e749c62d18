//! Local session records. A successful OTP verification materializes a
//! time-boxed session owned by this process and persisted as one JSON
//! file in the kernel data dir, not in the durable store. Validity is
//! re-checked lazily on every load; expired or unparseable records are
//! deleted and treated as absent, never surfaced as errors.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

pub const SESSION_LIFETIME: Duration = Duration::hours(24);

/// Proof that a subject completed OTP verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub subject_identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub is_privileged: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub established_at: OffsetDateTime,
}

pub struct SessionManager {
    path: PathBuf,
    lifetime: Duration,
}

impl SessionManager {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lifetime: SESSION_LIFETIME,
        }
    }

    /// Writes a fresh session record, replacing any existing one.
    pub async fn establish(
        &self,
        identity: &str,
        display_name: Option<String>,
        is_privileged: bool,
    ) -> Result<Session> {
        let session = Session {
            subject_identity: identity.to_string(),
            display_name,
            is_privileged,
            established_at: OffsetDateTime::now_utc(),
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&session)?).await?;
        info!(subject = %session.subject_identity, privileged = session.is_privileged, "session established");
        Ok(session)
    }

    /// Loads the persisted session, if it is still valid. Expired records
    /// are deleted rather than renewed; malformed records are treated the
    /// same as absent ones.
    pub async fn load_current(&self) -> Option<Session> {
        self.load_current_at(OffsetDateTime::now_utc()).await
    }

    pub async fn load_current_at(&self, now: OffsetDateTime) -> Option<Session> {
        let content = tokio::fs::read_to_string(&self.path).await.ok()?;
        let session: Session = match serde_json::from_str(&content) {
            Ok(session) => session,
            Err(e) => {
                // Locally-written data failing to parse means corruption or
                // a format change, so fail safe: treat as logged out.
                warn!(error = %e, "discarding malformed session record");
                self.terminate().await;
                return None;
            }
        };
        if now - session.established_at >= self.lifetime {
            info!(subject = %session.subject_identity, "session expired");
            self.terminate().await;
            return None;
        }
        Some(session)
    }

    /// Deletes the persisted record unconditionally.
    pub async fn terminate(&self) {
        let _ = tokio::fs::remove_file(&self.path).await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.load_current().await.is_some()
    }

    pub async fn is_privileged(&self) -> bool {
        self.load_current()
            .await
            .map(|s| s.is_privileged)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &tempfile::TempDir) -> SessionManager {
        SessionManager::new(dir.path().join("session.json"))
    }

    #[tokio::test]
    async fn establish_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir);
        sessions
            .establish("op@plant.io", Some("Operator".into()), true)
            .await
            .unwrap();

        let loaded = sessions.load_current().await.unwrap();
        assert_eq!(loaded.subject_identity, "op@plant.io");
        assert_eq!(loaded.display_name.as_deref(), Some("Operator"));
        assert!(loaded.is_privileged);
        assert!(sessions.is_authenticated().await);
        assert!(sessions.is_privileged().await);
    }

    #[tokio::test]
    async fn session_expires_after_twenty_four_hours_and_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir);
        let session = sessions.establish("op@plant.io", None, false).await.unwrap();

        let almost = session.established_at + Duration::hours(23) + Duration::minutes(59);
        assert!(sessions.load_current_at(almost).await.is_some());

        let past = session.established_at + Duration::hours(24) + Duration::minutes(1);
        assert!(sessions.load_current_at(past).await.is_none());
        // The record was deleted, so even an in-window load now sees nothing.
        assert!(sessions.load_current_at(almost).await.is_none());
    }

    #[tokio::test]
    async fn malformed_record_is_discarded_not_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let sessions = SessionManager::new(&path);
        assert!(sessions.load_current().await.is_none());
        assert!(tokio::fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn terminate_logs_out_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir);
        sessions.establish("op@plant.io", None, false).await.unwrap();
        sessions.terminate().await;
        assert!(!sessions.is_authenticated().await);
        assert!(!sessions.is_privileged().await);
        // Terminating again with nothing persisted is fine.
        sessions.terminate().await;
    }

    #[tokio::test]
    async fn persisted_shape_matches_the_wire_contract() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir);
        sessions.establish("op@plant.io", None, false).await.unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join("session.json"))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["subjectIdentity"], "op@plant.io");
        assert_eq!(value["isPrivileged"], false);
        assert!(value["establishedAt"].as_str().unwrap().contains('T'));
        assert!(value.get("displayName").is_none());
    }
}
