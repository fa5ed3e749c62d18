//! Saved connection profiles: named sets of controller connection
//! parameters kept in the durable store under `profiles/{id}`. The kernel
//! assigns the identifier and creation timestamp; the dashboard lists
//! them newest first.

use crate::store::{DurableStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModbusMode {
    Tcp,
    Rtu,
}

/// Connection parameters as submitted by the dashboard form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    pub name: String,
    pub mode: ModbusMode,
    /// TCP addressing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// RTU addressing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub com_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    pub unit_id: u8,
    pub coil_address: u16,
    #[serde(default)]
    pub enable_logging: bool,
}

/// A stored profile: the draft plus the server-assigned identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub id: String,
    pub created_at: String,
    #[serde(flatten)]
    pub draft: ProfileDraft,
}

pub struct ProfileStore {
    store: Arc<dyn DurableStore>,
}

const PROFILES_PATH: &str = "profiles";

impl ProfileStore {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Persists a draft under a fresh unique id, stamped with now.
    pub async fn save(&self, draft: ProfileDraft) -> Result<ConnectionProfile, StoreError> {
        let profile = ConnectionProfile {
            id: Uuid::new_v4().to_string(),
            created_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            draft,
        };
        let value = serde_json::to_value(&profile)?;
        self.store
            .write(&format!("{PROFILES_PATH}/{}", profile.id), value)
            .await?;
        info!(id = %profile.id, name = %profile.draft.name, "saved connection profile");
        Ok(profile)
    }

    /// All saved profiles, newest first (createdAt descending).
    pub async fn list(&self) -> Result<Vec<ConnectionProfile>, StoreError> {
        let Some(value) = self.store.read(PROFILES_PATH).await? else {
            return Ok(Vec::new());
        };
        let Some(map) = value.as_object() else {
            return Ok(Vec::new());
        };
        let mut profiles: Vec<ConnectionProfile> = map
            .values()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }

    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&format!("{PROFILES_PATH}/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tcp_draft(name: &str) -> ProfileDraft {
        ProfileDraft {
            name: name.to_string(),
            mode: ModbusMode::Tcp,
            ip_address: Some("192.168.0.10".into()),
            port: Some(502),
            com_port: None,
            baud_rate: None,
            unit_id: 1,
            coil_address: 40,
            enable_logging: true,
        }
    }

    #[tokio::test]
    async fn saved_profiles_get_unique_ids_and_list_newest_first() {
        let profiles = ProfileStore::new(Arc::new(MemoryStore::new()));

        let first = profiles.save(tcp_draft("line-a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = profiles.save(tcp_draft("line-b")).await.unwrap();
        assert_ne!(first.id, second.id);

        let listed = profiles.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].draft.name, "line-b");
        assert_eq!(listed[1].draft.name, "line-a");
    }

    #[tokio::test]
    async fn remove_deletes_only_the_addressed_profile() {
        let profiles = ProfileStore::new(Arc::new(MemoryStore::new()));
        let keep = profiles.save(tcp_draft("keep")).await.unwrap();
        let drop = profiles.save(tcp_draft("drop")).await.unwrap();

        profiles.remove(&drop.id).await.unwrap();
        let listed = profiles.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);
    }

    #[tokio::test]
    async fn rtu_profile_round_trips_through_the_store() {
        let profiles = ProfileStore::new(Arc::new(MemoryStore::new()));
        let draft = ProfileDraft {
            name: "serial".into(),
            mode: ModbusMode::Rtu,
            ip_address: None,
            port: None,
            com_port: Some("/dev/ttyUSB0".into()),
            baud_rate: Some(9600),
            unit_id: 3,
            coil_address: 17,
            enable_logging: false,
        };
        profiles.save(draft).await.unwrap();
        let listed = profiles.list().await.unwrap();
        assert_eq!(listed[0].draft.mode, ModbusMode::Rtu);
        assert_eq!(listed[0].draft.com_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(listed[0].draft.baud_rate, Some(9600));
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let profiles = ProfileStore::new(Arc::new(MemoryStore::new()));
        assert!(profiles.list().await.unwrap().is_empty());
    }
}
