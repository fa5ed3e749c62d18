//! Pulse kernel: backend of the PLC dashboard.
//!
//! Orchestrates the durable store adapter, the OTP credential service, the
//! session manager, the presence broadcaster and the telemetry event log,
//! and exposes them over a REST API for the frontend.

mod config;
mod credentials;
mod eventlog;
mod health;
mod http;
mod models;
mod notifier;
mod presence;
mod profiles;
mod session;
mod state;
mod store;
mod telemetry;

use crate::config::StoreMode;
use crate::credentials::CredentialService;
use crate::eventlog::EventLogWriter;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::notifier::{EmailApiConfig, HttpNotifier, LogNotifier, Notifier};
use crate::presence::PresenceBroadcaster;
use crate::profiles::ProfileStore;
use crate::session::SessionManager;
use crate::state::new_shared;
use crate::store::{DurableStore, MemoryStore, RestStore};

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = config::load_config().await;

    let store: Arc<dyn DurableStore> = match cfg.store.mode {
        StoreMode::Rest => {
            let endpoint = cfg
                .store
                .endpoint
                .clone()
                .context("store.endpoint is required for store.mode: rest")?;
            info!(endpoint = %endpoint, "using rest document store");
            Arc::new(RestStore::new(&endpoint))
        }
        StoreMode::Memory => {
            warn!("using in-memory store; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let presence = PresenceBroadcaster::new();
    presence.initialize(store.clone());

    let notifier: Arc<dyn Notifier> = match &cfg.notifier {
        Some(nc) => Arc::new(HttpNotifier::new(EmailApiConfig {
            endpoint: nc.endpoint.clone(),
            service_id: nc.service_id.clone(),
            template_id: nc.template_id.clone(),
            public_key: nc.public_key.clone(),
        })),
        None => Arc::new(LogNotifier),
    };

    if let Err(e) = tokio::fs::create_dir_all(&cfg.data_dir).await {
        warn!(error = %e, dir = %cfg.data_dir, "failed to create data dir");
    }

    let sessions = Arc::new(SessionManager::new(
        PathBuf::from(&cfg.data_dir).join("session.json"),
    ));
    let credentials = Arc::new(CredentialService::new(
        store.clone(),
        notifier,
        cfg.admin_email.clone(),
    ));
    let profiles = Arc::new(ProfileStore::new(store.clone()));
    let writer = Arc::new(EventLogWriter::new(Some(store.clone())));
    let latest = new_shared(None);
    let health = HealthTracker::new();

    // Follow the latest slot in the store as well, so a kernel restart
    // repopulates the live view from the last persisted sample.
    let latest_follow = latest.clone();
    let _latest_watch = writer.stream_latest(move |sample| {
        *latest_follow.lock() = Some(sample);
    });

    match cfg.mqtt.clone() {
        Some(mqtt) => {
            telemetry::spawn_telemetry_listener(
                mqtt,
                writer.clone(),
                latest.clone(),
                health.clone(),
            );
        }
        None => warn!("mqtt not configured; telemetry ingest disabled"),
    }

    let app_state = AppState {
        credentials,
        sessions,
        profiles,
        presence,
        health,
        latest,
        store,
        admin_email: cfg.admin_email.clone(),
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    info!(addr = %cfg.http.bind, "kernel listening");
    axum::serve(listener, app).await?;
    Ok(())
}
