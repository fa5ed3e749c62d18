//! REST API of the Pulse kernel: the surface the dashboard frontend talks
//! to. Routes are organized as /auth, /presence, /telemetry, /profiles
//! plus the health pair. Transport failures of the durable store map to
//! 503 so the UI can tell "service unreachable" apart from "wrong code"
//! (401).

use crate::credentials::{CredentialError, CredentialService};
use crate::eventlog::HISTORY_PATH;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::TelemetrySample;
use crate::presence::PresenceBroadcaster;
use crate::profiles::{ConnectionProfile, ProfileDraft, ProfileStore};
use crate::session::{Session, SessionManager};
use crate::state::Shared;
use crate::store::DurableStore;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialService>,
    pub sessions: Arc<SessionManager>,
    pub profiles: Arc<ProfileStore>,
    pub presence: PresenceBroadcaster,
    pub health: HealthTracker,
    pub latest: Shared<Option<TelemetrySample>>,
    pub store: Arc<dyn DurableStore>,
    pub admin_email: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/auth/request", post(auth_request))
        .route("/auth/verify", post(auth_verify))
        .route("/auth/session", get(get_session))
        .route("/auth/logout", post(logout))
        .route("/presence", get(get_presence))
        .route("/telemetry/latest", get(get_latest))
        .route("/telemetry/history", get(get_history))
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/{id}", delete(delete_profile))
        .with_state(state)
}

async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.snapshot(&app.presence))
}

#[derive(Debug, Deserialize)]
struct AuthRequestIn {
    email: String,
    name: Option<String>,
}

// POST /auth/request: issue an OTP and hand it to the notifier.
async fn auth_request(
    State(app): State<AppState>,
    Json(body): Json<AuthRequestIn>,
) -> (StatusCode, Json<Value>) {
    if !body.email.contains('@') {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "sent": false, "error": "invalid email" })),
        );
    }
    match app
        .credentials
        .issue(&body.email, body.name.as_deref())
        .await
    {
        Ok(_) => (StatusCode::OK, Json(json!({ "sent": true }))),
        Err(CredentialError::DeliveryFailed(reason)) => {
            warn!(email = %body.email, %reason, "otp delivery failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "sent": false, "error": "delivery failed" })),
            )
        }
        Err(CredentialError::StoreUnavailable(e)) => {
            error!(error = %e, "store unavailable during otp issuance");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "sent": false, "error": "store unavailable" })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthVerifyIn {
    email: String,
    code: String,
}

// POST /auth/verify: redeem the OTP; success materializes the session.
async fn auth_verify(
    State(app): State<AppState>,
    Json(body): Json<AuthVerifyIn>,
) -> (StatusCode, Json<Value>) {
    match app.credentials.verify(&body.email, &body.code).await {
        Ok(true) => {
            let is_privileged = body.email == app.admin_email;
            match app
                .sessions
                .establish(&body.email, None, is_privileged)
                .await
            {
                Ok(session) => (
                    StatusCode::OK,
                    Json(json!({ "ok": true, "session": session })),
                ),
                Err(e) => {
                    error!(error = %e, "failed to persist session");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "ok": false, "error": "session write failed" })),
                    )
                }
            }
        }
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error": "invalid or expired code" })),
        ),
        Err(e) => {
            error!(error = %e, "store unavailable during verification");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "ok": false, "error": "store unavailable" })),
            )
        }
    }
}

async fn get_session(State(app): State<AppState>) -> Json<Option<Session>> {
    Json(app.sessions.load_current().await)
}

async fn logout(State(app): State<AppState>) -> StatusCode {
    app.sessions.terminate().await;
    StatusCode::NO_CONTENT
}

async fn get_presence(State(app): State<AppState>) -> Json<Value> {
    Json(json!({ "storeOnline": app.presence.is_online() }))
}

async fn get_latest(State(app): State<AppState>) -> Json<Option<TelemetrySample>> {
    Json(app.latest.lock().clone())
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

// GET /telemetry/history?limit=N: the N most recent entries, oldest first.
async fn get_history(
    State(app): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<TelemetrySample>>, StatusCode> {
    let value = app
        .store
        .read(HISTORY_PATH)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    let mut samples: Vec<TelemetrySample> = match value {
        // Entries arrive keyed by millis-seq; key order is arrival order.
        Some(Value::Object(map)) => map
            .values()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
        _ => Vec::new(),
    };
    if let Some(limit) = params.limit {
        if samples.len() > limit {
            samples.drain(..samples.len() - limit);
        }
    }
    Ok(Json(samples))
}

async fn list_profiles(
    State(app): State<AppState>,
) -> Result<Json<Vec<ConnectionProfile>>, StatusCode> {
    app.profiles
        .list()
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

async fn create_profile(
    State(app): State<AppState>,
    Json(draft): Json<ProfileDraft>,
) -> Result<Json<ConnectionProfile>, StatusCode> {
    app.profiles
        .save(draft)
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

async fn delete_profile(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    app.profiles
        .remove(&id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::EventLogWriter;
    use crate::notifier::testing::RecordingNotifier;
    use crate::state::new_shared;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app(store: Arc<MemoryStore>, session_dir: &tempfile::TempDir) -> Router {
        let notifier = Arc::new(RecordingNotifier::accepting());
        let state = AppState {
            credentials: Arc::new(CredentialService::new(
                store.clone(),
                notifier,
                "admin@plant.io".into(),
            )),
            sessions: Arc::new(SessionManager::new(session_dir.path().join("session.json"))),
            profiles: Arc::new(ProfileStore::new(store.clone())),
            presence: PresenceBroadcaster::new(),
            health: HealthTracker::new(),
            latest: new_shared(None),
            store,
            admin_email: "admin@plant.io".into(),
        };
        build_router(state)
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn full_login_flow_over_http() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(store.clone(), &dir);

        let (status, body) = send_json(
            &app,
            "POST",
            "/auth/request",
            json!({ "email": "admin@plant.io", "name": "Admin" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sent"], true);

        // Fish the issued secret out of the store, like the admin relaying it.
        let stored = store.read("otp/admin_plant_io").await.unwrap().unwrap();
        let secret = stored["secret"].as_str().unwrap().to_string();
        let wrong = if secret == "999999" { "100000" } else { "999999" };

        let (status, body) = send_json(
            &app,
            "POST",
            "/auth/verify",
            json!({ "email": "admin@plant.io", "code": wrong }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);

        let (status, body) = send_json(
            &app,
            "POST",
            "/auth/verify",
            json!({ "email": "admin@plant.io", "code": secret }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["isPrivileged"], true);

        let (status, body) = get_json(&app, "/auth/session").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subjectIdentity"], "admin@plant.io");

        // The code was consumed by the successful verification.
        let (status, _) = send_json(
            &app,
            "POST",
            "/auth/verify",
            json!({ "email": "admin@plant.io", "code": secret }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/auth/logout")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (_, body) = get_json(&app, "/auth/session").await;
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn store_outage_maps_to_service_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(store.clone(), &dir);

        store.set_reachable(false);
        let (status, _) = send_json(
            &app,
            "POST",
            "/auth/verify",
            json!({ "email": "a@b.com", "code": "123456" }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = get_json(&app, "/telemetry/history").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn history_endpoint_honors_the_limit() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(store.clone(), &dir);

        let writer = EventLogWriter::new(Some(store.clone()));
        for i in 0..5 {
            writer
                .record(&TelemetrySample {
                    timestamp: format!("2024-05-01T08:00:0{i}Z"),
                    value: i % 2 == 0,
                })
                .await;
        }

        let (status, body) = get_json(&app, "/telemetry/history?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let samples = body.as_array().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1]["timestamp"], "2024-05-01T08:00:04Z");
    }

    #[tokio::test]
    async fn profile_crud_over_http() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(store, &dir);

        let (status, created) = send_json(
            &app,
            "POST",
            "/profiles",
            json!({
                "name": "line-a",
                "mode": "tcp",
                "ipAddress": "10.0.0.2",
                "port": 502,
                "unitId": 1,
                "coilAddress": 40,
                "enableLogging": true
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap().to_string();

        let (_, listed) = get_json(&app, "/profiles").await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/profiles/{id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (_, listed) = get_json(&app, "/profiles").await;
        assert!(listed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_email_is_rejected_up_front() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(store, &dir);
        let (status, _) = send_json(
            &app,
            "POST",
            "/auth/request",
            json!({ "email": "not-an-email" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
