//! Control surface: the HTTP face of the system.
//!
//! Serves the embedded single-page UI and a JSON API for state reads, profile
//! edits, toggle rebinding, manual arm/disarm, and the persisted profile
//! collection. All profile edits funnel through the shared write lock, so the
//! control loop can never observe a half-applied edit; arm/disarm requests go
//! over the engine's command channel so the loop stays the only writer of its
//! own runtime state.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::info;

use crate::control::{EngineCommand, SharedState};
use crate::device::MouseTransport;
use crate::profile::{Profile, ProfileStore, ProfileUpdate, StoreError, ToggleButton, ValidationError};

/// Shared between every request handler and the rest of the application.
#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,
    pub store: Arc<Mutex<ProfileStore>>,
    pub transport: Arc<dyn MouseTransport>,
    pub engine_commands: mpsc::Sender<EngineCommand>,
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("control loop unavailable")]
    EngineUnavailable,
}

impl IntoResponse for SurfaceError {
    fn into_response(self) -> Response {
        let status = match &self {
            SurfaceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SurfaceError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            SurfaceError::Store(StoreError::InvalidName(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            SurfaceError::Store(StoreError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            SurfaceError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    armed: bool,
    firing: bool,
    device_connected: bool,
    profile: Profile,
}

#[derive(Debug, Serialize)]
struct ArmedResponse {
    armed: bool,
}

#[derive(Debug, Deserialize)]
struct ToggleButtonBody {
    toggle_button: ToggleButton,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ui))
        .route("/api/status", get(status))
        .route("/api/profile", get(get_profile).put(put_profile))
        .route("/api/toggle-button", put(put_toggle_button))
        .route("/api/toggle", post(toggle_armed))
        .route("/api/profiles", get(list_profiles))
        .route("/api/profiles/{name}", post(save_profile).delete(delete_profile))
        .route("/api/profiles/{name}/load", post(load_profile))
        .with_state(state)
}

async fn ui() -> Html<&'static str> {
    Html(include_str!("ui.html"))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let profile = state.shared.profile.read().await.clone();
    Json(StatusResponse {
        armed: state.shared.armed(),
        firing: state.shared.firing(),
        device_connected: state.transport.connected(),
        profile,
    })
}

async fn get_profile(State(state): State<AppState>) -> Json<Profile> {
    Json(state.shared.profile.read().await.clone())
}

/// Partial edit of the active profile. Validation happens against the merged
/// result before the lock content changes, so a rejected edit leaves the
/// previous profile fully intact.
async fn put_profile(
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, SurfaceError> {
    let mut guard = state.shared.profile.write().await;
    let next = guard.with_update(&update)?;
    *guard = next.clone();
    Ok(Json(next))
}

async fn put_toggle_button(
    State(state): State<AppState>,
    Json(body): Json<ToggleButtonBody>,
) -> Json<Profile> {
    let mut guard = state.shared.profile.write().await;
    guard.toggle_button = body.toggle_button;
    info!("Toggle button rebound to {:?}", body.toggle_button);
    Json(guard.clone())
}

async fn toggle_armed(
    State(state): State<AppState>,
) -> Result<Json<ArmedResponse>, SurfaceError> {
    let (response_tx, response_rx) = oneshot::channel();
    state
        .engine_commands
        .send(EngineCommand::ToggleArmed { response_tx })
        .await
        .map_err(|_| SurfaceError::EngineUnavailable)?;
    let armed = response_rx
        .await
        .map_err(|_| SurfaceError::EngineUnavailable)?;
    Ok(Json(ArmedResponse { armed }))
}

async fn list_profiles(State(state): State<AppState>) -> Json<Vec<String>> {
    let mut names = state.store.lock().await.list_names();
    names.sort();
    Json(names)
}

/// Saves the active profile under `name`, overwriting any existing entry.
async fn save_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<String>>, SurfaceError> {
    let profile = state.shared.profile.read().await.clone();
    let mut store = state.store.lock().await;
    store.save(&name, profile)?;
    let mut names = store.list_names();
    names.sort();
    Ok(Json(names))
}

/// Loads a stored profile into the active slot and returns it. Entries are
/// validated on the way in, so a hand-edited document cannot smuggle
/// out-of-range values into the loop.
async fn load_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Profile>, SurfaceError> {
    let profile = state.store.lock().await.load(&name)?;
    profile.validate()?;
    *state.shared.profile.write().await = profile.clone();
    info!("Activated gun profile '{}'", name);
    Ok(Json(profile))
}

async fn delete_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<String>>, SurfaceError> {
    let mut store = state.store.lock().await;
    store.delete(&name)?;
    let mut names = store.list_names();
    names.sort();
    Ok(Json(names))
}
