/**
 * API REST DISKWATCH - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose les vues d'indicateurs (création, binding current/selected, rendu),
 * les préférences utilisateur et une entrée d'ingest HTTP équivalente au MQTT.
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health
 * - Clé absente de la config et de l'env => accès refusé
 */

use crate::feed::{FeedRegistry, PublishReport};
use crate::health::{HealthTracker, KernelHealth};
use crate::models::ResourceId;
use crate::mqtt::ingest_usage;
use crate::preferences::{Preferences, PreferencesStore};
use crate::views::{ViewRegistry, ViewSnapshot};
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub feed: FeedRegistry,
    pub views: ViewRegistry,
    pub prefs: Arc<PreferencesStore>,
    pub health: HealthTracker,
    pub api_key: Option<String>,
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.api_key.as_deref() else {
        warn!("SECURITY: no API key configured - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
struct BindRequest {
    node_id: Option<String>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/views", get(list_views))
        .route("/views/{name}", get(get_view).put(create_view).delete(delete_view))
        .route("/views/{name}/current", put(bind_current))
        .route("/views/{name}/selected", put(bind_selected))
        .route("/preferences", get(get_preferences).put(update_preferences))
        .route("/usage", post(post_usage))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(&app.feed, &app.views))
}

// GET /views
async fn list_views(State(app): State<AppState>) -> Json<Vec<ViewSnapshot>> {
    Json(app.views.list())
}

// GET /views/{name}
async fn get_view(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ViewSnapshot>, StatusCode> {
    app.views.get(&name).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// PUT /views/{name} (idempotent)
async fn create_view(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<ViewSnapshot>), StatusCode> {
    let created = app.views.ensure_view(&name);
    let view = app.views.get(&name).ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    let code = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((code, Json(view)))
}

// DELETE /views/{name}
async fn delete_view(State(app): State<AppState>, Path(name): Path<String>) -> StatusCode {
    if app.views.remove_view(&name) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// PUT /views/{name}/current
async fn bind_current(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BindRequest>,
) -> Result<Json<ViewSnapshot>, StatusCode> {
    app.views
        .set_current(&name, req.node_id.map(ResourceId::from))
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

// PUT /views/{name}/selected
async fn bind_selected(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<BindRequest>,
) -> Result<Json<ViewSnapshot>, StatusCode> {
    app.views
        .set_selected(&name, req.node_id.map(ResourceId::from))
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

// GET /preferences
async fn get_preferences(State(app): State<AppState>) -> Json<Preferences> {
    Json(app.prefs.get())
}

// PUT /preferences
async fn update_preferences(
    State(app): State<AppState>,
    Json(prefs): Json<Preferences>,
) -> Result<Json<Preferences>, (StatusCode, String)> {
    app.prefs
        .set_low_disk_space_threshold(prefs.low_disk_space_threshold_gb)
        .await
        .map(Json)
        .map_err(|e| match e {
            crate::error::PreferencesError::InvalidThreshold(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        })
}

// POST /usage (même chemin que l'ingest MQTT)
async fn post_usage(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    match ingest_usage(&body, &app.feed, &app.health) {
        Ok(PublishReport { delivered, failed }) => Ok(Json(serde_json::json!({
            "delivered": delivered,
            "failed": failed,
        }))),
        Err(e) => Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string())),
    }
}
