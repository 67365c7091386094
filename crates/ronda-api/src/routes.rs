use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use ronda_core::remote::{validate_record, MemoryIncidentStore, RemoteError, RemoteIncidentStore};
use ronda_core::{IncidentCode, IncidentId, IncidentRecord};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, token_matches};
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: MemoryIncidentStore,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            store: MemoryIncidentStore::new(),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/incidents/by-code", get(find_by_code))
        .route("/incidents/codes", get(list_codes))
        .route("/incidents/{id}", put(upsert_incident))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    incidents: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        incidents: state.store.len().await,
    })
}

async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config.api_token.as_deref() {
        let token = extract_bearer_token(request.headers())?;
        if !token_matches(token, expected) {
            return Err(AppError::unauthorized("Bearer token is not accepted"));
        }
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct CodeQuery {
    code: String,
}

#[derive(Debug, Deserialize)]
struct YearQuery {
    year: i32,
}

async fn find_by_code(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<IncidentRecord>, AppError> {
    let code = query
        .code
        .parse::<IncidentCode>()
        .map_err(AppError::bad_request)?;
    state
        .store
        .find_by_code(&code)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no incident holds code {code}")))
}

async fn list_codes(
    State(state): State<AppState>,
    Query(query): Query<YearQuery>,
) -> Result<Json<BTreeSet<String>>, AppError> {
    let codes = state
        .store
        .list_codes_for_year(query.year)
        .await
        .map_err(store_error)?;
    Ok(Json(codes))
}

async fn upsert_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(record): Json<IncidentRecord>,
) -> Result<Json<IncidentRecord>, AppError> {
    let id = id
        .parse::<IncidentId>()
        .map_err(|_| AppError::bad_request(format!("invalid incident id '{id}'")))?;
    if record.id != id {
        return Err(AppError::unprocessable(format!(
            "path id {id} does not match record id {}",
            record.id
        )));
    }
    validate_record(&record).map_err(|error| AppError::unprocessable(error.to_string()))?;

    // Validation already passed, so a refusal here is a code conflict
    state.store.upsert(&record).await.map_err(|error| match error {
        RemoteError::Rejected(message) => {
            tracing::info!(
                endpoint = "upsert",
                incident = %record.id,
                code = %record.code,
                "Refused conflicting write"
            );
            AppError::Conflict(message)
        }
        RemoteError::Transient(message) => AppError::bad_request(message),
    })?;

    tracing::info!(
        endpoint = "upsert",
        incident = %record.id,
        code = %record.code,
        is_edit = record.is_edit,
        "Stored incident"
    );
    Ok(Json(record))
}

fn store_error(error: RemoteError) -> AppError {
    AppError::bad_request(error.to_string())
}
