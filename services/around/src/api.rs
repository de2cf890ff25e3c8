use crate::auth::{bearer_token, Identity, IdentityResolver};
use crate::config::ApiConfig;
use crate::error::ServiceError;
use crate::ingest::{IngestionCoordinator, MediaUpload, NewPost};
use crate::query::QueryService;
use crate::record::{GeoPoint, Record};
use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::{
        multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit,
        FromRequestParts, Multipart, Query, State,
    },
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<IngestionCoordinator>,
    pub queries: Arc<QueryService>,
    pub identity: Arc<dyn IdentityResolver>,
}

/// Identity of the caller, resolved from the bearer credential
pub struct AuthenticatedUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ServiceError::Authentication("Missing bearer token".to_string()))?;

        state.identity.resolve(token).map(AuthenticatedUser)
    }
}

/// Query parameters for proximity search
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub range: Option<String>,
}

/// Query parameters for cluster search
#[derive(Debug, Deserialize)]
pub struct ClusterParams {
    pub term: Option<String>,
}

/// Raw multipart fields of a post submission
#[derive(Debug, Default)]
struct PostForm {
    lat: Option<String>,
    lon: Option<String>,
    message: Option<String>,
    image: Option<MediaUpload>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

        if config.cors_origins.is_empty() {
            cors.allow_origin(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/post", post(create_post).options(preflight))
        .route("/search", get(search).options(preflight))
        .route("/cluster", get(cluster).options(preflight))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "around-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.queries.ready().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "index": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "index": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Cross-origin probe; performs no work
async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Create a post from a multipart submission
#[instrument(skip_all)]
async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StatusCode, ServiceError> {
    info!(author = %user.username, "Received one post request");

    let multipart = multipart.map_err(|e| ServiceError::Validation(e.body_text()))?;
    let form = read_post_form(multipart).await?;
    let location = GeoPoint::new(
        parse_coordinate("lat", form.lat.as_deref())?,
        parse_coordinate("lon", form.lon.as_deref())?,
    );

    state
        .coordinator
        .ingest(NewPost {
            author: user.username,
            message: form.message.unwrap_or_default(),
            location,
            media: form.image,
        })
        .await?;

    Ok(StatusCode::OK)
}

/// Proximity search
#[instrument(skip(state, _user))]
async fn search(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<SearchParams>,
) -> Result<Response, ServiceError> {
    let lat = required_number("lat", params.lat.as_deref())?;
    let lon = required_number("lon", params.lon.as_deref())?;
    let range = optional_number("range", params.range.as_deref())?;

    let records = state.queries.proximity(GeoPoint::new(lat, lon), range).await?;
    encode_records(&records)
}

/// Quality cluster search
#[instrument(skip(state, _user))]
async fn cluster(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<ClusterParams>,
) -> Result<Response, ServiceError> {
    let term = params
        .term
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::Validation("term is required".to_string()))?;

    let records = state.queries.cluster(&term).await?;
    encode_records(&records)
}

/// Collect the post fields. An `image` part must carry a filename and a
/// non-empty body, otherwise the post is rejected as MediaUnavailable.
async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, ServiceError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_failure(e, ServiceError::Validation))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "lat" | "lon" | "message" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_failure(e, ServiceError::Validation))?;
                match name.as_str() {
                    "lat" => form.lat = Some(value),
                    "lon" => form.lon = Some(value),
                    _ => form.message = Some(value),
                }
            }
            "image" => {
                let filename = field
                    .file_name()
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| ServiceError::MediaUnavailable("image has no filename".to_string()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_failure(e, ServiceError::MediaUnavailable))?;
                if bytes.is_empty() {
                    return Err(ServiceError::MediaUnavailable("image is empty".to_string()));
                }
                form.image = Some(MediaUpload { filename, bytes });
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Body-limit overruns answer 413; anything else becomes `kind`
fn multipart_failure(error: MultipartError, kind: fn(String) -> ServiceError) -> ServiceError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(error.body_text())
    } else {
        kind(error.body_text())
    }
}

/// Form coordinate; absent or blank means 0
fn parse_coordinate(name: &str, raw: Option<&str>) -> Result<f64, ServiceError> {
    Ok(optional_number(name, raw)?.unwrap_or(0.0))
}

fn required_number(name: &str, raw: Option<&str>) -> Result<f64, ServiceError> {
    optional_number(name, raw)?
        .ok_or_else(|| ServiceError::Validation(format!("{name} is required")))
}

fn optional_number(name: &str, raw: Option<&str>) -> Result<Option<f64>, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ServiceError::Validation(format!("{name} must be a number, got {s:?}"))),
    }
}

fn encode_records(records: &[Record]) -> Result<Response, ServiceError> {
    let body = serde_json::to_vec(records)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Start the API server; returns once `shutdown` is cancelled
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting around API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("API server error")?;

    Ok(())
}
