use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use cvault_crypto::SessionSigner;
use cvault_files::{ContentHasher, PolicyError, UploadPolicy};
use cvault_gateway::{GatewayError, LocalDirStore, ObjectStore};
use cvault_pipeline::SubmitError;
use cvault_registry::{AdoptionRegistry, GrantPolicy, LedgerRegistry, RegistryError};
use cvault_storage::Storage;
use cvault_types::{Clock, SystemClock};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{auth, files, pets};

/// 100 MiB of file plus 1 MiB for the multipart envelope.
pub const DEFAULT_MAX_BODY_BYTES: usize = 101 * 1024 * 1024;

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub registry: Arc<LedgerRegistry>,
    pub adoption: Arc<AdoptionRegistry>,
    /// Primary copy of uploaded bytes; its locators are what records point to.
    pub local_store: Arc<LocalDirStore>,
    /// Remote gateway that receives a best-effort copy of each upload.
    pub mirror: Option<Arc<dyn ObjectStore>>,
    pub sessions: SessionSigner,
    pub clock: Arc<dyn Clock>,
    pub hasher: ContentHasher,
    pub upload_policy: UploadPolicy,
    pub grant_policy: GrantPolicy,
    pub max_body_bytes: usize,
    pub start_time: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        local_store: LocalDirStore,
        sessions: SessionSigner,
    ) -> Self {
        Self::with_clock(storage, local_store, sessions, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<dyn Storage>,
        local_store: LocalDirStore,
        sessions: SessionSigner,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: Arc::new(LedgerRegistry::with_clock(storage.clone(), clock.clone())),
            adoption: Arc::new(AdoptionRegistry::with_clock(storage.clone(), clock.clone())),
            storage,
            local_store: Arc::new(local_store),
            mirror: None,
            sessions,
            clock,
            hasher: ContentHasher::default(),
            upload_policy: UploadPolicy::medical(),
            grant_policy: GrantPolicy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            start_time: Instant::now(),
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn ObjectStore>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "gateway_error", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
    }

    /// Logs the cause and hides it from the client.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "internal error while handling request");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.code,
            message: self.message,
        });
        (self.status, payload).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyExists { .. } => Self::conflict(err.to_string()),
            RegistryError::NotFound { .. } | RegistryError::TokenNotFound { .. } => {
                Self::not_found(err.to_string())
            }
            RegistryError::NotOwner { .. } | RegistryError::RoleRequired { .. } => {
                Self::forbidden(err.to_string())
            }
            RegistryError::InvalidExpiration { .. }
            | RegistryError::NoExistingAccess { .. }
            | RegistryError::CannotTransferToSelf
            | RegistryError::CannotGrantToOwner
            | RegistryError::InvalidInput(_)
            | RegistryError::OwnerCannotAdopt
            | RegistryError::RequestPending { .. }
            | RegistryError::NoPendingRequest { .. } => Self::bad_request(err.to_string()),
            RegistryError::Unavailable(_) => Self::service_unavailable(err.to_string()),
            RegistryError::Storage(cause) => Self::internal(cause),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(_) => Self::not_found(err.to_string()),
            GatewayError::InvalidLocator(_) => Self::bad_request(err.to_string()),
            GatewayError::Io(cause) => Self::internal(cause),
            other => Self::bad_gateway(other.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Rejected(policy) => {
                let status = match &policy {
                    PolicyError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    PolicyError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    PolicyError::Empty => StatusCode::BAD_REQUEST,
                };
                Self::new(status, "rejected", policy.to_string())
            }
            SubmitError::LocalIo(cause) => Self::internal(cause),
            SubmitError::Transfer(gateway) => gateway.into(),
            SubmitError::Registry(registry) => registry.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let listener = bind_listener(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("HTTP API listening on {local_addr}");

    let app = build_router(Arc::new(state));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

pub fn build_router(state: SharedState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/health", get(handle_health))
        .route("/auth/register", post(auth::handle_register))
        .route("/auth/login", post(auth::handle_login))
        .route("/upload", post(files::handle_upload))
        .route("/uploads", get(files::handle_list_uploads))
        .route("/download/:locator", get(files::handle_download))
        .route("/files", get(files::handle_list_records))
        .route(
            "/files/:digest",
            get(files::handle_get_record).delete(files::handle_remove_record),
        )
        .route("/files/:digest/transfer", post(files::handle_transfer))
        .route(
            "/files/:digest/access",
            get(files::handle_list_grants).post(files::handle_grant_access),
        )
        .route(
            "/files/:digest/access/:grantee",
            delete(files::handle_revoke_access),
        )
        .route("/files/:digest/content", get(files::handle_record_content))
        .route("/pets", get(pets::handle_list_pets))
        .route("/pets/members", post(pets::handle_register_member))
        .route("/pets/:token_id", get(pets::handle_get_pet))
        .route("/pets/:token_id/request", post(pets::handle_request_adoption))
        .route("/pets/:token_id/approve", post(pets::handle_approve_adoption))
        .route("/pets/:token_id/reject", post(pets::handle_reject_adoption))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    records: u64,
}

async fn handle_health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let records = state.registry.record_count()?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        records,
    }))
}
