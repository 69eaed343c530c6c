//! Account registration, login and the bearer-token extractor.

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use cvault_crypto::{PasswordHasher, SessionClaims};
use cvault_storage::{NewUser, UserAccount};
use cvault_types::OwnerId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::server::{ApiError, SharedState};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const DEFAULT_ROLE: &str = "aluno";

/// Caller authenticated by a `Bearer` session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: SessionClaims,
}

impl AuthUser {
    pub fn owner(&self) -> OwnerId {
        OwnerId::Account(self.claims.sub)
    }
}

#[async_trait]
impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

        let claims = state.sessions.verify(token, state.now()).map_err(|e| {
            debug!(error = %e, "rejected session token");
            ApiError::unauthorized("invalid or expired token")
        })?;
        Ok(Self { claims })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, alias = "matricula")]
    pub enrollment: String,
    #[serde(default)]
    pub course: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Account as returned to clients; never includes the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: u64,
    pub email: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub enrollment: String,
    pub course: String,
}

impl From<&UserAccount> for UserView {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            role: account.role.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            enrollment: account.enrollment.clone(),
            course: account.course.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

fn issue(state: &SharedState, account: &UserAccount) -> AuthResponse {
    AuthResponse {
        token: state
            .sessions
            .issue(account.id, &account.email, &account.role, state.now()),
        user: UserView::from(account),
    }
}

pub(crate) async fn handle_register(
    State(state): State<SharedState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let required = [
        &request.email,
        &request.password,
        &request.first_name,
        &request.last_name,
        &request.enrollment,
        &request.course,
    ];
    if required.iter().any(|field| field.trim().is_empty()) {
        return Err(ApiError::bad_request("all fields are required"));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password = request.password;
    let password_hash =
        tokio::task::spawn_blocking(move || PasswordHasher::hash_password(password.as_bytes()))
            .await
            .map_err(ApiError::internal)??;

    let created = state.storage.create_user(NewUser {
        email: request.email,
        password_hash,
        first_name: request.first_name,
        last_name: request.last_name,
        enrollment: request.enrollment,
        course: request.course,
        role: DEFAULT_ROLE.to_string(),
    })?;
    let account =
        created.ok_or_else(|| ApiError::bad_request("e-mail or enrollment already registered"))?;

    info!(user_id = account.id, "account registered");
    Ok((StatusCode::CREATED, Json(issue(&state, &account))))
}

pub(crate) async fn handle_login(
    State(state): State<SharedState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("e-mail and password are required"));
    }

    let invalid = || ApiError::unauthorized("invalid credentials");
    let account = state
        .storage
        .get_user_by_email(&request.email)?
        .ok_or_else(invalid)?;

    let hash = account.password_hash.clone();
    let password = request.password;
    let ok = tokio::task::spawn_blocking(move || {
        PasswordHasher::verify_password(password.as_bytes(), &hash)
    })
    .await
    .map_err(ApiError::internal)??;
    if !ok {
        return Err(invalid());
    }

    debug!(user_id = account.id, "login");
    Ok(Json(issue(&state, &account)))
}
