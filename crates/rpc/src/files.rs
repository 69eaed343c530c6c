//! Upload, download, record and access-grant endpoints.

use axum::extract::{Multipart, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cvault_files::{guess_mime_type, AccessGrant, Digest, Locator, Payload, RegistrationRecord};
use cvault_gateway::ObjectStore;
use cvault_pipeline::{submit, Conflict, Receipt, SubmitOutcome, VaultContext};
use cvault_registry::{Confirmation, Registry, VaultRegistry};
use cvault_storage::{NewUpload, UploadEntry};
use cvault_types::OwnerId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::server::{ApiError, SharedState};

const DEFAULT_CATEGORY: &str = "desconhecido";

/// Outcome of copying an upload to the remote gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorStatus {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub receipt: Receipt,
    pub mirror: MirrorStatus,
    pub upload: UploadEntry,
}

#[derive(Debug, Serialize)]
struct ConflictResponse {
    error: &'static str,
    message: String,
    conflict: Conflict,
}

struct UploadForm {
    payload: Payload,
    category: String,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let multipart_error =
        |e: axum::extract::multipart::MultipartError| ApiError::new(e.status(), "invalid_multipart", e.body_text());

    let mut payload = None;
    let mut category = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;

                let mut file = Payload::new(bytes.to_vec());
                file.mime_type = content_type
                    .filter(|mime| mime != "application/octet-stream")
                    .or_else(|| {
                        file_name
                            .as_deref()
                            .and_then(guess_mime_type)
                            .map(str::to_string)
                    });
                file.file_name = file_name;
                payload = Some(file);
            }
            Some("category") => {
                let text = field.text().await.map_err(multipart_error)?;
                category = Some(text.trim().to_string()).filter(|c| !c.is_empty());
            }
            _ => {}
        }
    }

    Ok(UploadForm {
        payload: payload.ok_or_else(|| ApiError::bad_request("missing file field"))?,
        category: category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
    })
}

async fn mirror_upload(mirror: Option<&dyn ObjectStore>, payload: &Payload) -> MirrorStatus {
    let Some(store) = mirror else {
        return MirrorStatus {
            ok: false,
            store: None,
            locator: None,
            error: Some("no remote gateway configured".into()),
        };
    };
    match store.put(payload).await {
        Ok(locator) => MirrorStatus {
            ok: true,
            store: Some(store.name().to_string()),
            locator: Some(locator.to_string()),
            error: None,
        },
        Err(e) => {
            warn!(store = store.name(), error = %e, "mirror upload failed, keeping local copy only");
            MirrorStatus {
                ok: false,
                store: Some(store.name().to_string()),
                locator: None,
                error: Some(e.to_string()),
            }
        }
    }
}

pub(crate) async fn handle_upload(
    State(state): State<SharedState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let UploadForm { payload, category } = read_upload_form(multipart).await?;

    let ctx = VaultContext::new(user.owner(), state.registry.clone(), state.local_store.clone())
        .with_hasher(state.hasher)
        .with_policy(state.upload_policy.clone());

    let receipt = match submit(&ctx, payload.clone()).await? {
        SubmitOutcome::Registered(receipt) => receipt,
        SubmitOutcome::Conflict(conflict) => {
            warn!(owner = %user.owner(), %conflict, "upload rejected as duplicate");
            let body = ConflictResponse {
                error: "conflict",
                message: conflict.to_string(),
                conflict,
            };
            return Ok((StatusCode::CONFLICT, Json(body)).into_response());
        }
    };

    let mirror = mirror_upload(state.mirror.as_deref(), &payload).await;
    let upload = state.storage.append_upload(NewUpload {
        user_id: user.claims.sub,
        file_name: payload.file_name.clone().unwrap_or_else(|| "file.bin".into()),
        size_bytes: payload.len() as u64,
        digest: receipt.digest,
        category,
        local_locator: Some(receipt.locator.to_string()),
        gateway_locator: mirror.locator.clone(),
        gateway_ok: mirror.ok,
        uploaded_at: state.now(),
    })?;

    info!(upload_id = upload.id, %receipt, mirrored = mirror.ok, "upload registered");
    Ok(Json(UploadResponse {
        receipt,
        mirror,
        upload,
    })
    .into_response())
}

pub(crate) async fn handle_list_uploads(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<Json<Vec<UploadEntry>>, ApiError> {
    Ok(Json(state.storage.list_uploads(user.claims.sub)?))
}

pub(crate) async fn handle_download(
    State(state): State<SharedState>,
    Path(locator): Path<String>,
) -> Result<Response, ApiError> {
    let locator = Locator::new(locator).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let bytes = state.local_store.get(&locator).await?;
    let content_type = guess_mime_type(locator.as_str()).unwrap_or("application/octet-stream");
    Ok(([(CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Record bytes for the owner or an active grantee.
pub(crate) async fn handle_record_content(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(digest): Path<String>,
) -> Result<Response, ApiError> {
    let digest = parse_digest(&digest)?;
    let caller = user.owner();
    if !state.registry.has_access(&digest, &caller).await? {
        return Err(ApiError::forbidden(format!(
            "{caller} has no access to {}",
            digest.short()
        )));
    }
    let record = state
        .registry
        .get(&digest)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no record for {digest}")))?;
    let bytes = state.local_store.get(&record.locator).await?;
    let content_type = record
        .mime_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(CONTENT_TYPE, content_type)], bytes).into_response())
}

fn parse_digest(raw: &str) -> Result<Digest, ApiError> {
    raw.parse()
        .map_err(|e: cvault_files::DigestError| ApiError::bad_request(e.to_string()))
}

fn parse_owner(raw: &str) -> Result<OwnerId, ApiError> {
    raw.parse()
        .map_err(|e: cvault_types::OwnerError| ApiError::bad_request(e.to_string()))
}

pub(crate) async fn handle_list_records(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<Json<Vec<RegistrationRecord>>, ApiError> {
    Ok(Json(state.registry.list_by_owner(&user.owner()).await?))
}

pub(crate) async fn handle_get_record(
    State(state): State<SharedState>,
    Path(digest): Path<String>,
) -> Result<Json<RegistrationRecord>, ApiError> {
    let digest = parse_digest(&digest)?;
    state
        .registry
        .get(&digest)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no record for {digest}")))
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub digest: Digest,
    pub confirmation: Confirmation,
}

pub(crate) async fn handle_remove_record(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(digest): Path<String>,
) -> Result<Json<ConfirmationResponse>, ApiError> {
    let digest = parse_digest(&digest)?;
    let confirmation = state.registry.remove(&user.owner(), &digest).await?;
    Ok(Json(ConfirmationResponse {
        digest,
        confirmation,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to: String,
}

pub(crate) async fn handle_transfer(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(digest): Path<String>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<ConfirmationResponse>, ApiError> {
    let digest = parse_digest(&digest)?;
    let to = parse_owner(&request.to)?;
    let confirmation = state.registry.transfer(&user.owner(), &digest, &to).await?;
    Ok(Json(ConfirmationResponse {
        digest,
        confirmation,
    }))
}

pub(crate) async fn handle_list_grants(
    State(state): State<SharedState>,
    Path(digest): Path<String>,
) -> Result<Json<Vec<AccessGrant>>, ApiError> {
    let digest = parse_digest(&digest)?;
    Ok(Json(state.registry.list_grants(&digest).await?))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub grantee: String,
    pub hours: u64,
}

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub digest: Digest,
    pub grantee: OwnerId,
    pub expires_at: u64,
    pub confirmation: Confirmation,
}

pub(crate) async fn handle_grant_access(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(digest): Path<String>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError> {
    let digest = parse_digest(&digest)?;
    let grantee = parse_owner(&request.grantee)?;
    let expires_at = state.grant_policy.expiration(state.now(), request.hours)?;
    let confirmation = state
        .registry
        .grant_access(&user.owner(), &digest, &grantee, expires_at)
        .await?;
    Ok(Json(GrantResponse {
        digest,
        grantee,
        expires_at,
        confirmation,
    }))
}

pub(crate) async fn handle_revoke_access(
    State(state): State<SharedState>,
    user: AuthUser,
    Path((digest, grantee)): Path<(String, String)>,
) -> Result<Json<ConfirmationResponse>, ApiError> {
    let digest = parse_digest(&digest)?;
    let grantee = parse_owner(&grantee)?;
    let confirmation = state
        .registry
        .revoke_access(&user.owner(), &digest, &grantee)
        .await?;
    Ok(Json(ConfirmationResponse {
        digest,
        confirmation,
    }))
}
