use axum::extract::{Path, State};
use axum::Json;
use cvault_pipeline::{decode_token_uri, PetMetadata};
use cvault_registry::Confirmation;
use cvault_storage::{MemberRole, PetToken};
use cvault_types::OwnerId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::server::{ApiError, SharedState};

#[derive(Debug, Serialize)]
pub struct PetView {
    pub token_id: u64,
    pub owner: OwnerId,
    pub token_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<OwnerId>,
    pub minted_at: u64,
    /// Present when the metadata is embedded in the token URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PetMetadata>,
}

impl From<PetToken> for PetView {
    fn from(pet: PetToken) -> Self {
        Self {
            metadata: decode_token_uri(&pet.token_uri),
            token_id: pet.token_id,
            owner: pet.owner,
            token_uri: pet.token_uri,
            requester: pet.requester,
            minted_at: pet.minted_at,
        }
    }
}

pub(crate) async fn handle_list_pets(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PetView>>, ApiError> {
    let pets = state.adoption.list_pets()?;
    Ok(Json(pets.into_iter().map(PetView::from).collect()))
}

pub(crate) async fn handle_get_pet(
    State(state): State<SharedState>,
    Path(token_id): Path<u64>,
) -> Result<Json<PetView>, ApiError> {
    Ok(Json(state.adoption.pet(token_id)?.into()))
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub role: MemberRole,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub member: OwnerId,
    pub role: MemberRole,
    pub confirmation: Confirmation,
}

/// Join the adoption registry as donor or adopter. Re-joining switches role.
pub(crate) async fn handle_register_member(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(request): Json<MemberRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let member = user.owner();
    let confirmation = state.adoption.register_member(&member, request.role)?;
    Ok(Json(MemberResponse {
        member,
        role: request.role,
        confirmation,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdoptionStep {
    Request,
    Approve,
    Reject,
}

#[derive(Debug, Serialize)]
pub struct AdoptionResponse {
    pub pet: PetView,
    pub confirmation: Confirmation,
}

async fn adoption_step(
    state: SharedState,
    user: AuthUser,
    token_id: u64,
    step: AdoptionStep,
) -> Result<Json<AdoptionResponse>, ApiError> {
    let caller = user.owner();
    let confirmation = match step {
        AdoptionStep::Request => state.adoption.request_adoption(&caller, token_id)?,
        AdoptionStep::Approve => state.adoption.approve_adoption(&caller, token_id)?,
        AdoptionStep::Reject => state.adoption.reject_adoption(&caller, token_id)?,
    };
    info!(token_id, caller = %caller, ?step, "adoption step applied");

    let pet = state.adoption.pet(token_id)?;
    Ok(Json(AdoptionResponse {
        pet: pet.into(),
        confirmation,
    }))
}

pub(crate) async fn handle_request_adoption(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(token_id): Path<u64>,
) -> Result<Json<AdoptionResponse>, ApiError> {
    adoption_step(state, user, token_id, AdoptionStep::Request).await
}

pub(crate) async fn handle_approve_adoption(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(token_id): Path<u64>,
) -> Result<Json<AdoptionResponse>, ApiError> {
    adoption_step(state, user, token_id, AdoptionStep::Approve).await
}

pub(crate) async fn handle_reject_adoption(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(token_id): Path<u64>,
) -> Result<Json<AdoptionResponse>, ApiError> {
    adoption_step(state, user, token_id, AdoptionStep::Reject).await
}
