//! Pet token publishing: pin the image and the ERC-721 style metadata,
//! then mint a token pointing at it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cvault_files::Payload;
use cvault_gateway::ObjectStore;
use cvault_registry::{AdoptionRegistry, Confirmation, RegistryError};
use cvault_storage::Storage;
use cvault_types::{format_unix_secs, unix_now_secs, OwnerId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const PLACEHOLDER_IMAGE: &str =
    "https://via.placeholder.com/400x400/4caf50/ffffff?text=Pet+Sem+Imagem";

const DATA_URI_PREFIX: &str = "data:application/json;base64,";
const NOT_INFORMED: &str = "Não informada";

/// What a donor fills in when listing a pet.
#[derive(Debug, Clone, Default)]
pub struct PetProfile {
    pub name: String,
    pub description: String,
    pub species: String,
    pub breed: Option<String>,
    pub age: Option<String>,
    pub size: String,
    pub gender: String,
    pub health: String,
    pub temperament: String,
    pub location: Option<String>,
    /// Photo to pin alongside the metadata.
    pub image: Option<Payload>,
    /// Already-hosted photo, used when no image is pinned.
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetAttribute {
    pub trait_type: String,
    pub value: String,
}

/// Token metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub attributes: Vec<PetAttribute>,
    /// RFC 3339.
    pub created_at: String,
}

impl PetMetadata {
    pub fn attribute(&self, trait_type: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.trait_type == trait_type)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PublishedPet {
    pub token_id: u64,
    pub token_uri: String,
    pub metadata: PetMetadata,
    /// False when the token URI is the inline data-URI fallback.
    pub pinned: bool,
    pub confirmation: Confirmation,
}

fn attribute(trait_type: &str, value: impl Into<String>) -> PetAttribute {
    PetAttribute {
        trait_type: trait_type.to_string(),
        value: value.into(),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn location_of(store: &dyn ObjectStore, locator: &cvault_files::Locator) -> String {
    store
        .public_url(locator)
        .unwrap_or_else(|| locator.to_string())
}

/// Pin the photo if one is attached. Falls back to the profile's URL and
/// then to the placeholder.
async fn resolve_image(store: &dyn ObjectStore, profile: &PetProfile) -> String {
    if let Some(image) = &profile.image {
        match store.put(image).await {
            Ok(locator) => return location_of(store, &locator),
            Err(e) => warn!(store = store.name(), error = %e, "pet image upload failed"),
        }
    }
    non_empty(&profile.image_url).unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
}

pub async fn build_metadata(
    store: &dyn ObjectStore,
    profile: &PetProfile,
    created_at: u64,
) -> PetMetadata {
    PetMetadata {
        name: profile.name.clone(),
        description: profile.description.clone(),
        image: resolve_image(store, profile).await,
        attributes: vec![
            attribute("Espécie", profile.species.clone()),
            attribute("Raça", non_empty(&profile.breed).unwrap_or_else(|| "SRD".into())),
            attribute("Idade", non_empty(&profile.age).unwrap_or_else(|| NOT_INFORMED.into())),
            attribute("Porte", profile.size.clone()),
            attribute("Gênero", profile.gender.clone()),
            attribute("Saúde", profile.health.clone()),
            attribute("Temperamento", profile.temperament.clone()),
            attribute(
                "Localização",
                non_empty(&profile.location).unwrap_or_else(|| NOT_INFORMED.into()),
            ),
        ],
        created_at: format_unix_secs(created_at),
    }
}

pub fn encode_data_uri(metadata: &PetMetadata) -> String {
    // Serialising a struct of strings cannot fail.
    let json = serde_json::to_vec(metadata).unwrap_or_default();
    format!("{DATA_URI_PREFIX}{}", STANDARD.encode(json))
}

/// Metadata embedded in a `data:application/json;base64,` token URI.
/// Returns `None` for any other URI form.
pub fn decode_token_uri(uri: &str) -> Option<PetMetadata> {
    let encoded = uri.trim().strip_prefix(DATA_URI_PREFIX)?;
    let json = STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&json).ok()
}

/// Build metadata, pin it, and mint a token for `caller`. When pinning the
/// metadata fails the token URI carries the document inline.
pub async fn publish_pet<S: Storage + ?Sized>(
    store: &dyn ObjectStore,
    registry: &AdoptionRegistry<S>,
    caller: &OwnerId,
    profile: &PetProfile,
) -> Result<PublishedPet, RegistryError> {
    if profile.name.trim().is_empty() {
        return Err(RegistryError::InvalidInput("pet name is required".into()));
    }

    let metadata = build_metadata(store, profile, unix_now_secs()).await;
    let value = serde_json::to_value(&metadata)
        .map_err(|e| RegistryError::InvalidInput(e.to_string()))?;

    let (token_uri, pinned) = match store.put_json(&value).await {
        Ok(locator) => (location_of(store, &locator), true),
        Err(e) => {
            warn!(store = store.name(), error = %e, "metadata pin failed, embedding as data URI");
            (encode_data_uri(&metadata), false)
        }
    };

    let (token_id, confirmation) = registry.mint_pet(caller, caller, &token_uri)?;
    info!(token_id, pinned, name = %metadata.name, "pet published");
    Ok(PublishedPet {
        token_id,
        token_uri,
        metadata,
        pinned,
        confirmation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PetMetadata {
        PetMetadata {
            name: "Rex".into(),
            description: "Dócil".into(),
            image: PLACEHOLDER_IMAGE.into(),
            attributes: vec![attribute("Espécie", "Cão")],
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn data_uri_decodes_back() {
        let uri = encode_data_uri(&sample());
        assert!(uri.starts_with("data:application/json;base64,"));
        assert_eq!(decode_token_uri(&uri), Some(sample()));
    }

    #[test]
    fn other_uris_do_not_decode() {
        assert_eq!(decode_token_uri("https://gateway.pinata.cloud/ipfs/bafy"), None);
        assert_eq!(decode_token_uri("data:application/json;base64,!!!"), None);
    }
}
