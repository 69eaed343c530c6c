use async_trait::async_trait;
use cvault_files::{Locator, Payload};
use cvault_gateway::{GatewayError, MemoryObjectStore, ObjectStore};
use cvault_pipeline::{decode_token_uri, publish_pet, PetProfile, PLACEHOLDER_IMAGE};
use cvault_registry::{AdoptionRegistry, RegistryError};
use cvault_storage::{MemberRole, MemoryStorage};
use cvault_types::OwnerId;
use std::sync::Arc;

/// Store whose binary uploads and JSON pins can fail independently.
struct PartialStore {
    inner: MemoryObjectStore,
    files_fail: bool,
    json_fails: bool,
}

#[async_trait]
impl ObjectStore for PartialStore {
    fn name(&self) -> &str {
        "partial"
    }

    async fn put(&self, payload: &Payload) -> Result<Locator, GatewayError> {
        let is_json = payload.mime_type.as_deref() == Some("application/json");
        if (is_json && self.json_fails) || (!is_json && self.files_fail) {
            return Err(GatewayError::Status {
                status: 500,
                body: "pinning failed".into(),
            });
        }
        self.inner.put(payload).await
    }

    async fn get(&self, locator: &Locator) -> Result<Vec<u8>, GatewayError> {
        self.inner.get(locator).await
    }

    async fn delete(&self, locator: &Locator) -> Result<(), GatewayError> {
        self.inner.delete(locator).await
    }
}

fn donor() -> OwnerId {
    "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".parse().unwrap()
}

fn registry() -> AdoptionRegistry<MemoryStorage> {
    let registry = AdoptionRegistry::new(Arc::new(MemoryStorage::new()));
    registry.register_member(&donor(), MemberRole::Donor).unwrap();
    registry
}

fn profile() -> PetProfile {
    PetProfile {
        name: "Rex".into(),
        description: "Brincalhão".into(),
        species: "Cão".into(),
        size: "Médio".into(),
        gender: "Macho".into(),
        health: "Vacinado".into(),
        temperament: "Dócil".into(),
        image: Some(Payload::new(b"png".to_vec()).with_file_name("rex.png")),
        ..PetProfile::default()
    }
}

#[tokio::test]
async fn pinned_metadata_is_minted() {
    let store = MemoryObjectStore::new();
    let registry = registry();

    let published = publish_pet(&store, &registry, &donor(), &profile())
        .await
        .unwrap();
    assert!(published.pinned);
    assert_eq!(published.token_id, 1);
    assert!(published.metadata.image.starts_with("mem-"));
    assert_eq!(published.metadata.attribute("Raça"), Some("SRD"));
    assert_eq!(published.metadata.attribute("Localização"), Some("Não informada"));
    assert_eq!(registry.token_uri(1).unwrap(), published.token_uri);
    assert_eq!(registry.owner_of(1).unwrap(), donor());

    let stored = store
        .get(&Locator::new(published.token_uri.clone()).unwrap())
        .await
        .unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&stored).unwrap();
    assert_eq!(doc["name"], "Rex");
    assert_eq!(doc["attributes"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn failed_pins_fall_back() {
    let store = PartialStore {
        inner: MemoryObjectStore::new(),
        files_fail: true,
        json_fails: true,
    };
    let registry = registry();

    let published = publish_pet(&store, &registry, &donor(), &profile())
        .await
        .unwrap();
    assert!(!published.pinned);
    assert_eq!(published.metadata.image, PLACEHOLDER_IMAGE);
    assert!(published.token_uri.starts_with("data:application/json;base64,"));
    assert_eq!(
        decode_token_uri(&registry.token_uri(1).unwrap()),
        Some(published.metadata)
    );
}

#[tokio::test]
async fn hosted_image_url_used_when_upload_fails() {
    let store = PartialStore {
        inner: MemoryObjectStore::new(),
        files_fail: true,
        json_fails: false,
    };
    let mut profile = profile();
    profile.image_url = Some("https://example.org/rex.jpg".into());

    let published = publish_pet(&store, &registry(), &donor(), &profile)
        .await
        .unwrap();
    assert!(published.pinned);
    assert_eq!(published.metadata.image, "https://example.org/rex.jpg");
}

#[tokio::test]
async fn only_donors_publish() {
    let store = MemoryObjectStore::new();
    let registry = registry();
    let stranger = OwnerId::Account(77);
    assert!(matches!(
        publish_pet(&store, &registry, &stranger, &profile()).await,
        Err(RegistryError::RoleRequired { .. })
    ));

    let mut nameless = profile();
    nameless.name = "  ".into();
    assert!(matches!(
        publish_pet(&store, &registry, &donor(), &nameless).await,
        Err(RegistryError::InvalidInput(_))
    ));
}
