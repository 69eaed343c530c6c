//! The submission steps and their composition.

use crate::context::VaultContext;
use crate::error::SubmitError;
use crate::outcome::{present, Conflict, DuplicateCheck, SubmitOutcome};
use crate::stage::{Stage, StageObserver};
use cvault_files::{guess_mime_type, ContentHasher, Digest, Locator, Payload};
use cvault_gateway::{GatewayError, ObjectStore};
use cvault_registry::{Confirmation, RegistrationRequest, Registry, RegistryError};
use std::path::Path;
use tracing::{debug, info, warn};

pub fn hash_payload(hasher: &ContentHasher, payload: &Payload) -> Digest {
    hasher.digest(&payload.bytes)
}

/// Ask the registry about `digest`. A failed read yields `Unknown` rather
/// than an error.
pub async fn check_duplicate(registry: &dyn Registry, digest: &Digest) -> DuplicateCheck {
    match registry.exists(digest).await {
        Ok(true) => DuplicateCheck::Present,
        Ok(false) => DuplicateCheck::Absent,
        Err(e) => {
            warn!(digest = %digest.short(), error = %e, "duplicate check inconclusive, continuing");
            DuplicateCheck::Unknown(e.to_string())
        }
    }
}

pub async fn upload(store: &dyn ObjectStore, payload: &Payload) -> Result<Locator, GatewayError> {
    let locator = store.put(payload).await?;
    debug!(store = store.name(), locator = %locator.prefix(12), "payload uploaded");
    Ok(locator)
}

pub async fn register(
    registry: &dyn Registry,
    request: RegistrationRequest,
) -> Result<Confirmation, RegistryError> {
    registry.register(request).await
}

pub async fn submit(ctx: &VaultContext, payload: Payload) -> Result<SubmitOutcome, SubmitError> {
    submit_with_observer(ctx, payload, None).await
}

/// Read `path` and submit its contents. The file name and a MIME type
/// guessed from the extension travel with the payload.
pub async fn submit_file(ctx: &VaultContext, path: &Path) -> Result<SubmitOutcome, SubmitError> {
    let bytes = tokio::fs::read(path).await?;
    let mut payload = Payload::new(bytes);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if let Some(mime) = guess_mime_type(name) {
            payload = payload.with_mime_type(mime);
        }
        payload = payload.with_file_name(name);
    }
    submit(ctx, payload).await
}

pub async fn submit_with_observer(
    ctx: &VaultContext,
    payload: Payload,
    observer: Option<&dyn StageObserver>,
) -> Result<SubmitOutcome, SubmitError> {
    let notify = |stage: Stage| {
        debug!(%stage, progress = stage.progress(), "submission stage");
        if let Some(observer) = observer {
            observer.on_stage(stage);
        }
    };

    ctx.policy.check(&payload)?;

    notify(Stage::Hashing);
    let digest = hash_payload(&ctx.hasher, &payload);

    notify(Stage::Checking);
    let check = check_duplicate(ctx.registry.as_ref(), &digest).await;
    if check == DuplicateCheck::Present {
        info!(digest = %digest.short(), "already registered, skipping upload");
        return Ok(SubmitOutcome::Conflict(Conflict {
            digest,
            detected_at: Stage::Checking,
            orphaned_locator: None,
        }));
    }

    notify(Stage::Uploading);
    let locator = upload(ctx.store.as_ref(), &payload).await?;

    notify(Stage::Registering);
    let request = RegistrationRequest {
        digest,
        locator: locator.clone(),
        owner: ctx.owner.clone(),
        size_bytes: payload.len() as u64,
        mime_type: payload.mime_type.clone(),
        file_name: payload.file_name.clone(),
    };
    let confirmation = match register(ctx.registry.as_ref(), request).await {
        Ok(confirmation) => confirmation,
        Err(RegistryError::AlreadyExists { .. }) => {
            warn!(
                digest = %digest.short(),
                locator = %locator,
                "lost registration race, upload left orphaned"
            );
            return Ok(SubmitOutcome::Conflict(Conflict {
                digest,
                detected_at: Stage::Registering,
                orphaned_locator: Some(locator),
            }));
        }
        Err(e) => return Err(e.into()),
    };

    notify(Stage::Done);
    let receipt = present(digest, locator, confirmation, ctx.owner.clone()).with_duplicate_check(check);
    info!(%receipt, "submission registered");
    Ok(SubmitOutcome::Registered(receipt))
}
