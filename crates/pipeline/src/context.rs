use cvault_files::{ContentHasher, UploadPolicy};
use cvault_gateway::ObjectStore;
use cvault_registry::Registry;
use cvault_types::OwnerId;
use std::sync::Arc;

/// Everything one session needs to submit files: who is submitting, where
/// bytes go and which registry records them. Built once and passed to every
/// call.
#[derive(Clone)]
pub struct VaultContext {
    pub owner: OwnerId,
    pub registry: Arc<dyn Registry>,
    pub store: Arc<dyn ObjectStore>,
    pub hasher: ContentHasher,
    pub policy: UploadPolicy,
}

impl VaultContext {
    pub fn new(owner: OwnerId, registry: Arc<dyn Registry>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            owner,
            registry,
            store,
            hasher: ContentHasher::default(),
            policy: UploadPolicy::default(),
        }
    }

    pub fn with_hasher(mut self, hasher: ContentHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Same registry, store and settings on behalf of another owner.
    pub fn for_owner(&self, owner: OwnerId) -> Self {
        Self {
            owner,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for VaultContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultContext")
            .field("owner", &self.owner)
            .field("store", &self.store.name())
            .field("hasher", &self.hasher)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
