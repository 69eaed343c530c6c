use async_trait::async_trait;
use cvault_crypto::HashType;
use cvault_files::{ContentHasher, Digest, Locator, Payload, PolicyError, RegistrationRecord, UploadPolicy};
use cvault_gateway::{GatewayError, MemoryObjectStore, ObjectStore};
use cvault_pipeline::{
    submit, submit_file, submit_with_observer, DuplicateCheck, Stage, SubmitError, SubmitOutcome,
    VaultContext,
};
use cvault_registry::{Confirmation, LedgerRegistry, RegistrationRequest, Registry, RegistryError};
use cvault_storage::{MemoryStorage, Storage};
use cvault_types::OwnerId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const HELLO_SHA256: &str = "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9";

/// Memory store that counts `put` calls and can be switched to fail.
#[derive(Default)]
struct CountingStore {
    inner: MemoryObjectStore,
    puts: AtomicUsize,
    fail: bool,
}

impl CountingStore {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn put(&self, payload: &Payload) -> Result<Locator, GatewayError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GatewayError::Network("connection refused".into()));
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

/// Registry wrapper with injectable read/write failures and call counts.
struct ScriptedRegistry {
    inner: LedgerRegistry,
    exists_fails: bool,
    /// Pretend the digest is absent even when it is not, as a stale replica would.
    exists_stale: bool,
    register_fails: bool,
    registers: AtomicUsize,
}

impl ScriptedRegistry {
    fn new() -> Self {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        Self {
            inner: LedgerRegistry::new(storage),
            exists_fails: false,
            exists_stale: false,
            register_fails: false,
            registers: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Registry for ScriptedRegistry {
    async fn exists(&self, digest: &Digest) -> Result<bool, RegistryError> {
        if self.exists_fails {
            return Err(RegistryError::Unavailable("rpc timeout".into()));
        }
        if self.exists_stale {
            return Ok(false);
        }
        self.inner.exists(digest).await
    }

    async fn register(&self, request: RegistrationRequest) -> Result<Confirmation, RegistryError> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        if self.register_fails {
            return Err(RegistryError::Unavailable("rpc timeout".into()));
        }
        self.inner.register(request).await
    }

    async fn get(&self, digest: &Digest) -> Result<Option<RegistrationRecord>, RegistryError> {
        self.inner.get(digest).await
    }
}

fn owner() -> OwnerId {
    "0x1111111111111111111111111111111111111111".parse().unwrap()
}

fn context(registry: Arc<ScriptedRegistry>, store: Arc<CountingStore>) -> VaultContext {
    VaultContext::new(owner(), registry, store)
}

fn hello() -> Payload {
    Payload::new(b"hello world!".to_vec()).with_file_name("hello.txt")
}

#[tokio::test]
async fn hello_world_registers_then_conflicts() {
    let registry = Arc::new(ScriptedRegistry::new());
    let store = Arc::new(CountingStore::default());
    let ctx = context(registry.clone(), store.clone());

    let first = submit(&ctx, hello()).await.unwrap();
    let receipt = match first {
        SubmitOutcome::Registered(receipt) => receipt,
        other => panic!("expected registration, got {other:?}"),
    };
    assert_eq!(receipt.digest.to_hex(), HELLO_SHA256);
    assert_eq!(receipt.owner, owner());
    assert_eq!(receipt.duplicate_check, DuplicateCheck::Absent);
    assert!(receipt.to_string().starts_with(&format!("digest=0x{HELLO_SHA256} locator=mem-")));

    let second = submit(&ctx, hello()).await.unwrap();
    assert!(second.is_conflict());
    assert_eq!(second.digest(), receipt.digest);
    assert_eq!(store.puts(), 1, "duplicate must not reach the store");
    assert_eq!(registry.registers.load(Ordering::SeqCst), 1);

    let record = registry.get(&receipt.digest).await.unwrap().unwrap();
    assert_eq!(record.locator, receipt.locator);
    assert_eq!(record.file_name.as_deref(), Some("hello.txt"));
    assert_eq!(record.size_bytes, 12);
}

#[tokio::test]
async fn digest_is_deterministic_and_distinct() {
    let registry = Arc::new(ScriptedRegistry::new());
    let store = Arc::new(CountingStore::default());
    let ctx = context(registry, store);

    let mut digests = Vec::new();
    for body in [&b"alpha"[..], b"beta", b"gamma"] {
        let outcome = submit(&ctx, Payload::new(body.to_vec())).await.unwrap();
        digests.push(outcome.digest());
        assert_eq!(outcome.digest(), ctx.hasher.digest(body));
    }
    digests.sort();
    digests.dedup();
    assert_eq!(digests.len(), 3);
}

#[tokio::test]
async fn failed_duplicate_check_still_uploads() {
    let mut scripted = ScriptedRegistry::new();
    scripted.exists_fails = true;
    let registry = Arc::new(scripted);
    let store = Arc::new(CountingStore::default());
    let ctx = context(registry.clone(), store.clone());

    let outcome = submit(&ctx, hello()).await.unwrap();
    let receipt = outcome.receipt().expect("registered");
    assert!(matches!(receipt.duplicate_check, DuplicateCheck::Unknown(_)));
    assert_eq!(store.puts(), 1);
    assert_eq!(registry.registers.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_upload_never_registers() {
    let registry = Arc::new(ScriptedRegistry::new());
    let store = Arc::new(CountingStore::failing());
    let ctx = context(registry.clone(), store.clone());

    let err = submit(&ctx, hello()).await.unwrap_err();
    assert!(matches!(err, SubmitError::Transfer(GatewayError::Network(_))));
    assert!(err.is_retryable());
    assert_eq!(store.puts(), 1);
    assert_eq!(registry.registers.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn lost_race_reports_conflict_with_orphan() {
    let mut scripted = ScriptedRegistry::new();
    scripted.exists_stale = true;
    let registry = Arc::new(scripted);
    let store = Arc::new(CountingStore::default());
    let ctx = context(registry.clone(), store.clone());

    submit(&ctx, hello()).await.unwrap();
    let outcome = submit(&ctx.for_owner(OwnerId::Account(9)), hello())
        .await
        .unwrap();
    match outcome {
        SubmitOutcome::Conflict(conflict) => {
            assert_eq!(conflict.detected_at, Stage::Registering);
            assert!(conflict.orphaned_locator.is_some());
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(store.puts(), 2);

    // The first writer still owns the record.
    let digest = ctx.hasher.digest(b"hello world!");
    assert_eq!(registry.get(&digest).await.unwrap().unwrap().owner, owner());
}

#[tokio::test]
async fn registry_write_failure_is_retryable() {
    let mut scripted = ScriptedRegistry::new();
    scripted.register_fails = true;
    let ctx = context(Arc::new(scripted), Arc::new(CountingStore::default()));

    let err = submit(&ctx, hello()).await.unwrap_err();
    assert!(matches!(err, SubmitError::Registry(RegistryError::Unavailable(_))));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn policy_rejects_before_hashing() {
    let store = Arc::new(CountingStore::default());
    let ctx = context(Arc::new(ScriptedRegistry::new()), store.clone())
        .with_policy(UploadPolicy::medical());

    let err = submit(&ctx, hello().with_mime_type("text/plain")).await.unwrap_err();
    assert!(matches!(err, SubmitError::Rejected(PolicyError::UnsupportedType(_))));
    assert!(!err.is_retryable());

    let err = submit(&ctx, Payload::new(Vec::new())).await.unwrap_err();
    assert!(matches!(err, SubmitError::Rejected(PolicyError::Empty)));
    assert_eq!(store.puts(), 0);
}

#[tokio::test]
async fn observer_sees_every_stage_in_order() {
    let ctx = context(
        Arc::new(ScriptedRegistry::new()),
        Arc::new(CountingStore::default()),
    );
    let seen = Mutex::new(Vec::new());
    let observer = |stage: Stage| seen.lock().push(stage);

    submit_with_observer(&ctx, hello(), Some(&observer))
        .await
        .unwrap();
    assert_eq!(
        *seen.lock(),
        vec![
            Stage::Hashing,
            Stage::Checking,
            Stage::Uploading,
            Stage::Registering,
            Stage::Done
        ]
    );

    seen.lock().clear();
    submit_with_observer(&ctx, hello(), Some(&observer))
        .await
        .unwrap();
    assert_eq!(*seen.lock(), vec![Stage::Hashing, Stage::Checking]);
}

#[tokio::test]
async fn alternate_hash_algorithm() {
    let ctx = context(
        Arc::new(ScriptedRegistry::new()),
        Arc::new(CountingStore::default()),
    )
    .with_hasher(ContentHasher::new(HashType::Blake3));
    let outcome = submit(&ctx, hello()).await.unwrap();
    assert_eq!(
        outcome.digest(),
        Digest::from_bytes(*blake3::hash(b"hello world!").as_bytes())
    );
}

#[tokio::test]
async fn submit_file_reads_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("exam.pdf");
    std::fs::write(&path, b"%PDF-1.7 sample").unwrap();

    let registry = Arc::new(ScriptedRegistry::new());
    let ctx = context(registry.clone(), Arc::new(CountingStore::default()))
        .with_policy(UploadPolicy::medical());
    let outcome = submit_file(&ctx, &path).await.unwrap();
    let record = registry.get(&outcome.digest()).await.unwrap().unwrap();
    assert_eq!(record.mime_type.as_deref(), Some("application/pdf"));
    assert_eq!(record.file_name.as_deref(), Some("exam.pdf"));

    let missing = submit_file(&ctx, &dir.path().join("absent.pdf")).await;
    assert!(matches!(missing, Err(SubmitError::LocalIo(_))));
}
