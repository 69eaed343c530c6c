use cvault_files::{Digest, Locator};
use cvault_registry::{
    GrantPolicy, LedgerRegistry, RegistrationRequest, Registry, RegistryError, VaultRegistry,
};
use cvault_storage::{MemoryStorage, SledStorage, Storage};
use cvault_types::{Clock, ManualClock, OwnerId};
use std::sync::Arc;
use tempfile::TempDir;

const START: u64 = 1_700_000_000;

fn setup() -> (LedgerRegistry, ManualClock) {
    let clock = ManualClock::new(START);
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    (
        LedgerRegistry::with_clock(storage, Arc::new(clock.clone())),
        clock,
    )
}

fn request(seed: u8, owner: &OwnerId) -> RegistrationRequest {
    RegistrationRequest {
        digest: Digest::from_bytes([seed; 32]),
        locator: Locator::new(format!("fid-{seed}")).unwrap(),
        owner: owner.clone(),
        size_bytes: 42,
        mime_type: Some("application/pdf".into()),
        file_name: Some("laudo.pdf".into()),
    }
}

fn patient() -> OwnerId {
    "0x1111111111111111111111111111111111111111".parse().unwrap()
}

fn doctor() -> OwnerId {
    "0x2222222222222222222222222222222222222222".parse().unwrap()
}

#[tokio::test]
async fn register_then_duplicate_is_rejected() {
    let (registry, _) = setup();
    let req = request(1, &patient());

    assert!(!registry.exists(&req.digest).await.unwrap());
    let first = registry.register(req.clone()).await.unwrap();
    assert_eq!(first.sequence, 1);
    assert_eq!(first.recorded_at, START);
    assert!(registry.exists(&req.digest).await.unwrap());

    let mut again = req.clone();
    again.locator = Locator::new("different").unwrap();
    let err = registry.register(again).await.unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyExists { digest } if digest == req.digest));

    let record = registry.get(&req.digest).await.unwrap().unwrap();
    assert_eq!(record.locator.as_str(), "fid-1");
    assert_eq!(record.registered_at, START);
}

#[tokio::test]
async fn invalid_request_is_refused_before_writing() {
    let (registry, _) = setup();
    let mut req = request(2, &patient());
    req.file_name = Some(String::new());
    assert!(matches!(
        registry.register(req.clone()).await,
        Err(RegistryError::InvalidInput(_))
    ));
    assert!(!registry.exists(&req.digest).await.unwrap());
}

#[tokio::test]
async fn only_the_owner_mutates() {
    let (registry, _) = setup();
    let req = request(3, &patient());
    registry.register(req.clone()).await.unwrap();

    assert!(matches!(
        registry.remove(&doctor(), &req.digest).await,
        Err(RegistryError::NotOwner { .. })
    ));
    assert!(matches!(
        registry.transfer(&doctor(), &req.digest, &doctor()).await,
        Err(RegistryError::NotOwner { .. })
    ));
    assert!(matches!(
        registry
            .grant_access(&doctor(), &req.digest, &doctor(), START + 10)
            .await,
        Err(RegistryError::NotOwner { .. })
    ));
    assert!(matches!(
        registry.remove(&patient(), &Digest::from_bytes([99; 32])).await,
        Err(RegistryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn transfer_moves_ownership() {
    let (registry, _) = setup();
    let req = request(4, &patient());
    registry.register(req.clone()).await.unwrap();

    assert!(matches!(
        registry.transfer(&patient(), &req.digest, &patient()).await,
        Err(RegistryError::CannotTransferToSelf)
    ));

    registry
        .transfer(&patient(), &req.digest, &doctor())
        .await
        .unwrap();
    assert_eq!(registry.get(&req.digest).await.unwrap().unwrap().owner, doctor());
    assert!(registry.list_by_owner(&patient()).await.unwrap().is_empty());
    assert_eq!(registry.list_by_owner(&doctor()).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfer_racing_remove_never_resurrects() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(SledStorage::new(dir.path().join("db")).unwrap());
    let registry = Arc::new(LedgerRegistry::new(storage));

    for seed in 100..140u8 {
        let req = request(seed, &patient());
        registry.register(req.clone()).await.unwrap();
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let transfer = {
            let (registry, barrier) = (registry.clone(), barrier.clone());
            tokio::spawn(async move {
                barrier.wait().await;
                registry.transfer(&patient(), &req.digest, &doctor()).await
            })
        };
        let remove = {
            let (registry, barrier) = (registry.clone(), barrier.clone());
            tokio::spawn(async move {
                barrier.wait().await;
                registry.remove(&patient(), &req.digest).await
            })
        };
        let transferred = transfer.await.unwrap();
        let removed = remove.await.unwrap();

        let record = registry.get(&req.digest).await.unwrap();
        match (transferred, removed) {
            (Ok(_), Err(RegistryError::NotOwner { .. })) => {
                assert_eq!(record.map(|r| r.owner), Some(doctor()));
            }
            (Err(RegistryError::NotFound { .. }), Ok(_)) => assert_eq!(record, None),
            (t, r) => panic!("inconsistent outcome: transfer={t:?} remove={r:?}"),
        }
    }
}

#[tokio::test]
async fn grants_expire() {
    let (registry, clock) = setup();
    let req = request(5, &patient());
    registry.register(req.clone()).await.unwrap();

    assert!(registry.has_access(&req.digest, &patient()).await.unwrap());
    assert!(!registry.has_access(&req.digest, &doctor()).await.unwrap());

    assert!(matches!(
        registry
            .grant_access(&patient(), &req.digest, &doctor(), START)
            .await,
        Err(RegistryError::InvalidExpiration { .. })
    ));
    assert!(matches!(
        registry
            .grant_access(&patient(), &req.digest, &patient(), START + 10)
            .await,
        Err(RegistryError::CannotGrantToOwner)
    ));

    let expires_at = GrantPolicy::default().expiration(clock.now_secs(), 1).unwrap();
    registry
        .grant_access(&patient(), &req.digest, &doctor(), expires_at)
        .await
        .unwrap();
    assert!(registry.has_access(&req.digest, &doctor()).await.unwrap());
    assert_eq!(registry.list_grants(&req.digest).await.unwrap().len(), 1);

    clock.set(expires_at);
    assert!(!registry.has_access(&req.digest, &doctor()).await.unwrap());
    assert!(registry.list_grants(&req.digest).await.unwrap().is_empty());
}

#[tokio::test]
async fn revoke_requires_existing_grant() {
    let (registry, _) = setup();
    let req = request(6, &patient());
    registry.register(req.clone()).await.unwrap();

    assert!(matches!(
        registry.revoke_access(&patient(), &req.digest, &doctor()).await,
        Err(RegistryError::NoExistingAccess { .. })
    ));

    registry
        .grant_access(&patient(), &req.digest, &doctor(), START + 3_600)
        .await
        .unwrap();
    registry
        .revoke_access(&patient(), &req.digest, &doctor())
        .await
        .unwrap();
    assert!(!registry.has_access(&req.digest, &doctor()).await.unwrap());
}

#[tokio::test]
async fn remove_clears_record_and_grants() {
    let (registry, _) = setup();
    let req = request(7, &patient());
    registry.register(req.clone()).await.unwrap();
    registry
        .grant_access(&patient(), &req.digest, &doctor(), START + 3_600)
        .await
        .unwrap();

    registry.remove(&patient(), &req.digest).await.unwrap();
    assert!(!registry.exists(&req.digest).await.unwrap());
    assert!(matches!(
        registry.has_access(&req.digest, &doctor()).await,
        Err(RegistryError::NotFound { .. })
    ));

    // The digest can be registered again once removed.
    registry.register(req).await.unwrap();
}

#[tokio::test]
async fn concurrent_registrations_have_one_winner() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(SledStorage::new(dir.path().join("db")).unwrap());
    let registry = Arc::new(LedgerRegistry::new(storage));

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let mut req = request(8, &OwnerId::Account(i as u64 + 1));
            req.locator = Locator::new(format!("fid-writer-{i}")).unwrap();
            registry.register(req).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(RegistryError::AlreadyExists { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((wins, conflicts), (1, 7));
    assert_eq!(registry.record_count().unwrap(), 1);
}

#[tokio::test]
async fn confirmations_are_sequenced() {
    let (registry, _) = setup();
    let a = registry.register(request(10, &patient())).await.unwrap();
    let b = registry.register(request(11, &patient())).await.unwrap();
    assert_eq!((a.sequence, b.sequence), (1, 2));
    assert_ne!(a.tx_id, b.tx_id);
}
