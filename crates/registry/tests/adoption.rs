use cvault_registry::{AdoptionRegistry, RegistryError};
use cvault_storage::{MemberRole, MemoryStorage, SledStorage};
use cvault_types::OwnerId;
use std::sync::{Arc, Barrier};
use std::thread;

fn donor() -> OwnerId {
    "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".parse().unwrap()
}

fn adopter() -> OwnerId {
    "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".parse().unwrap()
}

fn setup() -> AdoptionRegistry<MemoryStorage> {
    let registry = AdoptionRegistry::new(Arc::new(MemoryStorage::new()));
    registry.register_member(&donor(), MemberRole::Donor).unwrap();
    registry
        .register_member(&adopter(), MemberRole::Adopter)
        .unwrap();
    registry
}

#[test]
fn only_donors_mint() {
    let registry = setup();
    assert!(matches!(
        registry.mint_pet(&adopter(), &adopter(), "ipfs://x"),
        Err(RegistryError::RoleRequired {
            required: MemberRole::Donor,
            ..
        })
    ));
    assert!(matches!(
        registry.mint_pet(&donor(), &donor(), "  "),
        Err(RegistryError::InvalidInput(_))
    ));

    let (first, _) = registry.mint_pet(&donor(), &donor(), "ipfs://rex").unwrap();
    let (second, _) = registry.mint_pet(&donor(), &donor(), "ipfs://mia").unwrap();
    assert_eq!((first, second), (1, 2));
    assert_eq!(registry.total_supply().unwrap(), 2);
    assert_eq!(registry.token_uri(2).unwrap(), "ipfs://mia");
    assert_eq!(registry.owner_of(1).unwrap(), donor());
}

#[test]
fn adoption_request_and_approval_transfers_token() {
    let registry = setup();
    let (id, _) = registry.mint_pet(&donor(), &donor(), "ipfs://rex").unwrap();

    assert!(matches!(
        registry.request_adoption(&donor(), id),
        Err(RegistryError::RoleRequired { .. })
    ));
    registry.request_adoption(&adopter(), id).unwrap();
    assert_eq!(registry.adoption_requester(id).unwrap(), Some(adopter()));
    assert!(matches!(
        registry.request_adoption(&adopter(), id),
        Err(RegistryError::RequestPending { .. })
    ));
    assert!(matches!(
        registry.approve_adoption(&adopter(), id),
        Err(RegistryError::NotOwner { .. })
    ));

    registry.approve_adoption(&donor(), id).unwrap();
    assert_eq!(registry.owner_of(id).unwrap(), adopter());
    assert_eq!(registry.adoption_requester(id).unwrap(), None);

    // The new owner cannot request its own pet.
    assert!(matches!(
        registry.request_adoption(&adopter(), id),
        Err(RegistryError::OwnerCannotAdopt)
    ));
}

#[test]
fn rejection_clears_request() {
    let registry = setup();
    let (id, _) = registry.mint_pet(&donor(), &donor(), "ipfs://rex").unwrap();
    assert!(matches!(
        registry.reject_adoption(&donor(), id),
        Err(RegistryError::NoPendingRequest { .. })
    ));
    registry.request_adoption(&adopter(), id).unwrap();
    registry.reject_adoption(&donor(), id).unwrap();
    assert_eq!(registry.adoption_requester(id).unwrap(), None);
    assert_eq!(registry.owner_of(id).unwrap(), donor());
}

#[test]
fn listing_walks_the_supply() {
    let registry = setup();
    assert!(registry.list_pets().unwrap().is_empty());
    for uri in ["ipfs://a", "ipfs://b", "ipfs://c"] {
        registry.mint_pet(&donor(), &donor(), uri).unwrap();
    }
    let uris: Vec<String> = registry
        .list_pets()
        .unwrap()
        .into_iter()
        .map(|p| p.token_uri)
        .collect();
    assert_eq!(uris, vec!["ipfs://a", "ipfs://b", "ipfs://c"]);
    assert!(matches!(
        registry.owner_of(4),
        Err(RegistryError::TokenNotFound { token_id: 4 })
    ));
}

#[test]
fn re_registering_changes_role() {
    let registry = setup();
    registry
        .register_member(&adopter(), MemberRole::Donor)
        .unwrap();
    assert_eq!(
        registry.member_role(&adopter()).unwrap(),
        Some(MemberRole::Donor)
    );
    assert!(registry.mint_pet(&adopter(), &adopter(), "ipfs://x").is_ok());
}

#[test]
fn concurrent_requests_have_one_winner() {
    let dir = tempfile::TempDir::new().unwrap();
    let registry = Arc::new(AdoptionRegistry::new(Arc::new(
        SledStorage::new(dir.path().join("db")).unwrap(),
    )));
    registry.register_member(&donor(), MemberRole::Donor).unwrap();
    let adopters: Vec<OwnerId> = (1..=16).map(OwnerId::Account).collect();
    for adopter in &adopters {
        registry
            .register_member(adopter, MemberRole::Adopter)
            .unwrap();
    }

    for _ in 0..20 {
        let (id, _) = registry.mint_pet(&donor(), &donor(), "ipfs://rex").unwrap();
        let barrier = Arc::new(Barrier::new(adopters.len()));
        let handles: Vec<_> = adopters
            .iter()
            .cloned()
            .map(|adopter| {
                let (registry, barrier) = (registry.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    registry.request_adoption(&adopter, id).map(|_| adopter)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            match handle.join().unwrap() {
                Ok(adopter) => winners.push(adopter),
                Err(RegistryError::RequestPending { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(registry.adoption_requester(id).unwrap(), Some(winners[0].clone()));
    }
}
