//! In-memory storage for tests and ephemeral nodes.

use crate::{
    normalize_email, MemberRole, NewUpload, NewUser, PetToken, Storage, UploadEntry, UserAccount,
};
use anyhow::Result;
use cvault_files::{AccessGrant, Digest, RegistrationRecord};
use cvault_types::OwnerId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Default)]
struct State {
    records: HashMap<Digest, RegistrationRecord>,
    grants: BTreeMap<(Digest, OwnerId), AccessGrant>,
    sequence: u64,
    users: BTreeMap<u64, UserAccount>,
    uploads: Vec<UploadEntry>,
    members: HashMap<OwnerId, MemberRole>,
    pets: BTreeMap<u64, PetToken>,
    pet_supply: u64,
}

/// In-memory storage implementation
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn insert_record(&self, record: &RegistrationRecord) -> Result<bool> {
        let mut state = self.state.write();
        if state.records.contains_key(&record.digest) {
            return Ok(false);
        }
        state.records.insert(record.digest, record.clone());
        Ok(true)
    }

    fn replace_record(
        &self,
        expected: &RegistrationRecord,
        record: &RegistrationRecord,
    ) -> Result<bool> {
        let mut state = self.state.write();
        match state.records.get_mut(&expected.digest) {
            Some(current) if *current == *expected && record.digest == expected.digest => {
                *current = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get_record(&self, digest: &Digest) -> Result<Option<RegistrationRecord>> {
        Ok(self.state.read().records.get(digest).cloned())
    }

    fn remove_record(&self, digest: &Digest) -> Result<Option<RegistrationRecord>> {
        let mut state = self.state.write();
        let removed = state.records.remove(digest);
        if removed.is_some() {
            state.grants.retain(|(d, _), _| d != digest);
        }
        Ok(removed)
    }

    fn list_records_by_owner(&self, owner: &OwnerId) -> Result<Vec<RegistrationRecord>> {
        let state = self.state.read();
        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|r| &r.owner == owner)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.registered_at
                .cmp(&a.registered_at)
                .then_with(|| b.digest.cmp(&a.digest))
        });
        Ok(records)
    }

    fn record_count(&self) -> Result<u64> {
        Ok(self.state.read().records.len() as u64)
    }

    fn put_grant(&self, grant: &AccessGrant) -> Result<()> {
        self.state
            .write()
            .grants
            .insert((grant.digest, grant.grantee.clone()), grant.clone());
        Ok(())
    }

    fn get_grant(&self, digest: &Digest, grantee: &OwnerId) -> Result<Option<AccessGrant>> {
        Ok(self
            .state
            .read()
            .grants
            .get(&(*digest, grantee.clone()))
            .cloned())
    }

    fn remove_grant(&self, digest: &Digest, grantee: &OwnerId) -> Result<bool> {
        Ok(self
            .state
            .write()
            .grants
            .remove(&(*digest, grantee.clone()))
            .is_some())
    }

    fn list_grants(&self, digest: &Digest) -> Result<Vec<AccessGrant>> {
        Ok(self
            .state
            .read()
            .grants
            .iter()
            .filter(|((d, _), _)| d == digest)
            .map(|(_, g)| g.clone())
            .collect())
    }

    fn next_sequence(&self) -> Result<u64> {
        let mut state = self.state.write();
        state.sequence += 1;
        Ok(state.sequence)
    }

    fn create_user(&self, user: NewUser) -> Result<Option<UserAccount>> {
        let mut state = self.state.write();
        let email = normalize_email(&user.email);
        let taken = state
            .users
            .values()
            .any(|u| u.email == email || u.enrollment == user.enrollment);
        if taken {
            return Ok(None);
        }
        let id = state.users.keys().next_back().copied().unwrap_or(0) + 1;
        let account = user.into_account(id);
        state.users.insert(id, account.clone());
        Ok(Some(account))
    }

    fn get_user(&self, id: u64) -> Result<Option<UserAccount>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        let email = normalize_email(email);
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    fn append_upload(&self, upload: NewUpload) -> Result<UploadEntry> {
        let mut state = self.state.write();
        let id = state.uploads.len() as u64 + 1;
        let entry = upload.into_entry(id);
        state.uploads.push(entry.clone());
        Ok(entry)
    }

    fn list_uploads(&self, user_id: u64) -> Result<Vec<UploadEntry>> {
        Ok(self
            .state
            .read()
            .uploads
            .iter()
            .rev()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect())
    }

    fn put_member(&self, member: &OwnerId, role: MemberRole) -> Result<()> {
        self.state.write().members.insert(member.clone(), role);
        Ok(())
    }

    fn get_member(&self, member: &OwnerId) -> Result<Option<MemberRole>> {
        Ok(self.state.read().members.get(member).copied())
    }

    fn mint_pet(&self, owner: &OwnerId, token_uri: &str, minted_at: u64) -> Result<PetToken> {
        let mut state = self.state.write();
        state.pet_supply += 1;
        let token_id = state.pet_supply;
        let pet = PetToken {
            token_id,
            owner: owner.clone(),
            token_uri: token_uri.to_string(),
            requester: None,
            minted_at,
        };
        state.pets.insert(token_id, pet.clone());
        Ok(pet)
    }

    fn replace_pet(&self, expected: &PetToken, pet: &PetToken) -> Result<bool> {
        let mut state = self.state.write();
        match state.pets.get_mut(&expected.token_id) {
            Some(current) if *current == *expected && pet.token_id == expected.token_id => {
                *current = pet.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get_pet(&self, token_id: u64) -> Result<Option<PetToken>> {
        Ok(self.state.read().pets.get(&token_id).cloned())
    }

    fn pet_supply(&self) -> Result<u64> {
        Ok(self.state.read().pet_supply)
    }
}
