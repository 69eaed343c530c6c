//! Pet adoption registry.
//!
//! Donors mint pet tokens, adopters request them, and the current owner
//! approves (ownership moves to the requester) or rejects the request.

use crate::confirmation::{confirm, Confirmation};
use crate::errors::*;
use cvault_storage::{MemberRole, PetToken, Storage};
use cvault_types::{Clock, OwnerId, SystemClock};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AdoptionRegistry<S: ?Sized = dyn Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Storage + ?Sized> AdoptionRegistry<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Register or re-register a participant; the latest role wins.
    pub fn register_member(&self, member: &OwnerId, role: MemberRole) -> Result<Confirmation> {
        self.storage.put_member(member, role)?;
        let member_text = member.to_string();
        let confirmation = confirm(
            self.storage.as_ref(),
            self.clock.now_secs(),
            "register_member",
            &[member_text.as_bytes(), &[role.code()]],
        )?;
        info!(member = %member, ?role, "member registered");
        Ok(confirmation)
    }

    pub fn member_role(&self, member: &OwnerId) -> Result<Option<MemberRole>> {
        Ok(self.storage.get_member(member)?)
    }

    fn require_role(&self, caller: &OwnerId, required: MemberRole) -> Result<()> {
        match self.storage.get_member(caller)? {
            Some(role) if role == required => Ok(()),
            _ => Err(RegistryError::RoleRequired {
                caller: caller.clone(),
                required,
            }),
        }
    }

    pub fn pet(&self, token_id: u64) -> Result<PetToken> {
        self.storage
            .get_pet(token_id)?
            .ok_or(RegistryError::TokenNotFound { token_id })
    }

    /// Mint a token for `to`. Only registered donors may mint.
    pub fn mint_pet(
        &self,
        caller: &OwnerId,
        to: &OwnerId,
        token_uri: &str,
    ) -> Result<(u64, Confirmation)> {
        self.require_role(caller, MemberRole::Donor)?;
        let token_uri = token_uri.trim();
        if token_uri.is_empty() {
            return Err(RegistryError::InvalidInput("token URI cannot be empty".into()));
        }

        let now = self.clock.now_secs();
        let pet = self.storage.mint_pet(to, token_uri, now)?;
        let to_text = to.to_string();
        let confirmation = confirm(
            self.storage.as_ref(),
            now,
            "mint_pet",
            &[
                &pet.token_id.to_be_bytes(),
                to_text.as_bytes(),
                token_uri.as_bytes(),
            ],
        )?;
        info!(token_id = pet.token_id, owner = %to, "pet minted");
        Ok((pet.token_id, confirmation))
    }

    /// Apply `change` to a token atomically. `change` sees the stored token
    /// and returns the replacement or a rule error; it is rerun when another
    /// writer got there first.
    fn update_pet<F>(&self, token_id: u64, change: F) -> Result<(PetToken, PetToken)>
    where
        F: Fn(&PetToken) -> Result<PetToken>,
    {
        loop {
            let current = self.pet(token_id)?;
            let updated = change(&current)?;
            if self.storage.replace_pet(&current, &updated)? {
                return Ok((current, updated));
            }
            debug!(token_id, "token changed concurrently, reloading");
        }
    }

    pub fn request_adoption(&self, caller: &OwnerId, token_id: u64) -> Result<Confirmation> {
        self.require_role(caller, MemberRole::Adopter)?;
        self.update_pet(token_id, |pet| {
            if &pet.owner == caller {
                return Err(RegistryError::OwnerCannotAdopt);
            }
            if pet.requester.is_some() {
                return Err(RegistryError::RequestPending { token_id });
            }
            Ok(PetToken {
                requester: Some(caller.clone()),
                ..pet.clone()
            })
        })?;

        let caller_text = caller.to_string();
        let confirmation = confirm(
            self.storage.as_ref(),
            self.clock.now_secs(),
            "request_adoption",
            &[&token_id.to_be_bytes(), caller_text.as_bytes()],
        )?;
        info!(token_id, requester = %caller, "adoption requested");
        Ok(confirmation)
    }

    /// Move the token to the pending requester.
    pub fn approve_adoption(&self, caller: &OwnerId, token_id: u64) -> Result<Confirmation> {
        let (_, approved) = self.update_pet(token_id, |pet| {
            check_owner(pet, caller)?;
            let requester = pet
                .requester
                .clone()
                .ok_or(RegistryError::NoPendingRequest { token_id })?;
            Ok(PetToken {
                owner: requester,
                requester: None,
                ..pet.clone()
            })
        })?;

        let requester_text = approved.owner.to_string();
        let confirmation = confirm(
            self.storage.as_ref(),
            self.clock.now_secs(),
            "approve_adoption",
            &[&token_id.to_be_bytes(), requester_text.as_bytes()],
        )?;
        info!(token_id, from = %caller, to = %approved.owner, "adoption approved");
        Ok(confirmation)
    }

    pub fn reject_adoption(&self, caller: &OwnerId, token_id: u64) -> Result<Confirmation> {
        self.update_pet(token_id, |pet| {
            check_owner(pet, caller)?;
            if pet.requester.is_none() {
                return Err(RegistryError::NoPendingRequest { token_id });
            }
            Ok(PetToken {
                requester: None,
                ..pet.clone()
            })
        })?;

        let confirmation = confirm(
            self.storage.as_ref(),
            self.clock.now_secs(),
            "reject_adoption",
            &[&token_id.to_be_bytes()],
        )?;
        info!(token_id, "adoption rejected");
        Ok(confirmation)
    }

    pub fn total_supply(&self) -> Result<u64> {
        Ok(self.storage.pet_supply()?)
    }

    pub fn owner_of(&self, token_id: u64) -> Result<OwnerId> {
        Ok(self.pet(token_id)?.owner)
    }

    pub fn token_uri(&self, token_id: u64) -> Result<String> {
        Ok(self.pet(token_id)?.token_uri)
    }

    pub fn adoption_requester(&self, token_id: u64) -> Result<Option<OwnerId>> {
        Ok(self.pet(token_id)?.requester)
    }

    /// Walk token ids `1..=total_supply`, one lookup each. Ids that fail to
    /// load are skipped.
    pub fn list_pets(&self) -> Result<Vec<PetToken>> {
        let supply = self.total_supply()?;
        let mut pets = Vec::with_capacity(supply as usize);
        for token_id in 1..=supply {
            match self.storage.get_pet(token_id) {
                Ok(Some(pet)) => pets.push(pet),
                Ok(None) => warn!(token_id, "token id within supply has no data"),
                Err(e) => warn!(token_id, error = %e, "skipping unreadable token"),
            }
        }
        Ok(pets)
    }
}

fn check_owner(pet: &PetToken, caller: &OwnerId) -> Result<()> {
    if &pet.owner != caller {
        return Err(RegistryError::NotOwner {
            caller: caller.clone(),
        });
    }
    Ok(())
}
