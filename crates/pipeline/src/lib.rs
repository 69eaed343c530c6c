//! Content-addressed submission workflow.
//!
//! `submit` hashes a payload, asks the registry whether the digest is
//! already known, uploads the bytes, registers the digest and presents a
//! receipt. The steps of one submission run strictly in order; the registry
//! alone decides uniqueness.

pub mod context;
pub mod error;
pub mod outcome;
pub mod pets;
pub mod pipeline;
pub mod stage;

pub use context::VaultContext;
pub use error::SubmitError;
pub use outcome::{present, Conflict, DuplicateCheck, Receipt, SubmitOutcome};
pub use pets::{
    build_metadata, decode_token_uri, encode_data_uri, publish_pet, PetAttribute, PetMetadata,
    PetProfile, PublishedPet, PLACEHOLDER_IMAGE,
};
pub use pipeline::{
    check_duplicate, hash_payload, register, submit, submit_file, submit_with_observer, upload,
};
pub use stage::{Stage, StageObserver};
