//! cvault file model
//!
//! Content digests, opaque store locators, registration records and access
//! grants. Records carry the content hash, owner and metadata of a file
//! without storing the file content itself; bytes live in an object store.

pub mod descriptor;
pub mod hasher;
pub mod payload;
pub mod policy;

pub use descriptor::{AccessGrant, Digest, DigestError, Locator, LocatorError, RegistrationRecord};
pub use hasher::ContentHasher;
pub use payload::{guess_mime_type, Payload};
pub use policy::{format_file_size, PolicyError, UploadPolicy};
