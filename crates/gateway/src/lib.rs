//! Object stores.
//!
//! A store takes bytes and hands back an opaque [`Locator`]. The vault never
//! interprets locators; it only records them and passes them back to the
//! store that issued them.

mod deoss;
mod errors;
mod http;
mod local;
mod memory;
mod pinata;

pub use deoss::{DeossConfig, DeossGateway};
pub use errors::*;
pub use local::LocalDirStore;
pub use memory::MemoryObjectStore;
pub use pinata::{PinataConfig, PinataGateway};

use async_trait::async_trait;
use cvault_files::{Locator, Payload};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn put(&self, payload: &Payload) -> Result<Locator>;

    async fn get(&self, locator: &Locator) -> Result<Vec<u8>>;

    async fn delete(&self, locator: &Locator) -> Result<()>;

    /// Store a JSON document.
    async fn put_json(&self, value: &serde_json::Value) -> Result<Locator> {
        let payload = Payload::new(serde_json::to_vec(value)?)
            .with_file_name("metadata.json")
            .with_mime_type("application/json");
        self.put(&payload).await
    }

    /// Public URL for a locator, when the store serves one.
    fn public_url(&self, _locator: &Locator) -> Option<String> {
        None
    }
}

pub(crate) fn locator_from(value: impl Into<String>) -> Result<Locator> {
    Locator::new(value).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}
