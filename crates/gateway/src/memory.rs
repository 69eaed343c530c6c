use crate::errors::{GatewayError, Result};
use crate::{locator_from, ObjectStore};
use async_trait::async_trait;
use cvault_files::{Locator, Payload};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-process store. Locators are `mem-` plus the first 16 hex characters of
/// the BLAKE3 hash of the bytes, so identical bytes share a locator.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn contains(&self, locator: &Locator) -> bool {
        self.objects.read().contains_key(locator.as_str())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, payload: &Payload) -> Result<Locator> {
        let hash = blake3::hash(&payload.bytes);
        let key = format!("mem-{}", &hash.to_hex()[..16]);
        self.objects
            .write()
            .insert(key.clone(), payload.bytes.clone());
        locator_from(key)
    }

    async fn get(&self, locator: &Locator) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(locator.as_str())
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(locator.to_string()))
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        self.objects
            .write()
            .remove(locator.as_str())
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(locator.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryObjectStore::new();
        let locator = store.put(&Payload::new(b"abc".to_vec())).await.unwrap();
        assert!(locator.as_str().starts_with("mem-"));
        assert_eq!(locator.as_str().len(), 20);
        assert_eq!(store.get(&locator).await.unwrap(), b"abc");

        let again = store.put(&Payload::new(b"abc".to_vec())).await.unwrap();
        assert_eq!(again, locator);
        assert_eq!(store.len(), 1);

        store.delete(&locator).await.unwrap();
        assert!(matches!(
            store.get(&locator).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn put_json_stores_serialized_document() {
        let store = MemoryObjectStore::new();
        let locator = store
            .put_json(&serde_json::json!({"name": "Rex"}))
            .await
            .unwrap();
        let bytes = store.get(&locator).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["name"], "Rex");
    }
}
