use crate::errors::{GatewayError, Result};
use crate::http::check_locator;
use crate::{locator_from, ObjectStore};
use async_trait::async_trait;
use cvault_crypto::HashType;
use cvault_files::{Locator, Payload};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files under a local directory, named `<sha256 hex><ext>`.
///
/// `get` accepts either the full name or any unique prefix of it, so the
/// bare digest hex also resolves.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn resolve(&self, locator: &Locator) -> Result<PathBuf> {
        check_locator(locator.as_str())?;
        let exact = self.root.join(locator.as_str());
        if tokio::fs::try_exists(&exact).await.unwrap_or(false) {
            return Ok(exact);
        }

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GatewayError::NotFound(locator.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(locator.as_str())
            {
                return Ok(entry.path());
            }
        }
        Err(GatewayError::NotFound(locator.to_string()))
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, payload: &Payload) -> Result<Locator> {
        let digest = hex::encode(HashType::Sha256.digest(&payload.bytes));
        let ext = payload
            .extension()
            .filter(|ext| ext[1..].chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_default();
        let name = format!("{digest}{ext}");
        check_locator(&name)?;

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(&name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::write(&path, &payload.bytes).await?;
            debug!(path = %path.display(), size = payload.len(), "stored local copy");
        }
        locator_from(name)
    }

    async fn get(&self, locator: &Locator) -> Result<Vec<u8>> {
        let path = self.resolve(locator).await?;
        Ok(tokio::fs::read(path).await?)
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        let path = self.resolve(locator).await?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}
