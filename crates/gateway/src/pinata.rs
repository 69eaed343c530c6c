//! Pinata (IPFS pinning) client.

use crate::errors::{GatewayError, Result};
use crate::http::{build_client, check_locator, endpoint, ensure_success, file_form, parse_base};
use crate::{locator_from, ObjectStore};
use async_trait::async_trait;
use cvault_files::{Locator, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use url::Url;

pub const DEFAULT_PINATA_API_URL: &str = "https://api.pinata.cloud";
pub const DEFAULT_PINATA_GATEWAY_URL: &str = "https://gateway.pinata.cloud";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinataConfig {
    pub jwt: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_PINATA_API_URL.to_string()
}

fn default_gateway_url() -> String {
    DEFAULT_PINATA_GATEWAY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl PinataConfig {
    pub fn new(jwt: impl Into<String>) -> Self {
        Self {
            jwt: jwt.into(),
            api_url: default_api_url(),
            gateway_url: default_gateway_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PinataGateway {
    client: reqwest::Client,
    api: Url,
    gateway: Url,
    jwt: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinResponse {
    ipfs_hash: String,
}

impl PinataGateway {
    pub fn new(config: PinataConfig) -> Result<Self> {
        if config.jwt.trim().is_empty() {
            return Err(GatewayError::Config("Pinata JWT is empty".into()));
        }
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api: parse_base(&config.api_url)?,
            gateway: parse_base(&config.gateway_url)?,
            jwt: config.jwt,
        })
    }

    /// `{gateway}/ipfs/{cid}`
    pub fn gateway_url(&self, cid: &str) -> String {
        endpoint(&self.gateway, &format!("ipfs/{cid}"))
    }

    async fn pinned(response: reqwest::Response) -> Result<Locator> {
        let pin: PinResponse = ensure_success(response, "pin").await?.json().await?;
        info!(cid = %pin.ipfs_hash, "pinned to IPFS");
        locator_from(pin.ipfs_hash)
    }
}

#[async_trait]
impl ObjectStore for PinataGateway {
    fn name(&self) -> &str {
        "pinata"
    }

    async fn put(&self, payload: &Payload) -> Result<Locator> {
        let response = self
            .client
            .post(endpoint(&self.api, "pinning/pinFileToIPFS"))
            .bearer_auth(&self.jwt)
            .multipart(file_form(payload)?)
            .send()
            .await?;
        Self::pinned(response).await
    }

    async fn put_json(&self, value: &Value) -> Result<Locator> {
        let response = self
            .client
            .post(endpoint(&self.api, "pinning/pinJSONToIPFS"))
            .bearer_auth(&self.jwt)
            .json(value)
            .send()
            .await?;
        Self::pinned(response).await
    }

    async fn get(&self, locator: &Locator) -> Result<Vec<u8>> {
        check_locator(locator.as_str())?;
        let response = self
            .client
            .get(self.gateway_url(locator.as_str()))
            .send()
            .await?;
        let bytes = ensure_success(response, locator.as_str())
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        check_locator(locator.as_str())?;
        let response = self
            .client
            .delete(endpoint(&self.api, &format!("pinning/unpin/{}", locator.as_str())))
            .bearer_auth(&self.jwt)
            .send()
            .await?;
        ensure_success(response, locator.as_str()).await?;
        Ok(())
    }

    fn public_url(&self, locator: &Locator) -> Option<String> {
        Some(self.gateway_url(locator.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_url_uses_configured_host() {
        let gateway = PinataGateway::new(PinataConfig::new("jwt")).unwrap();
        assert_eq!(
            gateway.gateway_url("bafyabc"),
            "https://gateway.pinata.cloud/ipfs/bafyabc"
        );
    }

    #[test]
    fn empty_jwt_is_a_config_error() {
        assert!(matches!(
            PinataGateway::new(PinataConfig::new(" ")),
            Err(GatewayError::Config(_))
        ));
    }
}
