//! DeOSS (CESS) gateway client.

use crate::errors::{GatewayError, Result};
use crate::http::{build_client, check_locator, endpoint, ensure_success, file_form, parse_base};
use crate::{locator_from, ObjectStore};
use async_trait::async_trait;
use cvault_files::{Locator, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

/// Credentials and endpoint for a DeOSS gateway. Every upload is signed
/// with the account's `message`/`signature` pair and lands in `territory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeossConfig {
    pub base_url: String,
    pub territory: String,
    pub account: String,
    pub message: String,
    pub signature: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl DeossConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            territory: String::new(),
            account: String::new(),
            message: String::new(),
            signature: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeossGateway {
    client: reqwest::Client,
    base: Url,
    config: DeossConfig,
}

impl DeossGateway {
    pub fn new(config: DeossConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base: parse_base(&config.base_url)?,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// File metadata as reported by the gateway (`data` unwrapped if present).
    pub async fn metadata(&self, locator: &Locator) -> Result<Value> {
        check_locator(locator.as_str())?;
        let url = endpoint(&self.base, &format!("file/metadata/{}", locator.as_str()));
        let response = self.client.get(url).send().await?;
        let body: Value = ensure_success(response, locator.as_str())
            .await?
            .json()
            .await?;
        Ok(match body {
            Value::Object(mut map) if map.get("data").is_some_and(|d| !d.is_null()) => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        })
    }
}

/// The gateway answers `{"data": {"fid": ...}}`; older builds answer `{"fid": ...}`.
fn extract_fid(body: &Value) -> Option<&str> {
    body.pointer("/data/fid")
        .or_else(|| body.get("fid"))
        .and_then(Value::as_str)
        .filter(|fid| !fid.trim().is_empty())
}

#[async_trait]
impl ObjectStore for DeossGateway {
    fn name(&self) -> &str {
        "deoss"
    }

    async fn put(&self, payload: &Payload) -> Result<Locator> {
        let url = endpoint(&self.base, "file");
        debug!(url = %url, size = payload.len(), "uploading to DeOSS");
        let response = self
            .client
            .put(url)
            .header("Territory", &self.config.territory)
            .header("Account", &self.config.account)
            .header("Message", &self.config.message)
            .header("Signature", &self.config.signature)
            .multipart(file_form(payload)?)
            .send()
            .await?;
        let body: Value = ensure_success(response, "file").await?.json().await?;
        let fid = extract_fid(&body)
            .ok_or_else(|| GatewayError::InvalidResponse(format!("no fid in response: {body}")))?;
        info!(fid, size = payload.len(), "DeOSS upload accepted");
        locator_from(fid)
    }

    async fn get(&self, locator: &Locator) -> Result<Vec<u8>> {
        check_locator(locator.as_str())?;
        let url = endpoint(&self.base, &format!("file/download/{}", locator.as_str()));
        let response = self.client.get(url).send().await?;
        let bytes = ensure_success(response, locator.as_str())
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        check_locator(locator.as_str())?;
        let url = endpoint(&self.base, &format!("file/{}", locator.as_str()));
        let response = self
            .client
            .delete(url)
            .header("Account", &self.config.account)
            .header("Message", &self.config.message)
            .header("Signature", &self.config.signature)
            .send()
            .await?;
        ensure_success(response, locator.as_str()).await?;
        info!(fid = %locator, "DeOSS file deleted");
        Ok(())
    }
}
