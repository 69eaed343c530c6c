//! Shared plumbing for the HTTP gateways.

use crate::errors::{GatewayError, Result};
use cvault_files::Payload;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use url::Url;

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GatewayError::Config(e.to_string()))
}

pub(crate) fn parse_base(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url.trim_end_matches('/'))
        .map_err(|e| GatewayError::Config(format!("invalid base url {base_url}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(GatewayError::Config(format!(
            "unsupported scheme in {base_url}"
        )));
    }
    Ok(url)
}

/// Join `path` onto `base` without dropping any base path segment.
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Locators end up in URL paths, so only URL-safe identifiers are accepted.
pub(crate) fn check_locator(locator: &str) -> Result<()> {
    let ok = locator
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !locator.contains("..");
    if ok {
        Ok(())
    } else {
        Err(GatewayError::InvalidLocator(locator.to_string()))
    }
}

pub(crate) fn file_form(payload: &Payload) -> Result<Form> {
    let part = Part::bytes(payload.bytes.clone())
        .file_name(payload.file_name.clone().unwrap_or_else(|| "file".into()))
        .mime_str(payload.content_type())
        .map_err(|e| GatewayError::Config(e.to_string()))?;
    Ok(Form::new().part("file", part))
}

/// Turn a non-success response into an error; 404 becomes `NotFound`.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GatewayError::NotFound(what.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let base = parse_base("http://127.0.0.1:8080/api/").unwrap();
        assert_eq!(endpoint(&base, "/file"), "http://127.0.0.1:8080/api/file");
        let root = parse_base("http://127.0.0.1:8080").unwrap();
        assert_eq!(endpoint(&root, "file/download/x"), "http://127.0.0.1:8080/file/download/x");
    }

    #[test]
    fn rejects_bad_bases_and_locators() {
        assert!(parse_base("ftp://host").is_err());
        assert!(parse_base("not a url").is_err());
        assert!(check_locator("bafy-123_abc.pdf").is_ok());
        assert!(check_locator("../etc/passwd").is_err());
        assert!(check_locator("a/b").is_err());
        assert!(check_locator("a?b=c").is_err());
    }
}
