//! Upload acceptance rules applied before a payload is hashed.

use crate::payload::Payload;
use serde::{Deserialize, Serialize};

/// Reasons a payload is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("payload is empty")]
    Empty,
    #[error("file size {size} exceeds the {limit} limit")]
    TooLarge { size: String, limit: String },
    #[error("file type not supported: {0}")]
    UnsupportedType(String),
}

/// Size and type limits for uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Maximum accepted size in bytes; `None` means unlimited.
    pub max_size_bytes: Option<u64>,
    /// Accepted MIME types; empty accepts any type.
    #[serde(default)]
    pub allowed_mime_types: Vec<String>,
    /// Extensions (with leading dot) accepted regardless of MIME type.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl UploadPolicy {
    /// 100 MiB, the gateway limit the vault applies to medical files.
    pub const MEDICAL_MAX_SIZE: u64 = 100 * 1024 * 1024;

    /// Accepts any non-empty payload.
    pub fn permissive() -> Self {
        Self {
            max_size_bytes: None,
            allowed_mime_types: Vec::new(),
            allowed_extensions: Vec::new(),
        }
    }

    /// PDF, JPEG, PNG and DICOM up to 100 MiB. DICOM files often arrive
    /// without a MIME type, so the `.dcm` extension is enough.
    pub fn medical() -> Self {
        Self {
            max_size_bytes: Some(Self::MEDICAL_MAX_SIZE),
            allowed_mime_types: vec![
                "application/pdf".into(),
                "image/jpeg".into(),
                "image/png".into(),
                "image/dicom".into(),
                "application/dicom".into(),
            ],
            allowed_extensions: vec![".dcm".into()],
        }
    }

    pub fn with_max_size(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = Some(max_size_bytes);
        self
    }

    pub fn check(&self, payload: &Payload) -> Result<(), PolicyError> {
        if payload.is_empty() {
            return Err(PolicyError::Empty);
        }

        let size = payload.len() as u64;
        if let Some(limit) = self.max_size_bytes {
            if size > limit {
                return Err(PolicyError::TooLarge {
                    size: format_file_size(size),
                    limit: format_file_size(limit),
                });
            }
        }

        if self.allowed_mime_types.is_empty() {
            return Ok(());
        }

        let mime_ok = payload
            .mime_type
            .as_deref()
            .map(|m| self.allowed_mime_types.iter().any(|a| a.eq_ignore_ascii_case(m)))
            .unwrap_or(false);
        let ext_ok = payload
            .extension()
            .map(|ext| self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
            .unwrap_or(false);

        if mime_ok || ext_ok {
            Ok(())
        } else {
            Err(PolicyError::UnsupportedType(
                payload
                    .mime_type
                    .clone()
                    .or_else(|| payload.file_name.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
            ))
        }
    }
}

/// Human-readable size: `0 Bytes`, `1.5 KB`, `100 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
