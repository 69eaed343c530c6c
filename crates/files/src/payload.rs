//! Raw bytes submitted for storage, with the little metadata callers know.

use std::path::Path;

/// Bytes submitted by a caller; owned by the request that carries them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
            mime_type: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Read a file from disk, naming the payload after it.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut payload = Self::new(bytes);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            payload.file_name = Some(name.to_string());
            payload.mime_type = guess_mime_type(name).map(str::to_string);
        }
        Ok(payload)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension including the leading dot, lowercased.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let ext = Path::new(name).extension()?.to_str()?;
        Some(format!(".{}", ext.to_lowercase()))
    }

    /// MIME type to send to a store; falls back to `application/octet-stream`.
    pub fn content_type(&self) -> &str {
        self.mime_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

/// MIME type for the extensions the vault sees in practice.
pub fn guess_mime_type(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "dcm" => Some("application/dicom"),
        "json" => Some("application/json"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}
