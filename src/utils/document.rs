//! Manuscript loading.
//!
//! A [`Document`] is plain text whose byte offsets stay stable for the whole
//! analysis; claim spans and citation insertions refer to these offsets.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::Span;

/// Errors from loading a manuscript
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported document type: {0} (supported: txt, md)")]
    Unsupported(String),

    #[error("Document is empty")]
    Empty,
}

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// A manuscript as plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
    source: Option<PathBuf>,
}

impl Document {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
        }
    }

    /// Load a `.txt` or `.md` manuscript
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(DocumentError::Unsupported(extension));
        }

        let bytes = std::fs::read(path)?;
        let text = decode(&bytes);
        if text.trim().is_empty() {
            return Err(DocumentError::Empty);
        }
        tracing::debug!(path = %path.display(), bytes = text.len(), "loaded manuscript");

        Ok(Self {
            text,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn slice(&self, span: Span) -> Option<&str> {
        span.slice(&self.text)
    }

    /// 1-based line number containing `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        let end = offset.min(self.text.len());
        self.text.as_bytes()[..end]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Decode manuscript bytes: UTF-8 (BOM stripped), UTF-16 with BOM, else Latin-1
pub fn decode(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            tracing::debug!("manuscript is not UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
