//! Turning stored document bytes into text.

mod pdf;

pub use pdf::pdf_text;

use tracing::debug;

use crate::error::DocumentError;

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Kind of stored document, detected from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Jpeg,
    Png,
    Text,
    Unknown,
}

impl DocumentKind {
    /// Sniff the document kind from its magic bytes.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(b"%PDF") {
            DocumentKind::Pdf
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            DocumentKind::Jpeg
        } else if data.starts_with(b"\x89PNG") {
            DocumentKind::Png
        } else if std::str::from_utf8(data).is_ok() {
            DocumentKind::Text
        } else {
            DocumentKind::Unknown
        }
    }
}

/// Extract the text of a document.
///
/// PDFs go through [`pdf_text`]; UTF-8 documents are returned as is.
/// Images and other binaries have no text layer here and fail with
/// [`DocumentError::NotText`].
pub fn document_text(data: &[u8]) -> Result<String> {
    let kind = DocumentKind::detect(data);
    debug!("Detected document kind {:?} ({} bytes)", kind, data.len());

    match kind {
        DocumentKind::Pdf => pdf_text(data),
        DocumentKind::Text => Ok(String::from_utf8_lossy(data).into_owned()),
        DocumentKind::Jpeg | DocumentKind::Png | DocumentKind::Unknown => {
            Err(DocumentError::NotText)
        }
    }
}
