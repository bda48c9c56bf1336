//! PDF text via lopdf (structure and decryption) and pdf-extract (text).

use std::borrow::Cow;

use lopdf::Document;
use tracing::debug;

use super::Result;
use crate::error::DocumentError;

/// Text of a PDF, in page order.
///
/// Files protected only by an empty user password are opened; any other
/// encryption is refused. A file with no pages is rejected.
pub fn pdf_text(data: &[u8]) -> Result<String> {
    let bytes = readable_bytes(data)?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| DocumentError::TextExtraction(e.to_string()))?;

    debug!("Extracted {} characters of PDF text", text.len());
    Ok(text)
}

/// Bytes pdf-extract can read: the input itself, or a decrypted re-encoding.
fn readable_bytes(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    let mut doc = Document::load_mem(data).map_err(|e| DocumentError::Parse(e.to_string()))?;

    let encrypted = doc.is_encrypted();
    if encrypted {
        doc.decrypt("").map_err(|_| DocumentError::Encrypted)?;
    }

    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(DocumentError::NoPages);
    }

    if !encrypted {
        debug!("PDF has {} pages", pages);
        return Ok(Cow::Borrowed(data));
    }

    let mut decrypted = Vec::new();
    doc.save_to(&mut decrypted)
        .map_err(|e| DocumentError::Parse(format!("cannot re-encode decrypted PDF: {}", e)))?;
    debug!("Opened {}-page PDF with an empty password", pages);
    Ok(Cow::Owned(decrypted))
}
