use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Image,
}

/// A source document as read from the input location. Immutable once
/// constructed; discarded after extraction.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable content-hash identifier (hex SHA-256 prefix).
    pub id: String,
    /// Original path or name, kept for reporting.
    pub source: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(source: String, bytes: Vec<u8>) -> Result<Self, ExtractError> {
        let kind = detect_kind(&source, &bytes)
            .ok_or_else(|| ExtractError::UnsupportedFormat(source.clone()))?;
        let id = generate_doc_id(&bytes);
        Ok(Self {
            id,
            source,
            kind,
            bytes,
        })
    }
}

/// Generate a stable document ID from the content bytes, so the same
/// file ingested twice maps to the same identifier regardless of path.
pub fn generate_doc_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Detect the document kind from the file extension, falling back to
/// magic bytes when the extension is missing or ambiguous.
pub fn detect_kind(source: &str, bytes: &[u8]) -> Option<DocumentKind> {
    let ext = source
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => return Some(DocumentKind::Pdf),
        "docx" | "doc" => return Some(DocumentKind::Docx),
        "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" => return Some(DocumentKind::Image),
        _ => {}
    }

    if bytes.starts_with(b"%PDF-") {
        return Some(DocumentKind::Pdf);
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G'])
        || bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"II*\0")
        || bytes.starts_with(b"MM\0*")
        || bytes.starts_with(b"BM")
    {
        return Some(DocumentKind::Image);
    }
    // Bare zip container with no extension hint is not enough to call
    // it a DOCX.
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect_kind("a/b/report.pdf", b""), Some(DocumentKind::Pdf));
        assert_eq!(detect_kind("notes.DOCX", b""), Some(DocumentKind::Docx));
        assert_eq!(detect_kind("scan.jpeg", b""), Some(DocumentKind::Image));
        assert_eq!(detect_kind("data.csv", b""), None);
    }

    #[test]
    fn test_detect_by_magic_bytes() {
        assert_eq!(
            detect_kind("upload", b"%PDF-1.7 rest"),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            detect_kind("upload", &[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(DocumentKind::Image)
        );
    }

    #[test]
    fn test_doc_id_is_content_addressed() {
        let a = generate_doc_id(b"same bytes");
        let b = generate_doc_id(b"same bytes");
        let c = generate_doc_id(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }
}
