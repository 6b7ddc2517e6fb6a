use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
}

/// Text recovered from one page, in source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// Zero-based page index in source order.
    pub index: usize,
    pub text: String,
    pub method: ExtractionMethod,
    /// 1.0 for native text; mean OCR word confidence otherwise.
    /// 0.0 marks a page whose OCR attempt failed.
    pub confidence: f32,
}

impl PageText {
    pub fn native(index: usize, text: String) -> Self {
        Self {
            index,
            text,
            method: ExtractionMethod::Native,
            confidence: 1.0,
        }
    }

    pub fn ocr(index: usize, text: String, confidence: f32) -> Self {
        Self {
            index,
            text,
            method: ExtractionMethod::Ocr,
            confidence,
        }
    }

    /// An empty block standing in for a page whose OCR attempt failed.
    pub fn failed(index: usize) -> Self {
        Self {
            index,
            text: String::new(),
            method: ExtractionMethod::Ocr,
            confidence: 0.0,
        }
    }
}

/// Ordered per-page extraction output for one document. Page order
/// matches the source; downstream coreference resolution depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub doc_id: String,
    pub pages: Vec<PageText>,
}

impl ExtractedContent {
    pub fn new(doc_id: String, pages: Vec<PageText>) -> Self {
        Self { doc_id, pages }
    }

    /// True when at least one page carries non-whitespace text.
    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|p| !p.text.trim().is_empty())
    }

    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.len()).sum()
    }
}
