use crate::content::ExtractedContent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Estimated-token budget per model call.
    pub max_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_tokens: 1500 }
    }
}

/// A model-call-sized slice of one document, in page order. Chunks of
/// the same document are extracted independently and merged before
/// compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub doc_id: String,
    /// Chunk position within the document; merge order follows this.
    pub index: usize,
    pub text: String,
    /// Inclusive page index range the chunk covers.
    pub pages: (usize, usize),
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split extracted content on page boundaries into ordered chunks
    /// that fit the token budget. A single page that exceeds the budget
    /// on its own is further split on paragraph breaks.
    pub fn chunk(&self, content: &ExtractedContent) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut range_start = 0usize;
        let mut last_page = 0usize;

        for page in &content.pages {
            let text = page.text.trim();
            if text.is_empty() {
                continue;
            }

            if estimate_tokens(text) > self.config.max_tokens {
                // Flush whatever preceded the oversized page.
                self.flush(&mut chunks, content, &mut buffer, range_start, last_page);
                self.chunk_oversized_page(&mut chunks, content, page.index, text);
                range_start = page.index + 1;
                continue;
            }

            if !buffer.is_empty()
                && estimate_tokens(&buffer) + estimate_tokens(text) > self.config.max_tokens
            {
                self.flush(&mut chunks, content, &mut buffer, range_start, last_page);
                range_start = page.index;
            }
            if buffer.is_empty() {
                range_start = page.index;
            } else {
                buffer.push_str("\n\n");
            }
            buffer.push_str(text);
            last_page = page.index;
        }

        self.flush(&mut chunks, content, &mut buffer, range_start, last_page);
        chunks
    }

    fn flush(
        &self,
        chunks: &mut Vec<DocumentChunk>,
        content: &ExtractedContent,
        buffer: &mut String,
        first_page: usize,
        last_page: usize,
    ) {
        if buffer.trim().is_empty() {
            buffer.clear();
            return;
        }
        chunks.push(DocumentChunk {
            doc_id: content.doc_id.clone(),
            index: chunks.len(),
            text: std::mem::take(buffer),
            pages: (first_page, last_page),
        });
    }

    fn chunk_oversized_page(
        &self,
        chunks: &mut Vec<DocumentChunk>,
        content: &ExtractedContent,
        page_index: usize,
        text: &str,
    ) {
        let mut buffer = String::new();
        for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if !buffer.is_empty()
                && estimate_tokens(&buffer) + estimate_tokens(para) > self.config.max_tokens
            {
                chunks.push(DocumentChunk {
                    doc_id: content.doc_id.clone(),
                    index: chunks.len(),
                    text: std::mem::take(&mut buffer),
                    pages: (page_index, page_index),
                });
            }
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
            }
            buffer.push_str(para);
        }
        if !buffer.is_empty() {
            chunks.push(DocumentChunk {
                doc_id: content.doc_id.clone(),
                index: chunks.len(),
                text: buffer,
                pages: (page_index, page_index),
            });
        }
    }
}

/// Rough token estimate: ~1.3 tokens per whitespace-separated word.
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 * 1.3) as usize
}
