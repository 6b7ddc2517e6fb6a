use crate::error::ExtractError;
use regex::Regex;
use std::io::{Cursor, Read};

/// Extract paragraph text from a DOCX container.
///
/// A DOCX file is a zip archive whose main body lives in
/// `word/document.xml`; paragraphs are `<w:p>` elements and the visible
/// text sits in `<w:t>` runs. Runs are concatenated per paragraph and
/// empty paragraphs dropped, matching reading order.
pub fn extract_paragraphs(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::CorruptDocument(format!("DOCX open failed: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::CorruptDocument("DOCX has no word/document.xml".to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::CorruptDocument(format!("DOCX body unreadable: {e}")))?;

    let run = Regex::new(r"<w:t[^>]*>([^<]*)</w:t>").unwrap();

    let mut paragraphs = Vec::new();
    for para_xml in xml.split("</w:p>") {
        let mut text = String::new();
        for cap in run.captures_iter(para_xml) {
            text.push_str(&unescape_xml(&cap[1]));
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            paragraphs.push(trimmed.to_string());
        }
    }

    Ok(paragraphs)
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
