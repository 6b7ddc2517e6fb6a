use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Text recognized from one image, with the mean word confidence the
/// backend reported (0.0 to 1.0).
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
}

/// OCR backend seam. The pipeline only needs "image bytes in, text and
/// confidence out"; tests substitute a mock.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<OcrOutput>;
}

/// Tesseract invoked as a subprocess, reading the image from stdin and
/// emitting TSV so word confidences come back alongside the text.
pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(binary: String, language: String) -> Self {
        Self { binary, language }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract".to_string(), "eng".to_string())
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &[u8]) -> Result<OcrOutput> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn tesseract")?;

        let mut stdin = child
            .stdin
            .take()
            .context("Failed to open tesseract stdin")?;
        stdin
            .write_all(image)
            .await
            .context("Failed to pipe image to tesseract")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to read tesseract output")?;
        if !output.status.success() {
            anyhow::bail!("tesseract exited with {}", output.status);
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Reassemble line-broken text from Tesseract's TSV output and average
/// the per-word confidences. Column layout:
/// level page block par line word left top width height conf text
pub(crate) fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut text = String::new();
    let mut current_line: Option<(u32, u32, u32)> = None;
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let line_key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        match current_line {
            Some(prev) if prev == line_key => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        current_line = Some(line_key);
        text.push_str(word);

        if let Ok(conf) = cols[10].parse::<f32>() {
            if conf >= 0.0 {
                conf_sum += conf / 100.0;
                conf_count += 1;
            }
        }
    }

    let confidence = if conf_count > 0 {
        conf_sum / conf_count as f32
    } else {
        0.0
    };
    OcrOutput { text, confidence }
}
