use crate::error::ModelError;
use crate::llm::ModelClient;
use crate::prompt::{build_extraction_prompt, build_strict_retry_prompt};
use crate::retry::RetryPolicy;
use crate::schema::{ExtractionResult, GraphSchema, RawExtraction};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// Abstracts the call to the generation service: prompt construction,
/// bounded concurrency, retry on transient failure, response parsing,
/// and schema validation. Downstream components never see a payload
/// outside the schema vocabulary.
pub struct ModelGateway {
    client: Arc<dyn ModelClient>,
    schema: Arc<GraphSchema>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl ModelGateway {
    pub fn new(
        client: Arc<dyn ModelClient>,
        schema: Arc<GraphSchema>,
        retry: RetryPolicy,
        max_concurrent_calls: usize,
    ) -> Self {
        Self {
            client,
            schema,
            retry,
            permits: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
        }
    }

    /// Run one chunk through the model and return its schema-validated
    /// extraction. A malformed payload is re-prompted once with the
    /// strict contract, then surfaced as a failure for this chunk only.
    pub async fn generate(&self, chunk_text: &str) -> Result<ExtractionResult, ModelError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ModelError::Unavailable("gateway shut down".to_string()))?;

        let prompt = build_extraction_prompt(chunk_text, &self.schema);
        let payload = self
            .retry
            .retry_transient("model_generate", || self.client.generate(&prompt))
            .await?;

        match parse_payload(&payload) {
            Ok(raw) => Ok(self.schema.validate(raw)),
            Err(first_err) => {
                warn!(error = %first_err, "Malformed model response, re-prompting once");
                let strict = build_strict_retry_prompt(&payload);
                let second = self
                    .retry
                    .retry_transient("model_generate_strict", || self.client.generate(&strict))
                    .await?;
                let raw = parse_payload(&second)?;
                Ok(self.schema.validate(raw))
            }
        }
    }
}

/// Parse the raw model payload, tolerating the usual decoration:
/// markdown code fences around the object and prose before or after
/// the first balanced `{...}` block.
fn parse_payload(payload: &str) -> Result<RawExtraction, ModelError> {
    let stripped = strip_code_fences(payload.trim());
    let json = extract_json_block(stripped);
    serde_json::from_str(json).map_err(|e| ModelError::Malformed(e.to_string()))
}

fn strip_code_fences(payload: &str) -> &str {
    let Some(rest) = payload.strip_prefix("```") else {
        return payload;
    };
    // Drop the fence line (which may carry a language tag) and the
    // closing fence.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.rsplit_once("```").map(|(body, _)| body).unwrap_or(rest)
}

/// Return the first balanced `{...}` block; crude, but recovers
/// payloads where the model echoed prose around the object.
fn extract_json_block(payload: &str) -> &str {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in payload.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return &payload[s..=i];
                    }
                }
            }
            _ => {}
        }
    }
    payload
}
