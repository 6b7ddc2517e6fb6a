use thiserror::Error;

/// Generation-tier failures. `Unavailable` and `RateLimited` are
/// transient and retried with backoff; `Malformed` gets exactly one
/// strict re-prompt before the chunk is abandoned.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model service unavailable: {0}")]
    Unavailable(String),

    #[error("Model service rate limited")]
    RateLimited,

    #[error("Malformed model response: {0}")]
    Malformed(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Unavailable(_) | ModelError::RateLimited)
    }
}
