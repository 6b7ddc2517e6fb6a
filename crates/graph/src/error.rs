use thiserror::Error;

/// Compilation-tier failures. Not retryable: they mean the model
/// response was out of contract even after validation, or an endpoint
/// could not be resolved under the configured policy.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Dangling reference: {0}")]
    DanglingReference(String),
}

/// Write-tier failures. A conflict is retried once per document batch;
/// connection errors at startup are fatal for the run.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Graph store connection error: {0}")]
    Connection(String),
}
