use anyhow::{Context, Result};
use graph::DanglingPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Everything the pipeline needs, read once at startup. Components
/// receive explicit values from here; nothing reads process state after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub neo4j: Neo4jConfig,
    pub model: ModelConfig,
    /// JSON file defining the closed graph vocabulary.
    pub schema_path: PathBuf,
    pub extraction: ExtractionConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub dangling_policy: DanglingPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum alphanumeric characters before a page's text layer
    /// counts as usable; below this the page is routed to OCR.
    pub min_native_chars: usize,
    /// Header/footer removal threshold (fraction of pages).
    pub max_header_fraction: f32,
    /// Estimated-token budget per model call.
    pub chunk_max_tokens: usize,
    pub tesseract_binary: String,
    pub tesseract_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_documents: usize,
    pub max_concurrent_llm_calls: usize,
    pub max_concurrent_transactions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            neo4j: Neo4jConfig {
                uri: "bolt://localhost:7687".to_string(),
                user: "neo4j".to_string(),
                password: "password".to_string(),
            },
            model: ModelConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3".to_string(),
            },
            schema_path: PathBuf::from("schema.json"),
            extraction: ExtractionConfig {
                min_native_chars: 24,
                max_header_fraction: 0.4,
                chunk_max_tokens: 1500,
                tesseract_binary: "tesseract".to_string(),
                tesseract_language: "eng".to_string(),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_documents: 4,
                max_concurrent_llm_calls: 3,
                max_concurrent_transactions: 4,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10_000,
            },
            dangling_policy: DanglingPolicy::Synthesize,
        }
    }
}

impl Config {
    /// Build the config from environment variables (usually loaded from
    /// a `.env` file by the binary), falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let dangling_policy = match var_or("DANGLING_POLICY", "synthesize").as_str() {
            "synthesize" => DanglingPolicy::Synthesize,
            "reject" => DanglingPolicy::Reject,
            other => anyhow::bail!("DANGLING_POLICY must be 'synthesize' or 'reject', got {other}"),
        };

        Ok(Self {
            neo4j: Neo4jConfig {
                uri: var_or("NEO4J_URI", &defaults.neo4j.uri),
                user: var_or("NEO4J_USER", &defaults.neo4j.user),
                password: var_or("NEO4J_PASSWORD", &defaults.neo4j.password),
            },
            model: ModelConfig {
                base_url: var_or("MODEL_URL", &defaults.model.base_url),
                model: var_or("MODEL_NAME", &defaults.model.model),
            },
            schema_path: PathBuf::from(var_or("GRAPH_SCHEMA_PATH", "schema.json")),
            extraction: ExtractionConfig {
                min_native_chars: parsed_var("MIN_NATIVE_CHARS", defaults.extraction.min_native_chars)?,
                max_header_fraction: parsed_var(
                    "MAX_HEADER_FRACTION",
                    defaults.extraction.max_header_fraction,
                )?,
                chunk_max_tokens: parsed_var("CHUNK_MAX_TOKENS", defaults.extraction.chunk_max_tokens)?,
                tesseract_binary: var_or("TESSERACT_BINARY", &defaults.extraction.tesseract_binary),
                tesseract_language: var_or("TESSERACT_LANG", &defaults.extraction.tesseract_language),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_documents: parsed_var(
                    "MAX_CONCURRENT_DOCUMENTS",
                    defaults.concurrency.max_concurrent_documents,
                )?,
                max_concurrent_llm_calls: parsed_var(
                    "MAX_CONCURRENT_LLM_CALLS",
                    defaults.concurrency.max_concurrent_llm_calls,
                )?,
                max_concurrent_transactions: parsed_var(
                    "MAX_CONCURRENT_TRANSACTIONS",
                    defaults.concurrency.max_concurrent_transactions,
                )?,
            },
            retry: RetryConfig {
                max_retries: parsed_var("MODEL_MAX_RETRIES", defaults.retry.max_retries)?,
                initial_backoff_ms: parsed_var(
                    "MODEL_INITIAL_BACKOFF_MS",
                    defaults.retry.initial_backoff_ms,
                )?,
                max_backoff_ms: parsed_var("MODEL_MAX_BACKOFF_MS", defaults.retry.max_backoff_ms)?,
            },
            dangling_policy,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw.parse().context(format!("Invalid value for {name}")),
        Err(_) => Ok(default),
    }
}
