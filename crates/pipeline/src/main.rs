mod config;
mod report;
mod runner;

use anyhow::{Context, Result};
use config::Config;
use extract::{GraphSchema, ModelGateway, OllamaClient, RetryPolicy};
use graph::GraphWriter;
use ingest::{Chunker, ChunkerConfig, ContentExtractor, ExtractorConfig, TesseractOcr};
use report::DocumentStatus;
use runner::{Pipeline, Stages, run_with_cap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let input = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "samples".to_string()),
    );

    // Missing schema or unreachable store is a misconfiguration; abort
    // before touching any document.
    let schema = Arc::new(GraphSchema::load(&config.schema_path).await?);
    let writer = GraphWriter::connect(
        &config.neo4j.uri,
        &config.neo4j.user,
        &config.neo4j.password,
        config.concurrency.max_concurrent_transactions,
    )
    .await
    .context("Graph store unreachable at startup")?;
    writer.init_constraints(&schema).await?;

    let gateway = ModelGateway::new(
        Arc::new(OllamaClient::new(
            config.model.base_url.clone(),
            config.model.model.clone(),
        )),
        schema.clone(),
        RetryPolicy::new(
            config.retry.max_retries,
            config.retry.initial_backoff_ms,
            config.retry.max_backoff_ms,
        ),
        config.concurrency.max_concurrent_llm_calls,
    );

    let extractor = ContentExtractor::new(
        Arc::new(TesseractOcr::new(
            config.extraction.tesseract_binary.clone(),
            config.extraction.tesseract_language.clone(),
        )),
        ExtractorConfig {
            min_native_chars: config.extraction.min_native_chars,
            max_header_fraction: config.extraction.max_header_fraction,
        },
    );

    let pipeline = Arc::new(Pipeline {
        stages: Stages {
            extractor,
            chunker: Chunker::new(ChunkerConfig {
                max_tokens: config.extraction.chunk_max_tokens,
            }),
            gateway,
            dangling_policy: config.dangling_policy,
            schema,
        },
        writer,
    });

    let documents = load_documents(&input).await?;
    if documents.is_empty() {
        anyhow::bail!("No ingestible documents found at {:?}", input);
    }
    info!(count = documents.len(), input = %input.display(), "Starting run");

    let summary = run_with_cap(
        pipeline,
        documents,
        config.concurrency.max_concurrent_documents,
    )
    .await;

    println!(
        "\n{} document(s) succeeded, {} failed; {} nodes and {} relationships written.",
        summary.succeeded(),
        summary.failed().count(),
        summary.total_nodes(),
        summary.total_relationships(),
    );
    for report in &summary.documents {
        match &report.status {
            DocumentStatus::Succeeded {
                nodes_written,
                relationships_written,
                chunks_failed,
            } => {
                let note = if *chunks_failed > 0 {
                    format!(" ({chunks_failed} chunk(s) abandoned)")
                } else {
                    String::new()
                };
                println!(
                    "  ok   {}: {} nodes, {} relationships{}",
                    report.source, nodes_written, relationships_written, note
                );
            }
            DocumentStatus::Failed { stage, error } => {
                println!("  FAIL {}: {:?} stage: {}", report.source, stage, error);
            }
        }
    }

    Ok(())
}

async fn load_documents(input: &Path) -> Result<Vec<ingest::Document>> {
    if input.is_file() {
        Ok(vec![ingest::read_document(input).await?])
    } else {
        ingest::read_directory(input).await
    }
}
