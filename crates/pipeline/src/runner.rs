use crate::report::{DocumentReport, DocumentStatus, RunSummary, Stage};
use extract::{ExtractionResult, ModelGateway};
use graph::{DanglingPolicy, GraphOperation, GraphWriter};
use ingest::{Chunker, ContentExtractor, Document, ExtractedContent};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// The per-document stage chain up to (but not including) the graph
/// write, so the whole extraction path is exercisable without a store.
pub struct Stages {
    pub extractor: ContentExtractor,
    pub chunker: Chunker,
    pub gateway: ModelGateway,
    pub dangling_policy: DanglingPolicy,
    pub schema: Arc<extract::GraphSchema>,
}

/// A compiled batch plus how many chunks were abandoned on the way.
#[derive(Debug)]
pub struct CompiledBatch {
    pub operations: Vec<GraphOperation>,
    pub chunks_failed: usize,
}

impl Stages {
    /// Extract → chunk → generate → compile for one document. Chunk
    /// failures are partial: a chunk abandoned after its retry budget
    /// only costs its own extraction, unless every chunk failed.
    pub async fn compile_document(
        &self,
        document: &Document,
    ) -> Result<CompiledBatch, (Stage, String)> {
        let content = self
            .extractor
            .extract(document)
            .await
            .map_err(|e| (Stage::Extraction, e.to_string()))?;

        self.compile_content(&content).await
    }

    pub async fn compile_content(
        &self,
        content: &ExtractedContent,
    ) -> Result<CompiledBatch, (Stage, String)> {
        let chunks = self.chunker.chunk(content);
        if chunks.is_empty() {
            return Err((
                Stage::Extraction,
                "document yielded no text chunks".to_string(),
            ));
        }

        let mut results: Vec<ExtractionResult> = Vec::with_capacity(chunks.len());
        let mut chunks_failed = 0usize;
        let mut last_error = String::new();
        for chunk in &chunks {
            match self.gateway.generate(&chunk.text).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(
                        doc_id = %chunk.doc_id,
                        chunk = chunk.index,
                        error = %e,
                        "Chunk extraction abandoned"
                    );
                    chunks_failed += 1;
                    last_error = e.to_string();
                }
            }
        }

        if results.is_empty() {
            return Err((Stage::Generation, last_error));
        }

        let operations = graph::compile(&results, &self.schema, self.dangling_policy)
            .map_err(|e| (Stage::Compilation, e.to_string()))?;

        Ok(CompiledBatch {
            operations,
            chunks_failed,
        })
    }
}

pub struct Pipeline {
    pub stages: Stages,
    pub writer: GraphWriter,
}

impl Pipeline {
    /// Run one document end to end and report its outcome. Never
    /// panics or propagates: a document's failure must not take down
    /// its siblings.
    pub async fn process_document(&self, document: &Document) -> DocumentReport {
        let batch = match self.stages.compile_document(document).await {
            Ok(batch) => batch,
            Err((stage, error)) => {
                return DocumentReport::failed(&document.id, &document.source, stage, error);
            }
        };

        match self.writer.apply(&document.id, &batch.operations).await {
            Ok(report) => {
                info!(
                    doc_id = %document.id,
                    source = %document.source,
                    nodes = report.nodes_written,
                    relationships = report.relationships_written,
                    "Document written"
                );
                DocumentReport {
                    doc_id: document.id.clone(),
                    source: document.source.clone(),
                    status: DocumentStatus::Succeeded {
                        nodes_written: report.nodes_written,
                        relationships_written: report.relationships_written,
                        chunks_failed: batch.chunks_failed,
                    },
                }
            }
            Err(e) => DocumentReport::failed(&document.id, &document.source, Stage::Write, e),
        }
    }
}

/// Process documents independently under a concurrency cap. No ordering
/// is guaranteed between documents; aborting the returned future before
/// a document's transaction commits leaves nothing applied for it.
pub async fn run_with_cap(
    pipeline: Arc<Pipeline>,
    documents: Vec<Document>,
    max_concurrent_documents: usize,
) -> RunSummary {
    let permits = Arc::new(Semaphore::new(max_concurrent_documents.max(1)));
    let mut tasks = JoinSet::new();

    for document in documents {
        let pipeline = pipeline.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return DocumentReport::failed(
                        &document.id,
                        &document.source,
                        Stage::Write,
                        "run cancelled before start",
                    );
                }
            };
            pipeline.process_document(&document).await
        });
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => summary.push(report),
            Err(e) => warn!(error = %e, "Document task aborted"),
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{GraphSchema, MockClient, RetryPolicy};
    use async_trait::async_trait;
    use ingest::{ChunkerConfig, ExtractorConfig, OcrEngine, OcrOutput, PageText};

    struct NoOcr;

    #[async_trait]
    impl OcrEngine for NoOcr {
        async fn recognize(&self, _image: &[u8]) -> anyhow::Result<OcrOutput> {
            anyhow::bail!("no OCR in this test")
        }
    }

    fn schema() -> Arc<GraphSchema> {
        Arc::new(
            GraphSchema::from_json(
                r#"{
                    "nodes": {
                        "Person": ["name"],
                        "Organization": ["name"],
                        "City": ["name"]
                    },
                    "relationships": {
                        "WORKS_AT": [["Person", "Organization"]],
                        "LOCATED_IN": [["Organization", "City"]]
                    }
                }"#,
            )
            .unwrap(),
        )
    }

    fn stages(responses: Vec<Result<String, extract::ModelError>>) -> Stages {
        let schema = schema();
        Stages {
            extractor: ContentExtractor::new(Arc::new(NoOcr), ExtractorConfig::default()),
            chunker: Chunker::new(ChunkerConfig::default()),
            gateway: ModelGateway::new(
                Arc::new(MockClient::new(responses)),
                schema.clone(),
                RetryPolicy::new(1, 1, 2),
                2,
            ),
            dangling_policy: DanglingPolicy::Synthesize,
            schema,
        }
    }

    fn scanned_two_pages() -> ExtractedContent {
        ExtractedContent::new(
            "doc-1".to_string(),
            vec![
                PageText::ocr(0, "Alice works at Acme Corp".to_string(), 0.9),
                PageText::ocr(1, "Acme Corp is located in Springfield".to_string(), 0.88),
            ],
        )
    }

    const SCENARIO: &str = r#"{
        "nodes": [
            {"label": "Person", "key": "alice", "properties": {"name": "Alice"}},
            {"label": "Organization", "key": "acme corp", "properties": {"name": "Acme Corp"}},
            {"label": "City", "key": "springfield", "properties": {"name": "Springfield"}}
        ],
        "relationships": [
            {"type": "WORKS_AT",
             "source": {"label": "Person", "key": "alice"},
             "target": {"label": "Organization", "key": "acme corp"}},
            {"type": "LOCATED_IN",
             "source": {"label": "Organization", "key": "acme corp"},
             "target": {"label": "City", "key": "springfield"}}
        ]
    }"#;

    #[tokio::test]
    async fn test_scanned_document_end_to_end_counts() {
        let stages = stages(vec![Ok(SCENARIO.to_string())]);
        let batch = stages.compile_content(&scanned_two_pages()).await.unwrap();

        let nodes = batch
            .operations
            .iter()
            .filter(|op| matches!(op, GraphOperation::UpsertNode { .. }))
            .count();
        let relationships = batch.operations.len() - nodes;
        assert_eq!(nodes, 3);
        assert_eq!(relationships, 2);
        assert_eq!(batch.chunks_failed, 0);
    }

    #[tokio::test]
    async fn test_rerun_compiles_identical_batch() {
        let first = stages(vec![Ok(SCENARIO.to_string())]);
        let second = stages(vec![Ok(SCENARIO.to_string())]);

        let a = first.compile_content(&scanned_two_pages()).await.unwrap();
        let b = second.compile_content(&scanned_two_pages()).await.unwrap();

        // Identical input re-run produces the identical MERGE batch, so
        // the store gains no additional nodes or relationships.
        assert_eq!(a.operations, b.operations);
    }

    #[tokio::test]
    async fn test_all_chunks_failing_fails_generation_stage() {
        // Retry budget of 1 with a persistent transient error.
        let stages = stages(vec![
            Err(extract::ModelError::RateLimited),
            Err(extract::ModelError::RateLimited),
        ]);
        let err = stages
            .compile_content(&scanned_two_pages())
            .await
            .unwrap_err();
        assert_eq!(err.0, Stage::Generation);
    }

    #[tokio::test]
    async fn test_empty_content_fails_extraction_stage() {
        let stages = stages(vec![]);
        let content = ExtractedContent::new("doc-1".to_string(), vec![PageText::failed(0)]);
        let err = stages.compile_content(&content).await.unwrap_err();
        assert_eq!(err.0, Stage::Extraction);
    }
}
