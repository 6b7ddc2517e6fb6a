use serde::Serialize;

/// Pipeline stage a document failed in, for per-document reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Generation,
    Compilation,
    Write,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DocumentStatus {
    Succeeded {
        nodes_written: usize,
        relationships_written: usize,
        /// Chunks abandoned after the generation retry budget; the
        /// document still succeeded on the remaining chunks.
        chunks_failed: usize,
    },
    Failed {
        stage: Stage,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub doc_id: String,
    pub source: String,
    #[serde(flatten)]
    pub status: DocumentStatus,
}

impl DocumentReport {
    pub fn failed(doc_id: &str, source: &str, stage: Stage, error: impl ToString) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            source: source.to_string(),
            status: DocumentStatus::Failed {
                stage,
                error: error.to_string(),
            },
        }
    }
}

/// Aggregate outcome of one run. Already-succeeded documents are never
/// retried; failures are listed per document with their stage.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub documents: Vec<DocumentReport>,
}

impl RunSummary {
    pub fn push(&mut self, report: DocumentReport) {
        self.documents.push(report);
    }

    pub fn succeeded(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.status, DocumentStatus::Succeeded { .. }))
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents
            .iter()
            .filter(|d| matches!(d.status, DocumentStatus::Failed { .. }))
    }

    pub fn total_nodes(&self) -> usize {
        self.documents
            .iter()
            .filter_map(|d| match d.status {
                DocumentStatus::Succeeded { nodes_written, .. } => Some(nodes_written),
                _ => None,
            })
            .sum()
    }

    pub fn total_relationships(&self) -> usize {
        self.documents
            .iter()
            .filter_map(|d| match d.status {
                DocumentStatus::Succeeded {
                    relationships_written,
                    ..
                } => Some(relationships_written),
                _ => None,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.push(DocumentReport {
            doc_id: "a".to_string(),
            source: "a.pdf".to_string(),
            status: DocumentStatus::Succeeded {
                nodes_written: 3,
                relationships_written: 2,
                chunks_failed: 0,
            },
        });
        summary.push(DocumentReport::failed(
            "b",
            "b.pdf",
            Stage::Generation,
            "model unavailable",
        ));

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed().count(), 1);
        assert_eq!(summary.total_nodes(), 3);
        assert_eq!(summary.total_relationships(), 2);
    }
}
