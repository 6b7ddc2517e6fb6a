use crate::error::CompileError;
use extract::{ExtractionResult, GraphSchema, NodeRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// One idempotent upsert against the graph store, keyed by natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphOperation {
    UpsertNode {
        label: String,
        key: String,
        properties: Map<String, Value>,
    },
    UpsertRelationship {
        rel_type: String,
        source: NodeRef,
        target: NodeRef,
        properties: Map<String, Value>,
    },
}

/// What to do with a relationship endpoint that was never proposed as a
/// node in the same document. Synthesis (the default) emits a minimal
/// node carrying only the natural key, so no extracted relationship is
/// silently lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DanglingPolicy {
    #[default]
    Synthesize,
    Reject,
}

/// Merge one document's chunk-level extraction results into a single
/// batch of graph operations.
///
/// Nodes sharing a (label, natural key) merge by property union with
/// later chunks winning conflicting keys, except explicit nulls never
/// overwrite a concrete value. All node upserts precede all
/// relationship upserts, and the batch is sorted by natural key so
/// identical inputs compile to an identical batch.
pub fn compile(
    results: &[ExtractionResult],
    schema: &GraphSchema,
    policy: DanglingPolicy,
) -> Result<Vec<GraphOperation>, CompileError> {
    let mut nodes: BTreeMap<(String, String), Map<String, Value>> = BTreeMap::new();
    let mut relationships: BTreeMap<(String, String, String, String, String), Map<String, Value>> =
        BTreeMap::new();

    for result in results {
        for node in &result.nodes {
            if !schema.allows_label(&node.label) {
                return Err(CompileError::SchemaViolation(format!(
                    "node label {} is outside the schema",
                    node.label
                )));
            }
            let merged = nodes
                .entry((node.label.clone(), node.key.clone()))
                .or_default();
            merge_properties(merged, &node.properties);
        }

        for rel in &result.relationships {
            if !schema.allows_relationship(&rel.rel_type, &rel.source.label, &rel.target.label) {
                return Err(CompileError::SchemaViolation(format!(
                    "relationship {} ({} -> {}) is outside the schema",
                    rel.rel_type, rel.source.label, rel.target.label
                )));
            }
            let merged = relationships
                .entry((
                    rel.rel_type.clone(),
                    rel.source.label.clone(),
                    rel.source.key.clone(),
                    rel.target.label.clone(),
                    rel.target.key.clone(),
                ))
                .or_default();
            merge_properties(merged, &rel.properties);
        }
    }

    // Resolve endpoints against the merged node set.
    for (rel_type, src_label, src_key, tgt_label, tgt_key) in relationships.keys() {
        for (label, key) in [(src_label, src_key), (tgt_label, tgt_key)] {
            let endpoint = (label.clone(), key.clone());
            if nodes.contains_key(&endpoint) {
                continue;
            }
            match policy {
                DanglingPolicy::Synthesize => {
                    debug!(label = %label, key = %key, "Synthesizing endpoint node");
                    nodes.insert(endpoint, Map::new());
                }
                DanglingPolicy::Reject => {
                    return Err(CompileError::DanglingReference(format!(
                        "relationship {rel_type} references {label} '{key}' which no chunk proposed as a node"
                    )));
                }
            }
        }
    }

    let mut operations: Vec<GraphOperation> = nodes
        .into_iter()
        .map(|((label, key), properties)| GraphOperation::UpsertNode {
            label,
            key,
            properties,
        })
        .collect();
    operations.extend(relationships.into_iter().map(
        |((rel_type, src_label, src_key, tgt_label, tgt_key), properties)| {
            GraphOperation::UpsertRelationship {
                rel_type,
                source: NodeRef {
                    label: src_label,
                    key: src_key,
                },
                target: NodeRef {
                    label: tgt_label,
                    key: tgt_key,
                },
                properties,
            }
        },
    ));

    Ok(operations)
}

/// Last-writer-wins property union; explicit nulls never clobber a
/// concrete value.
fn merge_properties(into: &mut Map<String, Value>, from: &Map<String, Value>) {
    for (key, value) in from {
        if value.is_null() && into.get(key).map(|v| !v.is_null()).unwrap_or(false) {
            continue;
        }
        into.insert(key.clone(), value.clone());
    }
}
