use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// The closed vocabulary the model is allowed to emit: node labels with
/// their property keys, and relationship types with their permitted
/// (source-label, target-label) pairs. Loaded once at startup and
/// shared read-only for the pipeline's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSchema {
    /// Label -> allowed property keys. The natural key property is
    /// implicit and always allowed.
    pub nodes: BTreeMap<String, Vec<String>>,
    /// Relationship type -> allowed endpoint label pairs.
    pub relationships: BTreeMap<String, Vec<(String, String)>>,
}

impl GraphSchema {
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: GraphSchema =
            serde_json::from_str(json).context("Failed to parse graph schema")?;
        schema.check()?;
        Ok(schema)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read schema file: {:?}", path))?;
        Self::from_json(&json)
    }

    fn check(&self) -> Result<()> {
        if self.nodes.is_empty() {
            anyhow::bail!("Graph schema defines no node labels");
        }
        for (rel_type, pairs) in &self.relationships {
            if pairs.is_empty() {
                anyhow::bail!("Relationship type {rel_type} has no endpoint pairs");
            }
            for (source, target) in pairs {
                if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
                    anyhow::bail!(
                        "Relationship type {rel_type} references unknown label in ({source}, {target})"
                    );
                }
            }
        }
        Ok(())
    }

    pub fn allows_label(&self, label: &str) -> bool {
        self.nodes.contains_key(label)
    }

    pub fn allows_property(&self, label: &str, key: &str) -> bool {
        self.nodes
            .get(label)
            .map(|keys| keys.iter().any(|k| k == key))
            .unwrap_or(false)
    }

    pub fn allows_relationship(&self, rel_type: &str, source: &str, target: &str) -> bool {
        self.relationships
            .get(rel_type)
            .map(|pairs| pairs.iter().any(|(s, t)| s == source && t == target))
            .unwrap_or(false)
    }

    /// Validate a raw model payload into the closed vocabulary. The
    /// model is an untrusted producer: anything outside the schema is
    /// dropped with a warning, never treated as fatal.
    pub fn validate(&self, raw: RawExtraction) -> ExtractionResult {
        let mut nodes = Vec::new();
        for node in raw.nodes {
            if node.key.trim().is_empty() {
                warn!(label = %node.label, "Dropping node with empty natural key");
                continue;
            }
            if !self.allows_label(&node.label) {
                warn!(label = %node.label, key = %node.key, "Dropping node with out-of-schema label");
                continue;
            }
            let mut properties = Map::new();
            for (key, value) in node.properties {
                if self.allows_property(&node.label, &key) {
                    properties.insert(key, value);
                } else {
                    warn!(label = %node.label, property = %key, "Dropping out-of-schema property");
                }
            }
            nodes.push(ProposedNode {
                label: node.label,
                key: node.key.trim().to_string(),
                properties,
            });
        }

        let mut relationships = Vec::new();
        for rel in raw.relationships {
            if rel.source.key.trim().is_empty() || rel.target.key.trim().is_empty() {
                warn!(rel_type = %rel.rel_type, "Dropping relationship with empty endpoint key");
                continue;
            }
            if !self.allows_relationship(&rel.rel_type, &rel.source.label, &rel.target.label) {
                warn!(
                    rel_type = %rel.rel_type,
                    source_label = %rel.source.label,
                    target_label = %rel.target.label,
                    "Dropping out-of-schema relationship"
                );
                continue;
            }
            relationships.push(ProposedRelationship {
                rel_type: rel.rel_type,
                source: NodeRef {
                    label: rel.source.label,
                    key: rel.source.key.trim().to_string(),
                },
                target: NodeRef {
                    label: rel.target.label,
                    key: rel.target.key.trim().to_string(),
                },
                properties: rel.properties,
            });
        }

        ExtractionResult {
            nodes,
            relationships,
        }
    }
}

/// The model's payload as deserialized, before schema validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    pub label: String,
    pub key: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRef {
    pub label: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRelationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub source: RawRef,
    pub target: RawRef,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A schema-validated reference to a node by natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedNode {
    pub label: String,
    pub key: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedRelationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub source: NodeRef,
    pub target: NodeRef,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// The validated output of one model call: every label and type is a
/// member of the schema vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub nodes: Vec<ProposedNode>,
    pub relationships: Vec<ProposedRelationship>,
}

#[cfg(test)]
pub(crate) fn test_schema() -> GraphSchema {
    GraphSchema::from_json(
        r#"{
            "nodes": {
                "Person": ["name", "title"],
                "Organization": ["name", "founded"],
                "City": ["name"]
            },
            "relationships": {
                "WORKS_AT": [["Person", "Organization"]],
                "LOCATED_IN": [["Organization", "City"]]
            }
        }"#,
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawExtraction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_schema_rejects_unknown_endpoint_labels() {
        let err = GraphSchema::from_json(
            r#"{"nodes": {"Person": []}, "relationships": {"WORKS_AT": [["Person", "Ghost"]]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("WORKS_AT"));
    }

    #[test]
    fn test_out_of_schema_label_is_filtered() {
        let schema = test_schema();
        let result = schema.validate(raw(json!({
            "nodes": [
                {"label": "Person", "key": "alice", "properties": {"name": "Alice"}},
                {"label": "Spaceship", "key": "enterprise"}
            ],
            "relationships": []
        })));
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].key, "alice");
    }

    #[test]
    fn test_out_of_schema_property_is_filtered() {
        let schema = test_schema();
        let result = schema.validate(raw(json!({
            "nodes": [{"label": "City", "key": "springfield",
                       "properties": {"name": "Springfield", "mayor": "Quimby"}}],
            "relationships": []
        })));
        assert!(result.nodes[0].properties.contains_key("name"));
        assert!(!result.nodes[0].properties.contains_key("mayor"));
    }

    #[test]
    fn test_bad_endpoint_pair_is_filtered() {
        let schema = test_schema();
        let result = schema.validate(raw(json!({
            "nodes": [],
            "relationships": [
                {"type": "WORKS_AT",
                 "source": {"label": "City", "key": "springfield"},
                 "target": {"label": "Organization", "key": "acme corp"}},
                {"type": "WORKS_AT",
                 "source": {"label": "Person", "key": "alice"},
                 "target": {"label": "Organization", "key": "acme corp"}}
            ]
        })));
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].source.key, "alice");
    }

    #[test]
    fn test_empty_natural_key_is_filtered() {
        let schema = test_schema();
        let result = schema.validate(raw(json!({
            "nodes": [{"label": "Person", "key": "  "}],
            "relationships": []
        })));
        assert!(result.nodes.is_empty());
    }
}
