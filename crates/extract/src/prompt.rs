use crate::schema::GraphSchema;
use std::fmt::Write;

/// Build the extraction prompt for one chunk. Deterministic for
/// identical inputs so retries are idempotent: schema maps are sorted
/// (BTreeMap) and nothing random is injected.
pub fn build_extraction_prompt(chunk_text: &str, schema: &GraphSchema) -> String {
    format!(
        r#"Extract entities and relationships from the following text.

INSTRUCTIONS:
1. Identify entities and the relationships between them
2. Only use the node labels and relationship types listed below
3. Output ONLY valid JSON, nothing else
4. Use the exact output schema below

ALLOWED NODE LABELS:
{labels}
ALLOWED RELATIONSHIP TYPES (source label -> target label):
{rel_types}
OUTPUT SCHEMA:
{{
  "nodes": [
    {{"label": "<allowed label>", "key": "<natural key: the entity's canonical name>", "properties": {{"<allowed property>": "value"}}}}
  ],
  "relationships": [
    {{"type": "<allowed type>", "source": {{"label": "<label>", "key": "<key>"}}, "target": {{"label": "<label>", "key": "<key>"}}, "properties": {{}}}}
  ]
}}

RULES:
- The "key" is the entity's canonical name; reuse the exact same key for repeat mentions
- Every node label, property key, and relationship type must come from the lists above
- Relationships are directed from source to target
- Output ONLY the JSON object, no markdown, no code fences, no explanations

TEXT:
{chunk_text}

JSON OUTPUT:"#,
        labels = describe_labels(schema),
        rel_types = describe_relationships(schema),
    )
}

/// One-shot re-prompt after a malformed response: same contract, the
/// broken payload quoted back, and nothing else.
pub fn build_strict_retry_prompt(invalid_payload: &str) -> String {
    format!(
        r#"The following response was not valid JSON:

{invalid_payload}

Return the same extraction as a single valid JSON object with "nodes" and
"relationships" arrays. No markdown formatting, no code fences, no
explanations. Just the raw JSON object."#
    )
}

fn describe_labels(schema: &GraphSchema) -> String {
    let mut out = String::new();
    for (label, properties) in &schema.nodes {
        if properties.is_empty() {
            let _ = writeln!(out, "- {label}");
        } else {
            let _ = writeln!(out, "- {label} (properties: {})", properties.join(", "));
        }
    }
    out
}

fn describe_relationships(schema: &GraphSchema) -> String {
    let mut out = String::new();
    for (rel_type, pairs) in &schema.relationships {
        for (source, target) in pairs {
            let _ = writeln!(out, "- {rel_type}: {source} -> {target}");
        }
    }
    out
}
