use crate::compiler::GraphOperation;
use crate::error::WriteError;
use async_trait::async_trait;
use extract::GraphSchema;
use neo4rs::{Graph, Query};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Counts reported back for one successfully written document batch.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReport {
    pub doc_id: String,
    pub nodes_written: usize,
    pub relationships_written: usize,
}

/// The store seam: just enough surface to run statements and drive a
/// transaction. The writer's rollback and retry behavior is tested
/// against a scripted implementation; production uses [`Neo4jStore`].
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn run(&self, statement: Statement) -> Result<(), WriteError>;
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, WriteError>;
}

#[async_trait]
pub trait StoreTxn: Send {
    async fn run(&mut self, statement: Statement) -> Result<(), WriteError>;
    async fn commit(self: Box<Self>) -> Result<(), WriteError>;
    async fn rollback(self: Box<Self>) -> Result<(), WriteError>;
}

/// Neo4j over bolt, with write conflicts distinguished from connection
/// failures so the writer knows which batches to retry.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect and verify the store is reachable. A failure here is a
    /// misconfiguration and fatal for the whole run.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, WriteError> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| WriteError::Connection(e.to_string()))?;
        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .map_err(|e| WriteError::Connection(e.to_string()))?;
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn run(&self, statement: Statement) -> Result<(), WriteError> {
        self.graph
            .run(statement.into_query())
            .await
            .map_err(classify)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTxn>, WriteError> {
        let txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| WriteError::Connection(e.to_string()))?;
        Ok(Box::new(Neo4jTxn { txn }))
    }
}

struct Neo4jTxn {
    txn: neo4rs::Txn,
}

#[async_trait]
impl StoreTxn for Neo4jTxn {
    async fn run(&mut self, statement: Statement) -> Result<(), WriteError> {
        self.txn.run(statement.into_query()).await.map_err(classify)
    }

    async fn commit(self: Box<Self>) -> Result<(), WriteError> {
        self.txn.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<(), WriteError> {
        self.txn
            .rollback()
            .await
            .map_err(|e| WriteError::Connection(e.to_string()))
    }
}

fn classify(e: neo4rs::Error) -> WriteError {
    let message = e.to_string();
    if message.contains("Constraint") || message.contains("conflict") {
        WriteError::WriteConflict(message)
    } else {
        WriteError::Connection(message)
    }
}

/// Applies one document's operation batch as a single transaction.
/// Every statement is MERGE-keyed on the natural key, so re-applying a
/// batch never creates duplicates.
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
    permits: Arc<Semaphore>,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn GraphStore>, max_concurrent_transactions: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_concurrent_transactions.max(1))),
        }
    }

    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        max_concurrent_transactions: usize,
    ) -> Result<Self, WriteError> {
        let store = Neo4jStore::connect(uri, user, password).await?;
        Ok(Self::new(Arc::new(store), max_concurrent_transactions))
    }

    /// Create per-label uniqueness constraints on the natural key, the
    /// store-side half of cross-document deduplication.
    pub async fn init_constraints(&self, schema: &GraphSchema) -> Result<(), WriteError> {
        for label in schema.nodes.keys() {
            let cypher = format!(
                "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.key IS UNIQUE",
                constraint_name(label),
                escape_identifier(label),
            );
            self.store
                .run(Statement {
                    cypher,
                    params: Vec::new(),
                })
                .await?;
        }
        info!(labels = schema.nodes.len(), "Graph constraints initialized");
        Ok(())
    }

    /// Apply one document's batch, retrying once on a write conflict
    /// (e.g. a constraint race with a concurrent writer).
    pub async fn apply(
        &self,
        doc_id: &str,
        operations: &[GraphOperation],
    ) -> Result<WriteReport, WriteError> {
        match self.apply_once(doc_id, operations).await {
            Err(WriteError::WriteConflict(msg)) => {
                warn!(doc_id, error = %msg, "Write conflict, retrying batch once");
                self.apply_once(doc_id, operations).await
            }
            other => other,
        }
    }

    async fn apply_once(
        &self,
        doc_id: &str,
        operations: &[GraphOperation],
    ) -> Result<WriteReport, WriteError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| WriteError::Connection("writer shut down".to_string()))?;

        let mut txn = self.store.begin().await?;

        let mut nodes_written = 0;
        let mut relationships_written = 0;

        for operation in operations {
            if let Err(error) = txn.run(build_statement(operation)).await {
                // All-or-nothing per document: nothing from this batch
                // may remain visible after a mid-batch failure.
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(doc_id, error = %rollback_err, "Rollback failed");
                }
                return Err(error);
            }
            match operation {
                GraphOperation::UpsertNode { .. } => nodes_written += 1,
                GraphOperation::UpsertRelationship { .. } => relationships_written += 1,
            }
        }

        txn.commit().await?;

        Ok(WriteReport {
            doc_id: doc_id.to_string(),
            nodes_written,
            relationships_written,
        })
    }
}

/// A cypher statement plus its parameters, kept separate from neo4rs
/// types so statement construction and the writer's transaction
/// handling are testable without a live store.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub params: Vec<(String, Value)>,
}

impl Statement {
    fn into_query(self) -> Query {
        let mut query = Query::new(self.cypher);
        for (name, value) in self.params {
            query = match value {
                Value::Bool(b) => query.param(&name, b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        query.param(&name, i)
                    } else {
                        query.param(&name, n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => query.param(&name, s),
                // Arrays and objects are stored as their JSON text;
                // nulls were filtered during statement construction.
                other => query.param(&name, other.to_string()),
            };
        }
        query
    }
}

pub(crate) fn build_statement(operation: &GraphOperation) -> Statement {
    match operation {
        GraphOperation::UpsertNode {
            label,
            key,
            properties,
        } => {
            let mut cypher = format!(
                "MERGE (n:{} {{key: $key}})",
                escape_identifier(label)
            );
            let mut params = vec![("key".to_string(), Value::String(key.clone()))];
            append_set_clause(&mut cypher, &mut params, "n", properties);
            Statement { cypher, params }
        }
        GraphOperation::UpsertRelationship {
            rel_type,
            source,
            target,
            properties,
        } => {
            let mut cypher = format!(
                "MATCH (a:{} {{key: $source_key}}) MATCH (b:{} {{key: $target_key}}) MERGE (a)-[r:{}]->(b)",
                escape_identifier(&source.label),
                escape_identifier(&target.label),
                escape_identifier(rel_type),
            );
            let mut params = vec![
                ("source_key".to_string(), Value::String(source.key.clone())),
                ("target_key".to_string(), Value::String(target.key.clone())),
            ];
            append_set_clause(&mut cypher, &mut params, "r", properties);
            Statement { cypher, params }
        }
    }
}

/// Append `SET x.`prop` = $pN` clauses in sorted property order so the
/// statement for a given operation is always byte-identical.
fn append_set_clause(
    cypher: &mut String,
    params: &mut Vec<(String, Value)>,
    variable: &str,
    properties: &serde_json::Map<String, Value>,
) {
    let mut keys: Vec<&String> = properties
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, _)| k)
        .collect();
    keys.sort();

    for (i, key) in keys.iter().enumerate() {
        let param = format!("p{i}");
        if i == 0 {
            cypher.push_str(" SET ");
        } else {
            cypher.push_str(", ");
        }
        cypher.push_str(&format!("{variable}.{} = ${param}", escape_identifier(key)));
        params.push((param, properties[key.as_str()].clone()));
    }
}

/// Backtick-escape a label, type, or property name so model-supplied
/// identifiers (spaces, leading digits) cannot break out of the
/// statement. Backticks themselves are stripped.
pub(crate) fn escape_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', ""))
}

fn constraint_name(label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("uniq_{}_key", safe.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::NodeRef;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn props(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_node_statement_is_merge_on_natural_key() {
        let op = GraphOperation::UpsertNode {
            label: "Organization".to_string(),
            key: "acme corp".to_string(),
            properties: props(json!({"name": "Acme Corp", "founded": 1990})),
        };
        let stmt = build_statement(&op);
        assert_eq!(
            stmt.cypher,
            "MERGE (n:`Organization` {key: $key}) SET n.`founded` = $p0, n.`name` = $p1"
        );
        assert_eq!(stmt.params[0], ("key".to_string(), json!("acme corp")));
        assert_eq!(stmt.params[1], ("p0".to_string(), json!(1990)));
        assert_eq!(stmt.params[2], ("p1".to_string(), json!("Acme Corp")));
    }

    #[test]
    fn test_relationship_statement_matches_endpoints() {
        let op = GraphOperation::UpsertRelationship {
            rel_type: "WORKS_AT".to_string(),
            source: NodeRef {
                label: "Person".to_string(),
                key: "alice".to_string(),
            },
            target: NodeRef {
                label: "Organization".to_string(),
                key: "acme corp".to_string(),
            },
            properties: props(json!({})),
        };
        let stmt = build_statement(&op);
        assert_eq!(
            stmt.cypher,
            "MATCH (a:`Person` {key: $source_key}) MATCH (b:`Organization` {key: $target_key}) MERGE (a)-[r:`WORKS_AT`]->(b)"
        );
    }

    #[test]
    fn test_statements_are_idempotent_inputs() {
        let op = GraphOperation::UpsertNode {
            label: "City".to_string(),
            key: "springfield".to_string(),
            properties: props(json!({"name": "Springfield"})),
        };
        // Applying the same operation twice sends the identical MERGE;
        // dedup is the store's uniqueness constraint on (label, key).
        assert_eq!(build_statement(&op), build_statement(&op));
    }

    #[test]
    fn test_hostile_identifiers_are_escaped() {
        let op = GraphOperation::UpsertNode {
            label: "1Bad Label` RETURN 1 //".to_string(),
            key: "k".to_string(),
            properties: props(json!({})),
        };
        let stmt = build_statement(&op);
        assert_eq!(stmt.cypher, "MERGE (n:`1Bad Label RETURN 1 //` {key: $key})");
    }

    #[test]
    fn test_null_properties_are_not_set() {
        let op = GraphOperation::UpsertNode {
            label: "Organization".to_string(),
            key: "acme corp".to_string(),
            properties: props(json!({"founded": null})),
        };
        let stmt = build_statement(&op);
        assert!(!stmt.cypher.contains("SET"));
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_constraint_names_are_sanitized() {
        assert_eq!(constraint_name("Person"), "uniq_person_key");
        assert_eq!(constraint_name("Bad Label"), "uniq_bad_label_key");
    }

    // ---- transaction behavior against a scripted store ----

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Begin,
        Run(String),
        Commit,
        Rollback,
    }

    /// How a scripted transaction should behave: succeed, or fail when
    /// the statement at the given index is run.
    #[derive(Debug, Clone, Copy)]
    enum TxnScript {
        Succeed,
        ConflictAt(usize),
        DisconnectAt(usize),
    }

    struct ScriptedStore {
        events: Arc<Mutex<Vec<Event>>>,
        scripts: Mutex<VecDeque<TxnScript>>,
    }

    impl ScriptedStore {
        fn new(scripts: Vec<TxnScript>) -> Self {
            Self {
                events: Arc::new(Mutex::new(Vec::new())),
                scripts: Mutex::new(scripts.into()),
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, matches: fn(&Event) -> bool) -> usize {
            self.events.lock().unwrap().iter().filter(|e| matches(e)).count()
        }
    }

    #[async_trait]
    impl GraphStore for ScriptedStore {
        async fn run(&self, statement: Statement) -> Result<(), WriteError> {
            self.events.lock().unwrap().push(Event::Run(statement.cypher));
            Ok(())
        }

        async fn begin(&self) -> Result<Box<dyn StoreTxn>, WriteError> {
            self.events.lock().unwrap().push(Event::Begin);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(TxnScript::Succeed);
            Ok(Box::new(ScriptedTxn {
                events: self.events.clone(),
                script,
                ran: 0,
            }))
        }
    }

    struct ScriptedTxn {
        events: Arc<Mutex<Vec<Event>>>,
        script: TxnScript,
        ran: usize,
    }

    #[async_trait]
    impl StoreTxn for ScriptedTxn {
        async fn run(&mut self, statement: Statement) -> Result<(), WriteError> {
            match self.script {
                TxnScript::ConflictAt(at) if self.ran == at => {
                    return Err(WriteError::WriteConflict("constraint race".to_string()));
                }
                TxnScript::DisconnectAt(at) if self.ran == at => {
                    return Err(WriteError::Connection("connection reset".to_string()));
                }
                _ => {}
            }
            self.ran += 1;
            self.events.lock().unwrap().push(Event::Run(statement.cypher));
            Ok(())
        }

        async fn commit(self: Box<Self>) -> Result<(), WriteError> {
            self.events.lock().unwrap().push(Event::Commit);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), WriteError> {
            self.events.lock().unwrap().push(Event::Rollback);
            Ok(())
        }
    }

    fn batch() -> Vec<GraphOperation> {
        vec![
            GraphOperation::UpsertNode {
                label: "Person".to_string(),
                key: "alice".to_string(),
                properties: props(json!({"name": "Alice"})),
            },
            GraphOperation::UpsertNode {
                label: "Organization".to_string(),
                key: "acme corp".to_string(),
                properties: props(json!({})),
            },
            GraphOperation::UpsertRelationship {
                rel_type: "WORKS_AT".to_string(),
                source: NodeRef {
                    label: "Person".to_string(),
                    key: "alice".to_string(),
                },
                target: NodeRef {
                    label: "Organization".to_string(),
                    key: "acme corp".to_string(),
                },
                properties: props(json!({})),
            },
        ]
    }

    #[tokio::test]
    async fn test_mid_batch_failure_rolls_back_transaction() {
        let store = Arc::new(ScriptedStore::new(vec![TxnScript::DisconnectAt(1)]));
        let writer = GraphWriter::new(store.clone(), 1);

        let err = writer.apply("doc-1", &batch()).await.unwrap_err();
        assert!(matches!(err, WriteError::Connection(_)));

        // Second statement failed: the transaction must be rolled back,
        // never committed, and statements after the failure never run.
        let events = store.events();
        assert_eq!(*events.last().unwrap(), Event::Rollback);
        assert_eq!(store.count(|e| matches!(e, Event::Commit)), 0);
        assert_eq!(store.count(|e| matches!(e, Event::Run(_))), 1);
        // Connection failures are not retried as a fresh transaction.
        assert_eq!(store.count(|e| matches!(e, Event::Begin)), 1);
    }

    #[tokio::test]
    async fn test_write_conflict_retried_once_then_succeeds() {
        let store = Arc::new(ScriptedStore::new(vec![
            TxnScript::ConflictAt(0),
            TxnScript::Succeed,
        ]));
        let writer = GraphWriter::new(store.clone(), 1);

        let report = writer.apply("doc-1", &batch()).await.unwrap();
        assert_eq!(report.nodes_written, 2);
        assert_eq!(report.relationships_written, 1);

        assert_eq!(store.count(|e| matches!(e, Event::Begin)), 2);
        assert_eq!(store.count(|e| matches!(e, Event::Rollback)), 1);
        assert_eq!(store.count(|e| matches!(e, Event::Commit)), 1);
    }

    #[tokio::test]
    async fn test_persistent_conflict_fails_after_exactly_two_attempts() {
        let store = Arc::new(ScriptedStore::new(vec![
            TxnScript::ConflictAt(0),
            TxnScript::ConflictAt(0),
            TxnScript::Succeed, // must never be reached
        ]));
        let writer = GraphWriter::new(store.clone(), 1);

        let err = writer.apply("doc-1", &batch()).await.unwrap_err();
        assert!(matches!(err, WriteError::WriteConflict(_)));
        assert_eq!(store.count(|e| matches!(e, Event::Begin)), 2);
        assert_eq!(store.count(|e| matches!(e, Event::Commit)), 0);
    }

    #[tokio::test]
    async fn test_constraints_issued_per_label() {
        let store = Arc::new(ScriptedStore::new(vec![]));
        let writer = GraphWriter::new(store.clone(), 1);

        let schema = GraphSchema::from_json(
            r#"{"nodes": {"City": ["name"], "Person": ["name"]}, "relationships": {}}"#,
        )
        .unwrap();
        writer.init_constraints(&schema).await.unwrap();

        let events = store.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            Event::Run(c) if c.contains("uniq_city_key") && c.contains("(n:`City`)")
        ));
    }
}
