pub mod error;
pub mod gateway;
pub mod llm;
pub mod prompt;
pub mod retry;
pub mod schema;

pub use error::ModelError;
pub use gateway::ModelGateway;
pub use llm::{MockClient, ModelClient, OllamaClient};
pub use retry::RetryPolicy;
pub use schema::{
    ExtractionResult, GraphSchema, NodeRef, ProposedNode, ProposedRelationship, RawExtraction,
};
