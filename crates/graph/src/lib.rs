pub mod compiler;
pub mod error;
pub mod writer;

pub use compiler::{DanglingPolicy, GraphOperation, compile};
pub use error::{CompileError, WriteError};
pub use writer::{GraphStore, GraphWriter, Neo4jStore, Statement, StoreTxn, WriteReport};
