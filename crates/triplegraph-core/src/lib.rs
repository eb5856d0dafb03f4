//! TripleGraph Core - Mapping RDF statement streams onto a property graph
//!
//! This crate provides the import engine:
//! - Statement model and literal coercion into typed property values
//! - Vocabulary handling (IRI shortening, namespace prefixes, mappings)
//! - Batched, transactional loading and deletion of statements
//! - Graph store abstraction with SQLite and in-memory backends
//! - A bounded worker pool for running independent imports concurrently

pub mod buffer;
pub mod cache;
pub mod dedup;
pub mod deleter;
pub mod engine;
pub mod error;
pub mod literal;
pub mod loader;
pub mod model;
pub mod naming;
pub mod pool;
pub mod preview;
pub mod reconcile;
pub mod store;
pub mod value;

// Re-exports for convenience
pub use engine::{run, DeleteSummary, ImportSummary, StatementSink};
pub use error::{ImportError, ImportFailure};
pub use model::{Literal, Resource, ResourceIdentity, Statement, Term};
pub use value::{PropertyValue, Value, ValueKind};

// Engine re-exports
pub use deleter::StatementDeleter;
pub use loader::StatementLoader;
pub use pool::{CommitPool, JobHandle};
pub use preview::{preview, Preview};

// Vocabulary re-exports
pub use naming::{ElementKind, NameResolver, NamespaceError, NamespacePrefixTable, Vocabulary};

// Store re-exports
pub use store::{
    GraphStore, MemoryGraphStore, NodeId, NodeSnapshot, RelId, Relationship, SqliteGraphStore,
    StoreError, StoreStats,
};

pub use triplegraph_config as config;
