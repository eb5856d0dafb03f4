//! Property graph store abstraction.
//!
//! The engine only talks to the graph through [`GraphStore`]. Two
//! implementations are provided:
//!
//! ```text
//! ┌────────────────────┐      ┌──────────────────────────────┐
//! │  StatementLoader   │      │ SqliteGraphStore             │
//! │  StatementDeleter  │─────▶│  nodes / labels / properties │
//! │  preview()         │      │  relationships / prefixes    │
//! └────────────────────┘      ├──────────────────────────────┤
//!                             │ MemoryGraphStore             │
//!                             │  petgraph StableGraph        │
//!                             └──────────────────────────────┘
//! ```
//!
//! Every node carries the base label [`RESOURCE_LABEL`] and the identity
//! property [`URI_PROPERTY`] (plus [`GRAPH_URI_PROPERTY`] when graph-scoped).

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryGraphStore;
pub use petgraph::Direction;
pub use sqlite::SqliteGraphStore;

use crate::model::ResourceIdentity;
use crate::value::PropertyValue;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Label every imported node carries.
pub const RESOURCE_LABEL: &str = "Resource";

/// Identity property holding the node's URI.
pub const URI_PROPERTY: &str = "uri";

/// Identity property holding the graph context, quad imports only.
pub const GRAPH_URI_PROPERTY: &str = "graphUri";

/// Store-assigned node handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Store-assigned relationship handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RelId(pub u64);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A typed, directed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub id: RelId,
    pub rel_type: String,
    pub from: NodeId,
    pub to: NodeId,
}

impl Relationship {
    /// The endpoint opposite to `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.from == node {
            self.to
        } else {
            self.from
        }
    }
}

/// Store-level counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub node_count: usize,
    pub relationship_count: usize,
    pub namespace_count: usize,
}

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(RelId),

    #[error("Property {key} holds a non-finite number")]
    NonFiniteValue { key: String },

    #[error("No transaction in progress")]
    NoTransaction,

    #[error("A transaction is already in progress")]
    TransactionActive,
}

/// Transactional property graph operations used by the import engine.
///
/// Mutations between [`begin`](Self::begin) and [`commit`](Self::commit)
/// become visible atomically; [`rollback`](Self::rollback) discards them.
pub trait GraphStore {
    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    fn begin(&mut self) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Nodes whose `uri` (and `graphUri`) match `identity`.
    ///
    /// An identity without a graph only matches nodes without `graphUri`.
    fn find_nodes(&self, identity: &ResourceIdentity) -> Result<Vec<NodeId>, StoreError>;

    /// Create a node stamped with the base label and identity properties.
    fn create_node(&mut self, identity: &ResourceIdentity) -> Result<NodeId, StoreError>;

    /// Delete a node together with its relationships.
    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError>;

    /// All node handles.
    fn nodes(&self) -> Result<Vec<NodeId>, StoreError>;

    // ------------------------------------------------------------------
    // Labels and properties
    // ------------------------------------------------------------------

    fn labels(&self, node: NodeId) -> Result<BTreeSet<String>, StoreError>;

    /// Returns `false` when the label was already present.
    fn add_label(&mut self, node: NodeId, label: &str) -> Result<bool, StoreError>;

    /// Returns `false` when the label was absent.
    fn remove_label(&mut self, node: NodeId, label: &str) -> Result<bool, StoreError>;

    fn properties(&self, node: NodeId) -> Result<BTreeMap<String, PropertyValue>, StoreError>;

    fn property(&self, node: NodeId, key: &str) -> Result<Option<PropertyValue>, StoreError>;

    fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: &PropertyValue,
    ) -> Result<(), StoreError>;

    /// Returns `false` when the key was absent.
    fn remove_property(&mut self, node: NodeId, key: &str) -> Result<bool, StoreError>;

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Number of `rel_type` relationships of `node` in direction `dir`.
    fn degree(&self, node: NodeId, rel_type: &str, dir: Direction) -> Result<usize, StoreError>;

    /// Number of relationships of any type and direction.
    fn total_degree(&self, node: NodeId) -> Result<usize, StoreError>;

    fn relationships(
        &self,
        node: NodeId,
        rel_type: &str,
        dir: Direction,
    ) -> Result<Vec<Relationship>, StoreError>;

    /// Every relationship in the store.
    fn all_relationships(&self) -> Result<Vec<Relationship>, StoreError>;

    fn create_relationship(
        &mut self,
        from: NodeId,
        rel_type: &str,
        to: NodeId,
    ) -> Result<RelId, StoreError>;

    fn delete_relationship(&mut self, rel: RelId) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Vocabulary
    // ------------------------------------------------------------------

    /// Persisted `(prefix, namespace)` pairs.
    fn namespace_prefixes(&self) -> Result<Vec<(String, String)>, StoreError>;

    fn save_namespace_prefix(&mut self, prefix: &str, namespace: &str) -> Result<(), StoreError>;

    /// Persisted `(iri, name)` pairs used in MAP mode.
    fn vocabulary_mappings(&self) -> Result<Vec<(String, String)>, StoreError>;

    fn add_vocabulary_mapping(&mut self, iri: &str, name: &str) -> Result<(), StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// A node with everything attached to it, for display and comparisons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub labels: BTreeSet<String>,
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Read a full node.
pub fn snapshot_node<S: GraphStore + ?Sized>(
    store: &S,
    node: NodeId,
) -> Result<NodeSnapshot, StoreError> {
    Ok(NodeSnapshot {
        id: node,
        labels: store.labels(node)?,
        properties: store.properties(node)?,
    })
}

/// Whether `node` is an identity-only stub: base label only, identity
/// properties only, and no relationships.
pub fn is_empty_stub<S: GraphStore + ?Sized>(store: &S, node: NodeId) -> Result<bool, StoreError> {
    if store.total_degree(node)? > 0 {
        return Ok(false);
    }
    let labels = store.labels(node)?;
    if labels.len() != 1 || !labels.contains(RESOURCE_LABEL) {
        return Ok(false);
    }
    let properties = store.properties(node)?;
    Ok(properties
        .keys()
        .all(|k| k == URI_PROPERTY || k == GRAPH_URI_PROPERTY)
        && properties.contains_key(URI_PROPERTY))
}
