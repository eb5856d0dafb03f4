//! SQLite Schema Definitions for the Graph Store
//!
//! Nodes, their labels and properties, and relationships live in separate
//! tables. Label, property and relationship rows cascade when their node is
//! deleted.

/// Schema version for graph store databases
pub const STORE_SCHEMA_VERSION: &str = "1.0";

/// SQL to create the nodes table
///
/// `uri` and `graph_uri` mirror the identity properties so lookups can use
/// an index. `(uri, graph_uri)` is not unique; concurrent imports can race
/// on find-or-create.
pub const SCHEMA_CREATE_NODES: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL,
    graph_uri TEXT
)
"#;

/// SQL to create the labels table
pub const SCHEMA_CREATE_LABELS: &str = r#"
CREATE TABLE IF NOT EXISTS node_labels (
    node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    PRIMARY KEY (node_id, label)
)
"#;

/// SQL to create the properties table
///
/// Values are JSON-encoded `PropertyValue`s.
pub const SCHEMA_CREATE_PROPERTIES: &str = r#"
CREATE TABLE IF NOT EXISTS node_properties (
    node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value_json TEXT NOT NULL,
    PRIMARY KEY (node_id, key)
)
"#;

/// SQL to create the relationships table
pub const SCHEMA_CREATE_RELATIONSHIPS: &str = r#"
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL,
    target INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE
)
"#;

/// SQL to create the namespace prefix table
pub const SCHEMA_CREATE_PREFIXES: &str = r#"
CREATE TABLE IF NOT EXISTS namespace_prefixes (
    prefix TEXT PRIMARY KEY NOT NULL,
    namespace TEXT NOT NULL UNIQUE
)
"#;

/// SQL to create the vocabulary mapping table (MAP mode)
pub const SCHEMA_CREATE_MAPPINGS: &str = r#"
CREATE TABLE IF NOT EXISTS vocabulary_mappings (
    iri TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL
)
"#;

/// SQL to create the metadata table
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes for efficient queries
pub const SCHEMA_CREATE_INDEXES: &str = r#"
-- Identity lookup
CREATE INDEX IF NOT EXISTS idx_nodes_identity ON nodes(uri, graph_uri);

-- Degree counts and scans per direction
CREATE INDEX IF NOT EXISTS idx_rels_source_type ON relationships(source, rel_type);
CREATE INDEX IF NOT EXISTS idx_rels_target_type ON relationships(target, rel_type);
"#;

/// All table definitions, in creation order.
pub const SCHEMA_TABLES: &[&str] = &[
    SCHEMA_CREATE_NODES,
    SCHEMA_CREATE_LABELS,
    SCHEMA_CREATE_PROPERTIES,
    SCHEMA_CREATE_RELATIONSHIPS,
    SCHEMA_CREATE_PREFIXES,
    SCHEMA_CREATE_MAPPINGS,
    SCHEMA_CREATE_METADATA,
];
