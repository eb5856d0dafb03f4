//! SQLite-backed graph store.

use super::schema::{SCHEMA_CREATE_INDEXES, SCHEMA_TABLES, STORE_SCHEMA_VERSION};
use super::{
    Direction, GraphStore, NodeId, RelId, Relationship, StoreError, StoreStats,
    GRAPH_URI_PROPERTY, RESOURCE_LABEL, URI_PROPERTY,
};
use crate::model::ResourceIdentity;
use crate::value::{PropertyValue, Value};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// A graph store in a single SQLite database.
pub struct SqliteGraphStore {
    conn: Connection,
    in_transaction: bool,
}

impl SqliteGraphStore {
    /// Open an existing store database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;

        let store = Self {
            conn,
            in_transaction: false,
        };

        match store.get_metadata("schema_version")? {
            Some(version) if version == STORE_SCHEMA_VERSION => {}
            Some(version) => {
                return Err(StoreError::SchemaVersionMismatch {
                    expected: STORE_SCHEMA_VERSION.to_string(),
                    found: version,
                })
            }
            None => store.create_schema()?,
        }

        Ok(store)
    }

    /// Create a new store database with schema.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;

        let store = Self {
            conn,
            in_transaction: false,
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Open `path` if it exists, else create it.
    pub fn open_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            Self::open(path)
        } else {
            debug!("Creating graph store at {:?}", path);
            Self::create(path)
        }
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;

        let store = Self {
            conn,
            in_transaction: false,
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        for table in SCHEMA_TABLES {
            self.conn.execute(table, [])?;
        }
        self.conn.execute_batch(SCHEMA_CREATE_INDEXES)?;
        self.set_metadata("schema_version", STORE_SCHEMA_VERSION)?;
        Ok(())
    }

    /// Configure connection with optimal settings
    fn configure_connection(conn: &Connection) -> SqliteResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Required for the cascading deletes
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "cache_size", -64000)?; // 64MB cache
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "mmap_size", 268435456)?; // 256MB mmap
        // Concurrent imports wait on each other's write transactions
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        Ok(())
    }

    // =========================================================================
    // Metadata Operations
    // =========================================================================

    /// Get a metadata value
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self
            .conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional();
        match result {
            Ok(value) => Ok(value),
            // Fresh database without the metadata table yet
            Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("no such table") => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Set a metadata value
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO store_metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn row_to_relationship(row: &rusqlite::Row<'_>) -> SqliteResult<Relationship> {
        Ok(Relationship {
            id: RelId(row.get::<_, i64>(0)? as u64),
            from: NodeId(row.get::<_, i64>(1)? as u64),
            rel_type: row.get(2)?,
            to: NodeId(row.get::<_, i64>(3)? as u64),
        })
    }

    fn count(&self, sql: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl GraphStore for SqliteGraphStore {
    // =========================================================================
    // Transactions
    // =========================================================================

    fn begin(&mut self) -> Result<(), StoreError> {
        if self.in_transaction {
            return Err(StoreError::TransactionActive);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        self.in_transaction = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // =========================================================================
    // Node Operations
    // =========================================================================

    fn find_nodes(&self, identity: &ResourceIdentity) -> Result<Vec<NodeId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM nodes WHERE uri = ?1 AND graph_uri IS ?2 ORDER BY id")?;
        let ids = stmt
            .query_map(params![identity.uri, identity.graph], |row| {
                row.get::<_, i64>(0).map(|id| NodeId(id as u64))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ids)
    }

    fn create_node(&mut self, identity: &ResourceIdentity) -> Result<NodeId, StoreError> {
        self.conn.execute(
            "INSERT INTO nodes (uri, graph_uri) VALUES (?1, ?2)",
            params![identity.uri, identity.graph],
        )?;
        let node = NodeId(self.conn.last_insert_rowid() as u64);

        self.add_label(node, RESOURCE_LABEL)?;
        self.set_property(
            node,
            URI_PROPERTY,
            &PropertyValue::Single(Value::text(identity.uri.as_str())),
        )?;
        if let Some(graph) = &identity.graph {
            self.set_property(
                node,
                GRAPH_URI_PROPERTY,
                &PropertyValue::Single(Value::text(graph.as_str())),
            )?;
        }
        Ok(node)
    }

    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM nodes WHERE id = ?1", [node.0 as i64])?;
        if deleted == 0 {
            return Err(StoreError::NodeNotFound(node));
        }
        Ok(())
    }

    fn nodes(&self) -> Result<Vec<NodeId>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM nodes ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0).map(|id| NodeId(id as u64)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ids)
    }

    // =========================================================================
    // Label and Property Operations
    // =========================================================================

    fn labels(&self, node: NodeId) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT label FROM node_labels WHERE node_id = ?1")?;
        let labels = stmt
            .query_map([node.0 as i64], |row| row.get(0))?
            .collect::<SqliteResult<BTreeSet<String>>>()?;
        Ok(labels)
    }

    fn add_label(&mut self, node: NodeId, label: &str) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO node_labels (node_id, label) VALUES (?1, ?2)",
            params![node.0 as i64, label],
        )?;
        Ok(inserted > 0)
    }

    fn remove_label(&mut self, node: NodeId, label: &str) -> Result<bool, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM node_labels WHERE node_id = ?1 AND label = ?2",
            params![node.0 as i64, label],
        )?;
        Ok(deleted > 0)
    }

    fn properties(&self, node: NodeId) -> Result<BTreeMap<String, PropertyValue>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key, value_json FROM node_properties WHERE node_id = ?1")?;
        let rows = stmt
            .query_map([node.0 as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut properties = BTreeMap::new();
        for (key, json) in rows {
            properties.insert(key, serde_json::from_str(&json)?);
        }
        Ok(properties)
    }

    fn property(&self, node: NodeId, key: &str) -> Result<Option<PropertyValue>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT value_json FROM node_properties WHERE node_id = ?1 AND key = ?2",
                params![node.0 as i64, key],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: &PropertyValue,
    ) -> Result<(), StoreError> {
        // JSON would turn these into null and the row could no longer be read
        if value
            .values()
            .iter()
            .any(|v| matches!(v, Value::Float(f) if !f.is_finite()))
        {
            return Err(StoreError::NonFiniteValue {
                key: key.to_string(),
            });
        }
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO node_properties (node_id, key, value_json) VALUES (?1, ?2, ?3)",
            params![node.0 as i64, key, json],
        )?;
        Ok(())
    }

    fn remove_property(&mut self, node: NodeId, key: &str) -> Result<bool, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM node_properties WHERE node_id = ?1 AND key = ?2",
            params![node.0 as i64, key],
        )?;
        Ok(deleted > 0)
    }

    // =========================================================================
    // Relationship Operations
    // =========================================================================

    fn degree(&self, node: NodeId, rel_type: &str, dir: Direction) -> Result<usize, StoreError> {
        let sql = match dir {
            Direction::Outgoing => {
                "SELECT COUNT(*) FROM relationships WHERE source = ?1 AND rel_type = ?2"
            }
            Direction::Incoming => {
                "SELECT COUNT(*) FROM relationships WHERE target = ?1 AND rel_type = ?2"
            }
        };
        let count: i64 = self
            .conn
            .query_row(sql, params![node.0 as i64, rel_type], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn total_degree(&self, node: NodeId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM relationships WHERE source = ?1 OR target = ?1",
            [node.0 as i64],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn relationships(
        &self,
        node: NodeId,
        rel_type: &str,
        dir: Direction,
    ) -> Result<Vec<Relationship>, StoreError> {
        let sql = match dir {
            Direction::Outgoing => {
                "SELECT id, source, rel_type, target FROM relationships WHERE source = ?1 AND rel_type = ?2"
            }
            Direction::Incoming => {
                "SELECT id, source, rel_type, target FROM relationships WHERE target = ?1 AND rel_type = ?2"
            }
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rels = stmt
            .query_map(params![node.0 as i64, rel_type], Self::row_to_relationship)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rels)
    }

    fn all_relationships(&self) -> Result<Vec<Relationship>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, source, rel_type, target FROM relationships ORDER BY id")?;
        let rels = stmt
            .query_map([], Self::row_to_relationship)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rels)
    }

    fn create_relationship(
        &mut self,
        from: NodeId,
        rel_type: &str,
        to: NodeId,
    ) -> Result<RelId, StoreError> {
        self.conn.execute(
            "INSERT INTO relationships (source, rel_type, target) VALUES (?1, ?2, ?3)",
            params![from.0 as i64, rel_type, to.0 as i64],
        )?;
        Ok(RelId(self.conn.last_insert_rowid() as u64))
    }

    fn delete_relationship(&mut self, rel: RelId) -> Result<(), StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM relationships WHERE id = ?1", [rel.0 as i64])?;
        if deleted == 0 {
            return Err(StoreError::RelationshipNotFound(rel));
        }
        Ok(())
    }

    // =========================================================================
    // Vocabulary Operations
    // =========================================================================

    fn namespace_prefixes(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT prefix, namespace FROM namespace_prefixes ORDER BY prefix")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    fn save_namespace_prefix(&mut self, prefix: &str, namespace: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO namespace_prefixes (prefix, namespace) VALUES (?1, ?2)
             ON CONFLICT(prefix) DO UPDATE SET namespace = excluded.namespace",
            params![prefix, namespace],
        )?;
        Ok(())
    }

    fn vocabulary_mappings(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT iri, name FROM vocabulary_mappings ORDER BY iri")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    fn add_vocabulary_mapping(&mut self, iri: &str, name: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO vocabulary_mappings (iri, name) VALUES (?1, ?2)",
            params![iri, name],
        )?;
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            node_count: self.count("SELECT COUNT(*) FROM nodes")?,
            relationship_count: self.count("SELECT COUNT(*) FROM relationships")?,
            namespace_count: self.count("SELECT COUNT(*) FROM namespace_prefixes")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use tempfile::TempDir;

    #[test]
    fn test_create_in_memory() {
        let store = SqliteGraphStore::in_memory().unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
        assert_eq!(
            store.get_metadata("schema_version").unwrap().as_deref(),
            Some(STORE_SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_node_identity() {
        conformance::node_identity(&mut SqliteGraphStore::in_memory().unwrap());
    }

    #[test]
    fn test_labels_and_properties() {
        conformance::labels_and_properties(&mut SqliteGraphStore::in_memory().unwrap());
    }

    #[test]
    fn test_relationships_and_degrees() {
        conformance::relationships_and_degrees(&mut SqliteGraphStore::in_memory().unwrap());
    }

    #[test]
    fn test_rollback_discards_changes() {
        conformance::rollback_discards_changes(&mut SqliteGraphStore::in_memory().unwrap());
    }

    #[test]
    fn test_rollback_restores_deletions() {
        conformance::rollback_restores_deletions(&mut SqliteGraphStore::in_memory().unwrap());
    }

    #[test]
    fn test_vocabulary_persistence() {
        conformance::vocabulary_persistence(&mut SqliteGraphStore::in_memory().unwrap());
    }

    #[test]
    fn test_duplicate_identities_are_allowed() {
        let mut store = SqliteGraphStore::in_memory().unwrap();
        let identity = ResourceIdentity::in_graph("http://a", Some("http://g".into()));
        store.create_node(&identity).unwrap();
        store.create_node(&identity).unwrap();
        assert_eq!(store.find_nodes(&identity).unwrap().len(), 2);
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        let mut store = SqliteGraphStore::in_memory().unwrap();
        let node = store.create_node(&ResourceIdentity::new("http://a")).unwrap();
        let value = PropertyValue::List(vec![Value::Float(1.5), Value::Float(f64::INFINITY)]);

        assert!(matches!(
            store.set_property(node, "v", &value),
            Err(StoreError::NonFiniteValue { ref key }) if key == "v"
        ));
        assert_eq!(store.property(node, "v").unwrap(), None);
    }

    #[test]
    fn test_reopen_persists_data() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("graph.db");

        {
            let mut store = SqliteGraphStore::create(&path).unwrap();
            store.begin().unwrap();
            store.create_node(&ResourceIdentity::new("http://a")).unwrap();
            store.save_namespace_prefix("ns0", "http://a/").unwrap();
            store.commit().unwrap();
        }

        let store = SqliteGraphStore::open(&path).unwrap();
        assert_eq!(store.stats().unwrap().node_count, 1);
        assert_eq!(store.namespace_prefixes().unwrap().len(), 1);
    }

    #[test]
    fn test_schema_version_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("graph.db");
        {
            let store = SqliteGraphStore::create(&path).unwrap();
            store.set_metadata("schema_version", "0.1").unwrap();
        }
        assert!(matches!(
            SqliteGraphStore::open(&path),
            Err(StoreError::SchemaVersionMismatch { .. })
        ));
    }
}
