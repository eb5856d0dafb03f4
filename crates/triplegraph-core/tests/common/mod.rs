//! Common test utilities for integration tests.
//!
//! Statement builders over the `http://example.org/` namespace and a
//! node-id-independent dump of store contents for comparisons.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use triplegraph_core::config::{ImportConfig, VocabUriMode};
use triplegraph_core::model::vocab;
use triplegraph_core::store::{GRAPH_URI_PROPERTY, URI_PROPERTY};
use triplegraph_core::{
    run, DeleteSummary, GraphStore, ImportSummary, Literal, PropertyValue, Resource,
    SqliteGraphStore, Statement, StatementDeleter, StatementLoader, Term,
};

pub const EX: &str = "http://example.org/";

pub fn ex(local: &str) -> String {
    format!("{EX}{local}")
}

/// `ex:subject rdf:type ex:class`
pub fn typed_as(subject: &str, class: &str) -> Statement {
    Statement::new(Resource::iri(ex(subject)), vocab::RDF_TYPE, Term::iri(ex(class)))
}

/// `ex:subject ex:predicate ex:object`
pub fn link(subject: &str, predicate: &str, object: &str) -> Statement {
    Statement::new(Resource::iri(ex(subject)), ex(predicate), Term::iri(ex(object)))
}

/// `ex:subject ex:predicate "value"`
pub fn text(subject: &str, predicate: &str, value: &str) -> Statement {
    Statement::new(Resource::iri(ex(subject)), ex(predicate), Literal::string(value))
}

/// `ex:subject ex:predicate "lexical"^^datatype`
pub fn literal(subject: &str, predicate: &str, lexical: &str, datatype: &str) -> Statement {
    Statement::new(
        Resource::iri(ex(subject)),
        ex(predicate),
        Literal::typed(lexical, datatype),
    )
}

pub fn ignore_config() -> ImportConfig {
    ImportConfig {
        handle_vocab_uris: VocabUriMode::Ignore,
        ..Default::default()
    }
}

pub fn sqlite_store(dir: &Path) -> SqliteGraphStore {
    SqliteGraphStore::open_or_create(&dir.join("graph.db")).expect("Failed to open store")
}

pub fn load<S: GraphStore>(
    store: S,
    config: &ImportConfig,
    statements: Vec<Statement>,
) -> (ImportSummary, S) {
    let mut loader = StatementLoader::new(store, config).expect("Invalid config");
    let summary = run(&mut loader, statements).expect("Load failed");
    (summary, loader.into_store())
}

pub fn delete<S: GraphStore>(
    store: S,
    config: &ImportConfig,
    statements: Vec<Statement>,
) -> (DeleteSummary, S) {
    let mut deleter = StatementDeleter::new(store, config).expect("Invalid config");
    let summary = run(&mut deleter, statements).expect("Delete failed");
    (summary, deleter.into_store())
}

/// Identity of a dumped node: `(uri, graphUri)`.
pub type NodeKey = (String, Option<String>);

/// Store contents keyed by identity rather than node handle.
#[derive(Debug, Default, PartialEq)]
pub struct GraphDump {
    pub nodes: BTreeMap<NodeKey, (BTreeSet<String>, BTreeMap<String, PropertyValue>)>,
    /// `(from uri, type, to uri)` with multiplicity
    pub edges: BTreeMap<(String, String, String), usize>,
}

impl GraphDump {
    pub fn node(&self, uri: &str) -> &(BTreeSet<String>, BTreeMap<String, PropertyValue>) {
        self.nodes
            .get(&(uri.to_string(), None))
            .unwrap_or_else(|| panic!("no node for {uri}"))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().sum()
    }
}

fn text_property(properties: &BTreeMap<String, PropertyValue>, key: &str) -> Option<String> {
    properties
        .get(key)
        .and_then(PropertyValue::as_single)
        .and_then(|v| v.as_text())
        .map(str::to_string)
}

pub fn dump<S: GraphStore>(store: &S) -> GraphDump {
    let mut dump = GraphDump::default();
    let mut keys = BTreeMap::new();

    for id in store.nodes().unwrap() {
        let labels = store.labels(id).unwrap();
        let properties = store.properties(id).unwrap();
        let uri = text_property(&properties, URI_PROPERTY).expect("node without uri");
        let key = (uri, text_property(&properties, GRAPH_URI_PROPERTY));
        keys.insert(id, key.0.clone());
        let previous = dump.nodes.insert(key.clone(), (labels, properties));
        assert!(previous.is_none(), "duplicate node for {:?}", key);
    }
    for rel in store.all_relationships().unwrap() {
        *dump
            .edges
            .entry((keys[&rel.from].clone(), rel.rel_type, keys[&rel.to].clone()))
            .or_default() += 1;
    }
    dump
}
