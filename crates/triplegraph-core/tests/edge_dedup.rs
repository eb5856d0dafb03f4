//! Edge deduplication against a hub node with many incoming edges.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use triplegraph_core::config::{CommitSize, EdgeLookup, ImportConfig};
use triplegraph_core::{GraphStore, MemoryGraphStore, Statement};

const FAN_IN: usize = 10_000;

fn hub_statements() -> Vec<Statement> {
    let mut statements: Vec<Statement> = (0..FAN_IN)
        .map(|i| link(&format!("s{i}"), "knows", "Y"))
        .collect();
    statements.push(link("X", "knows", "Y"));
    statements
}

fn config(edge_lookup: EdgeLookup) -> ImportConfig {
    ImportConfig {
        commit_size: CommitSize::Every(1_000),
        edge_lookup,
        ..ignore_config()
    }
}

#[test]
fn test_reload_into_hub_scans_from_smaller_side() {
    let config = config(EdgeLookup::MinDegree);
    let (first, store) = load(MemoryGraphStore::new(), &config, hub_statements());
    assert_eq!(first.triples_mapped, FAN_IN as u64 + 1);
    assert_eq!(store.all_relationships().unwrap().len(), FAN_IN + 1);

    let (summary, store) = load(store, &config, vec![link("X", "knows", "Y")]);

    assert_eq!(summary.relationships_scanned, 1);
    assert_eq!(store.all_relationships().unwrap().len(), FAN_IN + 1);
    let graph = dump(&store);
    assert_eq!(graph.edges[&(ex("X"), "knows".to_string(), ex("Y"))], 1);
}

#[test]
fn test_outgoing_lookup_walks_hub_edges() {
    let fan_out: Vec<Statement> = (0..FAN_IN)
        .map(|i| link("Y", "knows", &format!("s{i}")))
        .chain([link("Y", "knows", "X")])
        .collect();

    let outgoing = config(EdgeLookup::Outgoing);
    let (_, store) = load(MemoryGraphStore::new(), &outgoing, fan_out.clone());
    let (summary, store) = load(store, &outgoing, vec![link("Y", "knows", "X")]);
    assert!(summary.relationships_scanned >= 1);
    assert_eq!(store.all_relationships().unwrap().len(), FAN_IN + 1);

    let min_degree = config(EdgeLookup::MinDegree);
    let (_, store) = load(MemoryGraphStore::new(), &min_degree, fan_out);
    let (summary, _) = load(store, &min_degree, vec![link("Y", "knows", "X")]);
    assert_eq!(summary.relationships_scanned, 1);
}

#[test]
fn test_duplicate_edges_within_one_batch_collapse() {
    let dir = TempDir::new().unwrap();
    let statements = vec![
        link("A", "knows", "B"),
        link("A", "knows", "B"),
        link("A", "likes", "B"),
        link("B", "knows", "A"),
    ];
    let (summary, store) = load(sqlite_store(dir.path()), &ignore_config(), statements);

    assert_eq!(summary.triples_mapped, 4);
    let graph = dump(&store);
    assert_eq!(graph.edge_count(), 3);
    assert!(graph.edges.values().all(|&n| n == 1));
}
