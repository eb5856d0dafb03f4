//! Independent loads into one SQLite database through the commit pool.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use triplegraph_core::config::{CommitSize, ImportConfig};
use triplegraph_core::{
    run, CommitPool, GraphStore, ImportSummary, MemoryGraphStore, Statement, StatementLoader,
};

const JOBS: usize = 6;
const PER_JOB: usize = 50;

fn job_statements(job: usize) -> Vec<Statement> {
    (0..PER_JOB)
        .flat_map(|i| {
            let subject = format!("j{job}_{i}");
            [text(&subject, "name", &subject), link(&subject, "memberOf", "Hub")]
        })
        .collect()
}

#[test]
fn test_parallel_loads_share_nodes() {
    let dir = TempDir::new().unwrap();
    // Create the schema before workers race to open it
    drop(sqlite_store(dir.path()));

    let config = ImportConfig {
        commit_size: CommitSize::Every(10),
        ..ignore_config()
    };
    let pool = CommitPool::with_size(3, 2);
    let handles: Vec<_> = (0..JOBS)
        .map(|job| {
            let path = dir.path().to_path_buf();
            let config = config.clone();
            pool.submit(move || -> ImportSummary {
                let store = sqlite_store(&path);
                let mut loader = StatementLoader::new(store, &config).unwrap();
                run(&mut loader, job_statements(job)).unwrap()
            })
            .unwrap()
        })
        .collect();

    let summaries: Vec<ImportSummary> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    pool.shutdown();

    for summary in &summaries {
        assert_eq!(summary.triples_mapped, 2 * PER_JOB as u64);
        assert_eq!(summary.flushes, 10);
    }

    let store = sqlite_store(dir.path());
    let graph = dump(&store);
    // One node per subject plus the shared hub
    assert_eq!(graph.nodes.len(), JOBS * PER_JOB + 1);
    assert_eq!(graph.edge_count(), JOBS * PER_JOB);
    assert_eq!(store.stats().unwrap().relationship_count, JOBS * PER_JOB);
}

#[test]
fn test_job_failure_is_reported_per_job() {
    let pool = CommitPool::with_size(2, 2);
    let ok = pool
        .submit(|| load(MemoryGraphStore::new(), &ignore_config(), job_statements(0)).0)
        .unwrap();
    let bad = pool
        .submit(|| -> ImportSummary { panic!("reader failed") })
        .unwrap();

    assert_eq!(ok.join().unwrap().triples_mapped, 2 * PER_JOB as u64);
    assert!(bad.join().is_err());
}
