//! Subtractive statement processing.
//!
//! [`StatementDeleter`] mirrors the loader: statements are buffered the same
//! way and removed from the graph in per-flush transactions. Anything that
//! was not there to remove is counted as not deleted. Nodes left with only
//! their identity are pruned.
//!
//! Statements involving blank nodes are skipped; their `bnode://` identities
//! are not stable across parses.

use crate::buffer::{BufferMode, Consumed, PendingBatch, StatementBuffer};
use crate::cache::IdentityCache;
use crate::dedup::{self, LookupStats};
use crate::engine::{push_warning, DeleteSummary, StatementSink};
use crate::error::ImportError;
use crate::loader::{empty_vocabulary, load_vocabulary};
use crate::model::{ResourceIdentity, Statement};
use crate::naming::Vocabulary;
use crate::reconcile::{self, PendingValue, Subtracted};
use crate::store::{is_empty_stub, GraphStore, NodeId};
use std::collections::HashSet;
use tracing::{debug, info, trace, warn};
use triplegraph_config::ImportConfig;

/// Per-flush outcome, credited only once the flush commits.
#[derive(Debug, Default)]
struct FlushTally {
    not_deleted: u64,
    pruned: u64,
}

/// Removes a statement stream from a [`GraphStore`].
pub struct StatementDeleter<S: GraphStore> {
    store: S,
    config: ImportConfig,
    buffer: StatementBuffer,
    vocabulary: Vocabulary,
    cache: IdentityCache,
    lookups: LookupStats,
    not_deleted: u64,
    blank_node_statements: u64,
    nodes_pruned: u64,
    flushes: u64,
    failed_flushes: u64,
    warnings: Vec<String>,
}

impl<S: GraphStore> StatementDeleter<S> {
    /// Deleter for triples; statement graphs are ignored.
    pub fn new(store: S, config: &ImportConfig) -> Result<Self, ImportError> {
        Self::with_scope(store, config, false)
    }

    /// Deleter for quads; only nodes in the statement's graph are touched.
    pub fn for_quads(store: S, config: &ImportConfig) -> Result<Self, ImportError> {
        Self::with_scope(store, config, true)
    }

    fn with_scope(store: S, config: &ImportConfig, graph_scoped: bool) -> Result<Self, ImportError> {
        config.validate()?;
        Ok(Self {
            store,
            config: config.clone(),
            buffer: StatementBuffer::new(config, BufferMode::Delete, graph_scoped),
            vocabulary: empty_vocabulary(config),
            cache: IdentityCache::new(config.node_cache_size),
            lookups: LookupStats::default(),
            not_deleted: 0,
            blank_node_statements: 0,
            nodes_pruned: 0,
            flushes: 0,
            failed_flushes: 0,
            warnings: Vec::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Apply every buffered removal in one transaction.
    ///
    /// Prefixes minted while naming deletions are never persisted; a
    /// namespace the store has not seen cannot name anything in it.
    pub fn flush(&mut self) -> Result<(), ImportError> {
        let (batch, count) = self.buffer.take();
        if batch.is_empty() {
            return Ok(());
        }

        let result = self.commit_batch(batch);
        self.cache.invalidate();

        match result {
            Ok(tally) => {
                self.buffer.record_mapped(count);
                self.not_deleted += tally.not_deleted;
                self.nodes_pruned += tally.pruned;
                self.flushes += 1;
                debug!(
                    statements = count,
                    not_deleted = tally.not_deleted,
                    pruned = tally.pruned,
                    "Flushed deletions"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback() {
                    debug!(error = %rollback_err, "Rollback after failed flush");
                }
                self.failed_flushes += 1;
                Err(err)
            }
        }
    }

    fn flush_or_continue(&mut self) -> Result<(), ImportError> {
        match self.flush() {
            Err(err) if !self.config.abort_on_error => {
                warn!(error = %err, "Flush failed, batch skipped");
                push_warning(&mut self.warnings, format!("Skipped a failed batch: {err}"));
                Ok(())
            }
            other => other,
        }
    }

    fn commit_batch(&mut self, batch: PendingBatch) -> Result<FlushTally, ImportError> {
        self.store.begin()?;
        let tally = self.apply(batch)?;
        self.store.commit()?;
        Ok(tally)
    }

    fn apply(&mut self, batch: PendingBatch) -> Result<FlushTally, ImportError> {
        let mut tally = FlushTally::default();
        let mut pruned = HashSet::new();

        let mut resources: Vec<_> = batch.resources.into_iter().collect();
        resources.sort_by(|a, b| a.0.cmp(&b.0));

        for (identity, resource) in resources {
            let values = resource.value_count() as u64;
            if values == 0 {
                // Edge endpoint only; handled below
                continue;
            }
            let Some(node) = self.cache.find(&self.store, &identity)? else {
                trace!(%identity, "Nothing to delete, node absent");
                tally.not_deleted += values;
                continue;
            };

            for label in &resource.labels {
                if !self.store.remove_label(node, label)? {
                    tally.not_deleted += 1;
                }
            }
            for (key, pending) in resource.properties {
                tally.not_deleted += self.remove_values(node, &key, pending)?;
            }
            self.prune(node, &identity, &mut pruned, &mut tally)?;
        }

        let mut edges: Vec<_> = batch.edges.into_iter().collect();
        edges.sort();
        for edge in edges {
            let from = self.cache.find(&self.store, &edge.from)?;
            let to = self.cache.find(&self.store, &edge.to)?;
            let (Some(from), Some(to)) = (from, to) else {
                tally.not_deleted += 1;
                continue;
            };
            let existing = dedup::find_relationship(
                &self.store,
                from,
                &edge.rel_type,
                to,
                self.config.edge_lookup,
                &mut self.lookups,
            )?;
            let Some(rel) = existing else {
                tally.not_deleted += 1;
                continue;
            };
            self.store.delete_relationship(rel)?;
            self.prune(to, &edge.to, &mut pruned, &mut tally)?;
            self.prune(from, &edge.from, &mut pruned, &mut tally)?;
        }
        Ok(tally)
    }

    /// Remove buffered values of `key`; returns how many were absent.
    fn remove_values(
        &mut self,
        node: NodeId,
        key: &str,
        pending: PendingValue,
    ) -> Result<u64, ImportError> {
        match pending {
            PendingValue::Single(_) => Ok(u64::from(!self.store.remove_property(node, key)?)),
            PendingValue::Multi(values) => {
                let values = reconcile::dedup_preserving_order(values);
                let Some(existing) = self.store.property(node, key)? else {
                    return Ok(values.len() as u64);
                };
                let (remaining, missing) = reconcile::subtract(existing, &values);
                match remaining {
                    Subtracted::Keep(value) => self.store.set_property(node, key, &value)?,
                    Subtracted::Remove => {
                        self.store.remove_property(node, key)?;
                    }
                }
                Ok(missing as u64)
            }
        }
    }

    fn prune(
        &mut self,
        node: NodeId,
        identity: &ResourceIdentity,
        pruned: &mut HashSet<NodeId>,
        tally: &mut FlushTally,
    ) -> Result<(), ImportError> {
        if pruned.contains(&node) || !is_empty_stub(&self.store, node)? {
            return Ok(());
        }
        self.store.delete_node(node)?;
        self.cache.remove(identity);
        pruned.insert(node);
        tally.pruned += 1;
        trace!(%identity, "Pruned empty node");
        Ok(())
    }
}

impl<S: GraphStore> StatementSink for StatementDeleter<S> {
    type Summary = DeleteSummary;

    fn on_start(&mut self) -> Result<(), ImportError> {
        self.vocabulary = load_vocabulary(&self.store, &self.config)?;
        info!(mode = %self.config.handle_vocab_uris, "Starting delete");
        Ok(())
    }

    fn on_statement(&mut self, statement: &Statement) -> Result<(), ImportError> {
        match self.buffer.consume(statement, &mut self.vocabulary)? {
            Consumed::Mapped if self.buffer.flush_due() => self.flush_or_continue()?,
            Consumed::BlankNode => self.blank_node_statements += 1,
            _ => {}
        }
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), ImportError> {
        self.flush_or_continue()
    }

    fn summary(&self) -> DeleteSummary {
        let counters = self.buffer.counters();
        let info = (self.blank_node_statements > 0).then(|| {
            format!(
                "{} of the statements could not be deleted, due to containing a blank node.",
                self.blank_node_statements
            )
        });
        DeleteSummary {
            triples_parsed: counters.parsed,
            triples_deleted: counters.mapped,
            not_deleted: self.not_deleted,
            blank_node_statements: self.blank_node_statements,
            nodes_pruned: self.nodes_pruned,
            flushes: self.flushes,
            failed_flushes: self.failed_flushes,
            info,
            warnings: self.warnings.clone(),
        }
    }
}
