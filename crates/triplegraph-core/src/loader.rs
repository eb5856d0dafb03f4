//! Additive statement loading.
//!
//! [`StatementLoader`] buffers statements and, every `commit_size` mapped
//! statements, applies the batch to the store inside one transaction:
//!
//! 1. for each buffered resource: find or create its node, add labels,
//!    merge properties
//! 2. for each buffered edge: find or create both endpoints, create the
//!    relationship unless an identical one exists
//! 3. persist namespace prefixes minted since the last flush
//!
//! A failed flush is rolled back as a whole.

use crate::buffer::{BufferMode, Consumed, PendingBatch, StatementBuffer};
use crate::cache::IdentityCache;
use crate::dedup::{self, LookupStats};
use crate::engine::{push_warning, ImportSummary, StatementSink};
use crate::error::ImportError;
use crate::model::{ResourceIdentity, Statement};
use crate::naming::{NameResolver, NamespacePrefixTable, Vocabulary};
use crate::reconcile::{self, PendingValue};
use crate::store::{GraphStore, NodeId};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use triplegraph_config::{ImportConfig, VocabUriMode};

/// Loads a statement stream into a [`GraphStore`].
pub struct StatementLoader<S: GraphStore> {
    store: S,
    config: ImportConfig,
    buffer: StatementBuffer,
    vocabulary: Vocabulary,
    cache: IdentityCache,
    lookups: LookupStats,
    flushes: u64,
    failed_flushes: u64,
    warnings: Vec<String>,
}

impl<S: GraphStore> StatementLoader<S> {
    /// Loader for triples; statement graphs are ignored.
    pub fn new(store: S, config: &ImportConfig) -> Result<Self, ImportError> {
        Self::with_scope(store, config, false)
    }

    /// Loader for quads; a node's identity includes its graph.
    pub fn for_quads(store: S, config: &ImportConfig) -> Result<Self, ImportError> {
        Self::with_scope(store, config, true)
    }

    fn with_scope(store: S, config: &ImportConfig, graph_scoped: bool) -> Result<Self, ImportError> {
        config.validate()?;
        Ok(Self {
            store,
            config: config.clone(),
            buffer: StatementBuffer::new(config, BufferMode::Load, graph_scoped),
            vocabulary: empty_vocabulary(config),
            cache: IdentityCache::new(config.node_cache_size),
            lookups: LookupStats::default(),
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

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Apply everything buffered in one transaction.
    pub fn flush(&mut self) -> Result<(), ImportError> {
        let (batch, count) = self.buffer.take();
        let mut unsaved = self.vocabulary.prefixes_mut().take_unsaved();
        if batch.is_empty() && unsaved.is_empty() {
            return Ok(());
        }

        let result = self.commit_batch(batch, &mut unsaved);
        self.cache.invalidate();

        match result {
            Ok(discarded) => {
                let mapped = count.saturating_sub(discarded);
                self.buffer.record_mapped(mapped);
                self.flushes += 1;
                debug!(statements = mapped, flush = self.flushes, "Flushed batch");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback() {
                    debug!(error = %rollback_err, "Rollback after failed flush");
                }
                self.vocabulary.prefixes_mut().restore_unsaved(unsaved);
                self.failed_flushes += 1;
                Err(err)
            }
        }
    }

    /// Flush, logging and swallowing the error unless abort-on-error is set.
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

    fn commit_batch(
        &mut self,
        batch: PendingBatch,
        unsaved: &mut Vec<(String, String)>,
    ) -> Result<u64, ImportError> {
        self.store.begin()?;
        let discarded = self.apply(batch)?;
        // Datatype prefixes minted while rendering typed strings
        unsaved.extend(self.vocabulary.prefixes_mut().take_unsaved());
        for (prefix, namespace) in unsaved.iter() {
            self.store.save_namespace_prefix(prefix, namespace)?;
        }
        self.store.commit()?;
        Ok(discarded)
    }

    /// Returns how many buffered values were discarded by the strict type check.
    fn apply(&mut self, batch: PendingBatch) -> Result<u64, ImportError> {
        let strict = self.config.strict_data_type_check;
        let mut discarded = 0u64;

        let mut resources: Vec<_> = batch.resources.into_iter().collect();
        resources.sort_by(|a, b| a.0.cmp(&b.0));

        for (identity, resource) in resources {
            let node = self.node_for(&identity)?;
            for label in &resource.labels {
                self.store.add_label(node, label)?;
            }
            for (key, pending) in resource.properties {
                let existing = match pending {
                    PendingValue::Multi(_) => self.store.property(node, &key)?,
                    PendingValue::Single(_) => None,
                };
                let vocabulary = &mut self.vocabulary;
                let merged = reconcile::merge(existing, pending, strict, |value| {
                    vocabulary.typed_string(&value.lexical(), value.kind().datatype())
                })?;
                if !merged.discarded.is_empty() {
                    discarded += merged.discarded.len() as u64;
                    push_warning(
                        &mut self.warnings,
                        format!("Discarded values of '{key}' whose type differs from its first value"),
                    );
                }
                if merged.retyped {
                    push_warning(
                        &mut self.warnings,
                        format!("Stored mixed-type values of '{key}' as typed strings"),
                    );
                }
                self.store.set_property(node, &key, &merged.value)?;
            }
        }

        let mut edges: Vec<_> = batch.edges.into_iter().collect();
        edges.sort();
        for edge in edges {
            let from = self.node_for(&edge.from)?;
            let to = self.node_for(&edge.to)?;
            let existing = dedup::find_relationship(
                &self.store,
                from,
                &edge.rel_type,
                to,
                self.config.edge_lookup,
                &mut self.lookups,
            )?;
            if existing.is_none() {
                self.store.create_relationship(from, &edge.rel_type, to)?;
            }
        }
        Ok(discarded)
    }

    fn node_for(&mut self, identity: &ResourceIdentity) -> Result<NodeId, ImportError> {
        Ok(self.cache.find_or_create(&mut self.store, identity)?.node())
    }
}

impl<S: GraphStore> StatementSink for StatementLoader<S> {
    type Summary = ImportSummary;

    fn on_start(&mut self) -> Result<(), ImportError> {
        self.vocabulary = load_vocabulary(&self.store, &self.config)?;
        if self.vocabulary.resolver().dropped_type_mapping() {
            self.warnings
                .push("Ignored the mapping for rdf:type; types follow the rdf:type mode".into());
        }
        info!(
            mode = %self.config.handle_vocab_uris,
            prefixes = self.vocabulary.prefixes().len(),
            "Starting load"
        );
        Ok(())
    }

    fn on_statement(&mut self, statement: &Statement) -> Result<(), ImportError> {
        let consumed = self.buffer.consume(statement, &mut self.vocabulary)?;
        if consumed == Consumed::Mapped && self.buffer.flush_due() {
            self.flush_or_continue()?;
        }
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), ImportError> {
        self.flush_or_continue()
    }

    fn summary(&self) -> ImportSummary {
        let counters = self.buffer.counters();
        let namespaces = if self.config.handle_vocab_uris == VocabUriMode::Shorten {
            self.vocabulary
                .prefixes()
                .entries()
                .map(|(p, ns)| (p.to_string(), ns.to_string()))
                .collect()
        } else {
            BTreeMap::new()
        };
        ImportSummary {
            triples_parsed: counters.parsed,
            triples_mapped: counters.mapped,
            flushes: self.flushes,
            failed_flushes: self.failed_flushes,
            relationships_scanned: self.lookups.scanned,
            namespaces,
            warnings: self.warnings.clone(),
        }
    }
}

/// Resolver without mappings and an empty prefix table, replaced on start.
pub(crate) fn empty_vocabulary(config: &ImportConfig) -> Vocabulary {
    Vocabulary::new(
        NameResolver::new(
            config.handle_vocab_uris,
            config.apply_naming_convention,
            std::iter::empty(),
        ),
        NamespacePrefixTable::new(),
    )
}

/// Build the run's vocabulary from the store's persisted prefixes and
/// mappings. Mappings given in the config win over stored ones.
pub(crate) fn load_vocabulary<S: GraphStore + ?Sized>(
    store: &S,
    config: &ImportConfig,
) -> Result<Vocabulary, ImportError> {
    let prefixes = match config.handle_vocab_uris {
        VocabUriMode::Shorten => NamespacePrefixTable::from_entries(store.namespace_prefixes()?)?,
        _ => NamespacePrefixTable::new(),
    };
    let mut mappings: BTreeMap<String, String> = match config.handle_vocab_uris {
        VocabUriMode::Map => store.vocabulary_mappings()?.into_iter().collect(),
        _ => BTreeMap::new(),
    };
    mappings.extend(config.mappings.clone());

    Ok(Vocabulary::new(
        NameResolver::new(
            config.handle_vocab_uris,
            config.apply_naming_convention,
            mappings,
        ),
        prefixes,
    ))
}
