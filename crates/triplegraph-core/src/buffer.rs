//! Statement buffering between flushes.
//!
//! Each statement is classified (exclusion, literal property, type label,
//! relationship) and folded into per-resource pending state. Nothing
//! touches the store until the owning loader or deleter flushes.

use crate::literal::LiteralCoercer;
use crate::model::{vocab, PendingEdge, Resource, ResourceIdentity, Statement, Term};
use crate::naming::{ElementKind, NamespaceError, Vocabulary};
use crate::reconcile::PendingValue;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::trace;
use triplegraph_config::ImportConfig;

/// Whether statements are being added to or subtracted from the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Load,
    Delete,
}

/// Labels and properties collected for one resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingResource {
    pub labels: BTreeSet<String>,
    pub properties: BTreeMap<String, PendingValue>,
}

impl PendingResource {
    /// Number of label and property values carried.
    pub fn value_count(&self) -> usize {
        self.labels.len() + self.properties.values().map(PendingValue::len).sum::<usize>()
    }
}

/// Everything buffered since the last flush.
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    /// Every resource touched, including edge endpoints with nothing else
    pub resources: HashMap<ResourceIdentity, PendingResource>,
    pub edges: HashSet<PendingEdge>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.edges.is_empty()
    }

    fn touch(&mut self, identity: &ResourceIdentity) -> &mut PendingResource {
        self.resources.entry(identity.clone()).or_default()
    }
}

/// Statement counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Every statement seen
    pub parsed: u64,
    /// Statements applied by committed flushes
    pub mapped: u64,
    /// Statements buffered since the last flush
    pub since_last_flush: u64,
}

/// How a statement was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    /// Buffered; counts towards the commit size
    Mapped,
    /// Predicate is on the exclusion list
    Excluded,
    /// String literal rejected by the language filter
    Filtered,
    /// Skipped in delete mode for involving a blank node
    BlankNode,
}

/// Classifies statements into pending labels, properties and edges.
#[derive(Debug)]
pub struct StatementBuffer {
    config: ImportConfig,
    mode: BufferMode,
    graph_scoped: bool,
    coercer: LiteralCoercer,
    pending: PendingBatch,
    counters: Counters,
}

impl StatementBuffer {
    /// `graph_scoped` makes the statement graph part of every identity.
    pub fn new(config: &ImportConfig, mode: BufferMode, graph_scoped: bool) -> Self {
        Self {
            config: config.clone(),
            mode,
            graph_scoped,
            coercer: LiteralCoercer::new(config),
            pending: PendingBatch::default(),
            counters: Counters::default(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the commit size has been reached.
    pub fn flush_due(&self) -> bool {
        self.config
            .commit_size
            .is_reached(self.counters.since_last_flush)
    }

    /// Classify and buffer one statement.
    pub fn consume(
        &mut self,
        statement: &Statement,
        vocabulary: &mut Vocabulary,
    ) -> Result<Consumed, NamespaceError> {
        self.counters.parsed += 1;

        if self.config.is_excluded(&statement.predicate) {
            trace!(predicate = %statement.predicate, "Excluded predicate");
            return Ok(Consumed::Excluded);
        }
        if self.mode == BufferMode::Delete && statement.involves_blank_node() {
            return Ok(Consumed::BlankNode);
        }

        let graph = if self.graph_scoped {
            statement.graph.as_deref()
        } else {
            None
        };
        let subject = statement.subject.identity(graph);

        match &statement.object {
            Term::Literal(literal) => {
                let Some(value) =
                    self.coercer
                        .coerce(&statement.predicate, literal, vocabulary)?
                else {
                    return Ok(Consumed::Filtered);
                };
                let key = vocabulary.name(&statement.predicate, ElementKind::Property)?;
                let multivalued = self.config.is_multivalued(&statement.predicate);
                let resource = self.pending.touch(&subject);
                let mut slot = resource.properties.remove(&key);
                PendingValue::accumulate(&mut slot, value, multivalued);
                if let Some(slot) = slot {
                    resource.properties.insert(key, slot);
                }
            }
            Term::Resource(object) => {
                let types_mode = self.config.handle_rdf_types;
                let is_type = statement.predicate == vocab::RDF_TYPE;
                let type_iri = match object {
                    Resource::Iri(iri) if is_type => Some(iri.as_str()),
                    _ => None,
                };

                match type_iri {
                    Some(iri) if types_mode.creates_labels() => {
                        let label = vocabulary.name(iri, ElementKind::Label)?;
                        self.pending.touch(&subject).labels.insert(label);
                        if types_mode.creates_nodes() {
                            self.push_edge(subject, statement, object.identity(graph), vocabulary)?;
                        }
                    }
                    _ => {
                        self.push_edge(subject, statement, object.identity(graph), vocabulary)?;
                    }
                }
            }
        }

        self.counters.since_last_flush += 1;
        Ok(Consumed::Mapped)
    }

    fn push_edge(
        &mut self,
        from: ResourceIdentity,
        statement: &Statement,
        to: ResourceIdentity,
        vocabulary: &mut Vocabulary,
    ) -> Result<(), NamespaceError> {
        let rel_type = vocabulary.name(&statement.predicate, ElementKind::Relationship)?;
        self.pending.touch(&from);
        self.pending.touch(&to);
        self.pending.edges.insert(PendingEdge { from, rel_type, to });
        Ok(())
    }

    /// Hand over the buffered batch and its statement count.
    pub fn take(&mut self) -> (PendingBatch, u64) {
        let batch = std::mem::take(&mut self.pending);
        let count = std::mem::take(&mut self.counters.since_last_flush);
        (batch, count)
    }

    /// Credit statements applied by a committed flush.
    pub fn record_mapped(&mut self, count: u64) {
        self.counters.mapped += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Literal;
    use crate::naming::{NamespacePrefixTable, NameResolver};
    use crate::value::Value;
    use pretty_assertions::assert_eq;
    use triplegraph_config::{CommitSize, MultivalMode, RdfTypesMode, VocabUriMode};

    const EX: &str = "http://example.org/";

    fn vocabulary(config: &ImportConfig) -> Vocabulary {
        Vocabulary::new(
            NameResolver::new(
                config.handle_vocab_uris,
                config.apply_naming_convention,
                config.mappings.clone(),
            ),
            NamespacePrefixTable::new(),
        )
    }

    fn ex(local: &str) -> String {
        format!("{EX}{local}")
    }

    fn ignore_config() -> ImportConfig {
        ImportConfig {
            handle_vocab_uris: VocabUriMode::Ignore,
            ..Default::default()
        }
    }

    #[test]
    fn test_type_statement_becomes_label() {
        let config = ignore_config();
        let mut vocab = vocabulary(&config);
        let mut buffer = StatementBuffer::new(&config, BufferMode::Load, false);

        let st = Statement::new(Resource::iri(ex("a")), vocab::RDF_TYPE, Term::iri(ex("Person")));
        assert_eq!(buffer.consume(&st, &mut vocab).unwrap(), Consumed::Mapped);

        let (batch, count) = buffer.take();
        assert_eq!(count, 1);
        assert!(batch.edges.is_empty());
        let resource = &batch.resources[&ResourceIdentity::new(ex("a"))];
        assert!(resource.labels.contains("Person"));
    }

    #[test]
    fn test_type_statement_in_nodes_mode() {
        let config = ImportConfig {
            handle_rdf_types: RdfTypesMode::Nodes,
            ..ignore_config()
        };
        let mut vocab = vocabulary(&config);
        let mut buffer = StatementBuffer::new(&config, BufferMode::Load, false);

        let st = Statement::new(Resource::iri(ex("a")), vocab::RDF_TYPE, Term::iri(ex("Person")));
        buffer.consume(&st, &mut vocab).unwrap();
        let (batch, _) = buffer.take();

        assert_eq!(batch.edges.len(), 1);
        assert!(batch.resources.values().all(|r| r.labels.is_empty()));
        assert_eq!(batch.resources.len(), 2);
    }

    #[test]
    fn test_type_statement_in_labels_and_nodes_mode() {
        let config = ImportConfig {
            handle_rdf_types: RdfTypesMode::LabelsAndNodes,
            ..ignore_config()
        };
        let mut vocab = vocabulary(&config);
        let mut buffer = StatementBuffer::new(&config, BufferMode::Load, false);

        let st = Statement::new(Resource::iri(ex("a")), vocab::RDF_TYPE, Term::iri(ex("Person")));
        buffer.consume(&st, &mut vocab).unwrap();
        let (batch, count) = buffer.take();

        assert_eq!(count, 1);
        assert_eq!(batch.edges.len(), 1);
        assert!(batch.resources[&ResourceIdentity::new(ex("a"))]
            .labels
            .contains("Person"));
    }

    #[test]
    fn test_blank_type_object_is_an_edge() {
        let config = ignore_config();
        let mut vocab = vocabulary(&config);
        let mut buffer = StatementBuffer::new(&config, BufferMode::Load, false);

        let st = Statement::new(Resource::iri(ex("a")), vocab::RDF_TYPE, Term::blank("b1"));
        buffer.consume(&st, &mut vocab).unwrap();
        let (batch, _) = buffer.take();

        let edge = batch.edges.iter().next().unwrap();
        assert_eq!(edge.rel_type, "type");
        assert_eq!(edge.to.uri, "bnode://b1");
    }

    #[test]
    fn test_properties_accumulate_per_policy() {
        let config = ImportConfig {
            handle_multival: MultivalMode::Array,
            multival_prop_list: Some(BTreeSet::from([ex("tag")])),
            ..ignore_config()
        };
        let mut vocab = vocabulary(&config);
        let mut buffer = StatementBuffer::new(&config, BufferMode::Load, false);
        let a = Resource::iri(ex("a"));

        for (pred, value) in [("tag", "x"), ("tag", "y"), ("name", "first"), ("name", "last")] {
            let st = Statement::new(a.clone(), ex(pred), Literal::string(value));
            buffer.consume(&st, &mut vocab).unwrap();
        }
        let (batch, count) = buffer.take();
        assert_eq!(count, 4);

        let props = &batch.resources[&ResourceIdentity::new(ex("a"))].properties;
        assert_eq!(
            props["tag"],
            PendingValue::Multi(vec![Value::text("x"), Value::text("y")])
        );
        assert_eq!(props["name"], PendingValue::Single(Value::text("last")));
    }

    #[test]
    fn test_exclusion_and_language_filter_are_not_mapped() {
        let config = ImportConfig {
            predicate_exclusion_list: Some(BTreeSet::from([ex("secret")])),
            language_filter: Some("en".into()),
            ..ignore_config()
        };
        let mut vocab = vocabulary(&config);
        let mut buffer = StatementBuffer::new(&config, BufferMode::Load, false);
        let a = Resource::iri(ex("a"));

        let excluded = Statement::new(a.clone(), ex("secret"), Literal::string("x"));
        let french = Statement::new(a.clone(), ex("label"), Literal::lang("chat", "fr"));
        let english = Statement::new(a, ex("label"), Literal::lang("cat", "EN"));

        assert_eq!(buffer.consume(&excluded, &mut vocab).unwrap(), Consumed::Excluded);
        assert_eq!(buffer.consume(&french, &mut vocab).unwrap(), Consumed::Filtered);
        assert_eq!(buffer.consume(&english, &mut vocab).unwrap(), Consumed::Mapped);

        let counters = buffer.counters();
        assert_eq!(counters.parsed, 3);
        assert_eq!(counters.since_last_flush, 1);
    }

    #[test]
    fn test_delete_mode_skips_blank_nodes() {
        let config = ignore_config();
        let mut vocab = vocabulary(&config);
        let mut buffer = StatementBuffer::new(&config, BufferMode::Delete, false);

        let st = Statement::new(Resource::blank("b0"), ex("name"), Literal::string("x"));
        assert_eq!(buffer.consume(&st, &mut vocab).unwrap(), Consumed::BlankNode);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_graph_scoping() {
        let config = ignore_config();
        let mut vocab = vocabulary(&config);
        let st = Statement::new(Resource::iri(ex("a")), ex("name"), Literal::string("x"))
            .in_graph(ex("g"));

        let mut quads = StatementBuffer::new(&config, BufferMode::Load, true);
        quads.consume(&st, &mut vocab).unwrap();
        let (batch, _) = quads.take();
        assert!(batch
            .resources
            .contains_key(&ResourceIdentity::in_graph(ex("a"), Some(ex("g")))));

        let mut triples = StatementBuffer::new(&config, BufferMode::Load, false);
        triples.consume(&st, &mut vocab).unwrap();
        let (batch, _) = triples.take();
        assert!(batch.resources.contains_key(&ResourceIdentity::new(ex("a"))));
    }

    #[test]
    fn test_flush_due() {
        let config = ImportConfig {
            commit_size: CommitSize::Every(2),
            ..ignore_config()
        };
        let mut vocab = vocabulary(&config);
        let mut buffer = StatementBuffer::new(&config, BufferMode::Load, false);
        let st = Statement::new(Resource::iri(ex("a")), ex("knows"), Term::iri(ex("b")));

        buffer.consume(&st, &mut vocab).unwrap();
        assert!(!buffer.flush_due());
        buffer.consume(&st, &mut vocab).unwrap();
        assert!(buffer.flush_due());

        let (batch, count) = buffer.take();
        assert_eq!(count, 2);
        assert_eq!(batch.edges.len(), 1);
        assert!(!buffer.flush_due());
    }
}
