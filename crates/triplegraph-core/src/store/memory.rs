//! In-memory graph store on top of petgraph.
//!
//! Used for previews and tests. A transaction keeps a journal of what each
//! mutation replaced and replays it backwards on `rollback`. Nodes and
//! relationships deleted inside a transaction are only hidden until
//! `commit`, so a rollback brings them back under their old ids.

use super::{
    Direction, GraphStore, NodeId, RelId, Relationship, StoreError, StoreStats,
    GRAPH_URI_PROPERTY, RESOURCE_LABEL, URI_PROPERTY,
};
use crate::model::ResourceIdentity;
use crate::value::{PropertyValue, Value};
use petgraph::stable_graph::{EdgeIndex, EdgeReference, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
struct NodeData {
    identity: ResourceIdentity,
    labels: BTreeSet<String>,
    properties: BTreeMap<String, PropertyValue>,
    /// Per-type relationship counts, so degree queries never scan
    out_degree: HashMap<String, usize>,
    in_degree: HashMap<String, usize>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    graph: StableDiGraph<NodeData, String>,
    identities: HashMap<ResourceIdentity, Vec<NodeIndex>>,
    prefixes: BTreeMap<String, String>,
    mappings: BTreeMap<String, String>,
    /// Deleted in the open transaction, removed from `graph` on commit
    hidden_nodes: HashSet<NodeIndex>,
    hidden_edges: HashSet<EdgeIndex>,
}

/// One journaled mutation, holding what it replaced.
#[derive(Debug, Clone)]
enum Undo {
    NodeCreated(NodeIndex),
    NodeHidden {
        node: NodeIndex,
        identity: ResourceIdentity,
        position: usize,
    },
    EdgeCreated(EdgeIndex),
    EdgeHidden(EdgeIndex),
    Label {
        node: NodeIndex,
        label: String,
        was_present: bool,
    },
    Property {
        node: NodeIndex,
        key: String,
        previous: Option<PropertyValue>,
    },
    Prefix {
        prefix: String,
        previous: Option<String>,
    },
    Mapping {
        iri: String,
        previous: Option<String>,
    },
}

/// A graph store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphStore {
    state: MemoryState,
    journal: Option<Vec<Undo>>,
}

fn index(node: NodeId) -> NodeIndex {
    NodeIndex::new(node.0 as usize)
}

fn node_id(idx: NodeIndex) -> NodeId {
    NodeId(idx.index() as u64)
}

fn increment(counts: &mut HashMap<String, usize>, rel_type: &str) {
    *counts.entry(rel_type.to_string()).or_insert(0) += 1;
}

fn decrement(counts: &mut HashMap<String, usize>, rel_type: &str) {
    if let Some(count) = counts.get_mut(rel_type) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(rel_type);
        }
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    fn is_visible(&self, idx: NodeIndex) -> bool {
        !self.state.hidden_nodes.contains(&idx)
    }

    fn node(&self, node: NodeId) -> Result<&NodeData, StoreError> {
        let idx = index(node);
        self.state
            .graph
            .node_weight(idx)
            .filter(|_| self.is_visible(idx))
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeData, StoreError> {
        let idx = index(node);
        if !self.is_visible(idx) {
            return Err(StoreError::NodeNotFound(node));
        }
        self.state
            .graph
            .node_weight_mut(idx)
            .ok_or(StoreError::NodeNotFound(node))
    }

    /// Edges at `idx` in `dir` that are not hidden.
    fn live_edges(
        &self,
        idx: NodeIndex,
        dir: Direction,
    ) -> impl Iterator<Item = EdgeReference<'_, String>> + '_ {
        self.state
            .graph
            .edges_directed(idx, dir)
            .filter(|e| !self.state.hidden_edges.contains(&e.id()))
    }

    fn adjust_degrees(&mut self, edge: EdgeIndex, add: bool) -> Option<()> {
        let (from, to) = self.state.graph.edge_endpoints(edge)?;
        let rel_type = self.state.graph.edge_weight(edge)?.clone();
        let step: fn(&mut HashMap<String, usize>, &str) = if add { increment } else { decrement };
        if let Some(data) = self.state.graph.node_weight_mut(from) {
            step(&mut data.out_degree, &rel_type);
        }
        if let Some(data) = self.state.graph.node_weight_mut(to) {
            step(&mut data.in_degree, &rel_type);
        }
        Some(())
    }

    /// Delete `edge`, or hide it while a transaction is open.
    fn unlink(&mut self, edge: EdgeIndex) -> Option<()> {
        if self.state.hidden_edges.contains(&edge) {
            return None;
        }
        self.adjust_degrees(edge, false)?;
        if self.journal.is_some() {
            self.state.hidden_edges.insert(edge);
            self.record(Undo::EdgeHidden(edge));
        } else {
            self.state.graph.remove_edge(edge);
        }
        Some(())
    }

    fn forget_identity(&mut self, identity: &ResourceIdentity, idx: NodeIndex) -> usize {
        let Some(nodes) = self.state.identities.get_mut(identity) else {
            return 0;
        };
        let position = nodes.iter().position(|n| *n == idx).unwrap_or(nodes.len());
        nodes.retain(|n| *n != idx);
        if nodes.is_empty() {
            self.state.identities.remove(identity);
        }
        position
    }

    fn undo(&mut self, entry: Undo) {
        let state = &mut self.state;
        match entry {
            Undo::NodeCreated(node) => {
                if let Some(data) = state.graph.remove_node(node) {
                    self.forget_identity(&data.identity, node);
                }
            }
            Undo::NodeHidden {
                node,
                identity,
                position,
            } => {
                state.hidden_nodes.remove(&node);
                let nodes = state.identities.entry(identity).or_default();
                let at = position.min(nodes.len());
                nodes.insert(at, node);
            }
            Undo::EdgeCreated(edge) => {
                self.adjust_degrees(edge, false);
                self.state.graph.remove_edge(edge);
            }
            Undo::EdgeHidden(edge) => {
                state.hidden_edges.remove(&edge);
                self.adjust_degrees(edge, true);
            }
            Undo::Label {
                node,
                label,
                was_present,
            } => {
                if let Some(data) = state.graph.node_weight_mut(node) {
                    if was_present {
                        data.labels.insert(label);
                    } else {
                        data.labels.remove(&label);
                    }
                }
            }
            Undo::Property {
                node,
                key,
                previous,
            } => {
                if let Some(data) = state.graph.node_weight_mut(node) {
                    match previous {
                        Some(value) => data.properties.insert(key, value),
                        None => data.properties.remove(&key),
                    };
                }
            }
            Undo::Prefix { prefix, previous } => match previous {
                Some(namespace) => {
                    state.prefixes.insert(prefix, namespace);
                }
                None => {
                    state.prefixes.remove(&prefix);
                }
            },
            Undo::Mapping { iri, previous } => match previous {
                Some(name) => {
                    state.mappings.insert(iri, name);
                }
                None => {
                    state.mappings.remove(&iri);
                }
            },
        }
    }
}

impl GraphStore for MemoryGraphStore {
    fn begin(&mut self) -> Result<(), StoreError> {
        if self.journal.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.journal.take().ok_or(StoreError::NoTransaction)?;
        let state = &mut self.state;
        for edge in state.hidden_edges.drain() {
            state.graph.remove_edge(edge);
        }
        for node in state.hidden_nodes.drain() {
            state.graph.remove_node(node);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let journal = self.journal.take().ok_or(StoreError::NoTransaction)?;
        for entry in journal.into_iter().rev() {
            self.undo(entry);
        }
        Ok(())
    }

    fn find_nodes(&self, identity: &ResourceIdentity) -> Result<Vec<NodeId>, StoreError> {
        Ok(self
            .state
            .identities
            .get(identity)
            .map(|nodes| nodes.iter().copied().map(node_id).collect())
            .unwrap_or_default())
    }

    fn create_node(&mut self, identity: &ResourceIdentity) -> Result<NodeId, StoreError> {
        let mut properties = BTreeMap::new();
        properties.insert(
            URI_PROPERTY.to_string(),
            PropertyValue::Single(Value::text(identity.uri.as_str())),
        );
        if let Some(graph) = &identity.graph {
            properties.insert(
                GRAPH_URI_PROPERTY.to_string(),
                PropertyValue::Single(Value::text(graph.as_str())),
            );
        }

        let idx = self.state.graph.add_node(NodeData {
            identity: identity.clone(),
            labels: BTreeSet::from([RESOURCE_LABEL.to_string()]),
            properties,
            out_degree: HashMap::new(),
            in_degree: HashMap::new(),
        });
        self.state
            .identities
            .entry(identity.clone())
            .or_default()
            .push(idx);
        self.record(Undo::NodeCreated(idx));
        Ok(node_id(idx))
    }

    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError> {
        let idx = index(node);
        let identity = self.node(node)?.identity.clone();

        let edges: Vec<EdgeIndex> = self
            .live_edges(idx, Direction::Outgoing)
            .chain(self.live_edges(idx, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        for edge in edges {
            // self-loops show up twice; the second unlink is a no-op
            self.unlink(edge);
        }

        let position = self.forget_identity(&identity, idx);
        if self.journal.is_some() {
            self.state.hidden_nodes.insert(idx);
            self.record(Undo::NodeHidden {
                node: idx,
                identity,
                position,
            });
        } else {
            self.state.graph.remove_node(idx);
        }
        Ok(())
    }

    fn nodes(&self) -> Result<Vec<NodeId>, StoreError> {
        Ok(self
            .state
            .graph
            .node_indices()
            .filter(|idx| self.is_visible(*idx))
            .map(node_id)
            .collect())
    }

    fn labels(&self, node: NodeId) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.node(node)?.labels.clone())
    }

    fn add_label(&mut self, node: NodeId, label: &str) -> Result<bool, StoreError> {
        let added = self.node_mut(node)?.labels.insert(label.to_string());
        if added {
            self.record(Undo::Label {
                node: index(node),
                label: label.to_string(),
                was_present: false,
            });
        }
        Ok(added)
    }

    fn remove_label(&mut self, node: NodeId, label: &str) -> Result<bool, StoreError> {
        let removed = self.node_mut(node)?.labels.remove(label);
        if removed {
            self.record(Undo::Label {
                node: index(node),
                label: label.to_string(),
                was_present: true,
            });
        }
        Ok(removed)
    }

    fn properties(&self, node: NodeId) -> Result<BTreeMap<String, PropertyValue>, StoreError> {
        Ok(self.node(node)?.properties.clone())
    }

    fn property(&self, node: NodeId, key: &str) -> Result<Option<PropertyValue>, StoreError> {
        Ok(self.node(node)?.properties.get(key).cloned())
    }

    fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: &PropertyValue,
    ) -> Result<(), StoreError> {
        let previous = self
            .node_mut(node)?
            .properties
            .insert(key.to_string(), value.clone());
        self.record(Undo::Property {
            node: index(node),
            key: key.to_string(),
            previous,
        });
        Ok(())
    }

    fn remove_property(&mut self, node: NodeId, key: &str) -> Result<bool, StoreError> {
        let previous = self.node_mut(node)?.properties.remove(key);
        let removed = previous.is_some();
        if removed {
            self.record(Undo::Property {
                node: index(node),
                key: key.to_string(),
                previous,
            });
        }
        Ok(removed)
    }

    fn degree(&self, node: NodeId, rel_type: &str, dir: Direction) -> Result<usize, StoreError> {
        let data = self.node(node)?;
        let counts = match dir {
            Direction::Outgoing => &data.out_degree,
            Direction::Incoming => &data.in_degree,
        };
        Ok(counts.get(rel_type).copied().unwrap_or(0))
    }

    fn total_degree(&self, node: NodeId) -> Result<usize, StoreError> {
        self.node(node)?;
        let idx = index(node);
        let outgoing = self.live_edges(idx, Direction::Outgoing).count();
        // self-loops were already counted as outgoing
        let incoming = self
            .live_edges(idx, Direction::Incoming)
            .filter(|e| e.source() != idx)
            .count();
        Ok(outgoing + incoming)
    }

    fn relationships(
        &self,
        node: NodeId,
        rel_type: &str,
        dir: Direction,
    ) -> Result<Vec<Relationship>, StoreError> {
        self.node(node)?;
        Ok(self
            .live_edges(index(node), dir)
            .filter(|e| e.weight() == rel_type)
            .map(|e| Relationship {
                id: RelId(e.id().index() as u64),
                rel_type: e.weight().clone(),
                from: node_id(e.source()),
                to: node_id(e.target()),
            })
            .collect())
    }

    fn all_relationships(&self) -> Result<Vec<Relationship>, StoreError> {
        let graph = &self.state.graph;
        Ok(graph
            .edge_indices()
            .filter(|e| !self.state.hidden_edges.contains(e))
            .filter_map(|e| {
                let (from, to) = graph.edge_endpoints(e)?;
                Some(Relationship {
                    id: RelId(e.index() as u64),
                    rel_type: graph.edge_weight(e)?.clone(),
                    from: node_id(from),
                    to: node_id(to),
                })
            })
            .collect())
    }

    fn create_relationship(
        &mut self,
        from: NodeId,
        rel_type: &str,
        to: NodeId,
    ) -> Result<RelId, StoreError> {
        self.node(from)?;
        self.node(to)?;
        let edge = self
            .state
            .graph
            .add_edge(index(from), index(to), rel_type.to_string());
        self.adjust_degrees(edge, true);
        self.record(Undo::EdgeCreated(edge));
        Ok(RelId(edge.index() as u64))
    }

    fn delete_relationship(&mut self, rel: RelId) -> Result<(), StoreError> {
        self.unlink(EdgeIndex::new(rel.0 as usize))
            .ok_or(StoreError::RelationshipNotFound(rel))
    }

    fn namespace_prefixes(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .state
            .prefixes
            .iter()
            .map(|(p, ns)| (p.clone(), ns.clone()))
            .collect())
    }

    fn save_namespace_prefix(&mut self, prefix: &str, namespace: &str) -> Result<(), StoreError> {
        let previous = self
            .state
            .prefixes
            .insert(prefix.to_string(), namespace.to_string());
        self.record(Undo::Prefix {
            prefix: prefix.to_string(),
            previous,
        });
        Ok(())
    }

    fn vocabulary_mappings(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .state
            .mappings
            .iter()
            .map(|(iri, name)| (iri.clone(), name.clone()))
            .collect())
    }

    fn add_vocabulary_mapping(&mut self, iri: &str, name: &str) -> Result<(), StoreError> {
        let previous = self
            .state
            .mappings
            .insert(iri.to_string(), name.to_string());
        self.record(Undo::Mapping {
            iri: iri.to_string(),
            previous,
        });
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = &self.state;
        Ok(StoreStats {
            node_count: state.graph.node_count() - state.hidden_nodes.len(),
            relationship_count: state.graph.edge_count() - state.hidden_edges.len(),
            namespace_count: state.prefixes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn test_node_identity() {
        conformance::node_identity(&mut MemoryGraphStore::new());
    }

    #[test]
    fn test_labels_and_properties() {
        conformance::labels_and_properties(&mut MemoryGraphStore::new());
    }

    #[test]
    fn test_relationships_and_degrees() {
        conformance::relationships_and_degrees(&mut MemoryGraphStore::new());
    }

    #[test]
    fn test_rollback_discards_changes() {
        conformance::rollback_discards_changes(&mut MemoryGraphStore::new());
    }

    #[test]
    fn test_rollback_restores_deletions() {
        conformance::rollback_restores_deletions(&mut MemoryGraphStore::new());
    }

    #[test]
    fn test_vocabulary_persistence() {
        conformance::vocabulary_persistence(&mut MemoryGraphStore::new());
    }

    #[test]
    fn test_degree_counters_follow_deletes() {
        let mut store = MemoryGraphStore::new();
        let a = store.create_node(&ResourceIdentity::new("http://a")).unwrap();
        let b = store.create_node(&ResourceIdentity::new("http://b")).unwrap();
        store.create_relationship(a, "t", b).unwrap();
        store.create_relationship(a, "t", a).unwrap();

        assert_eq!(store.degree(a, "t", Direction::Outgoing).unwrap(), 2);
        assert_eq!(store.degree(a, "t", Direction::Incoming).unwrap(), 1);
        assert_eq!(store.total_degree(a).unwrap(), 2);

        store.delete_node(b).unwrap();
        assert_eq!(store.degree(a, "t", Direction::Outgoing).unwrap(), 1);
        assert!(matches!(
            store.labels(b),
            Err(StoreError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_deletes_are_hidden_until_commit() {
        let mut store = MemoryGraphStore::new();
        let a = store.create_node(&ResourceIdentity::new("http://a")).unwrap();
        let b = store.create_node(&ResourceIdentity::new("http://b")).unwrap();
        store.create_relationship(a, "t", a).unwrap();
        store.create_relationship(b, "t", a).unwrap();

        store.begin().unwrap();
        store.delete_node(a).unwrap();
        assert_eq!(store.nodes().unwrap(), vec![b]);
        assert!(store.all_relationships().unwrap().is_empty());
        assert_eq!(store.degree(b, "t", Direction::Outgoing).unwrap(), 0);
        assert_eq!(store.state.graph.node_count(), 2);
        assert!(matches!(
            store.delete_relationship(RelId(0)),
            Err(StoreError::RelationshipNotFound(_))
        ));

        store.commit().unwrap();
        assert_eq!(store.state.graph.node_count(), 1);
        assert_eq!(store.state.graph.edge_count(), 0);
        assert!(store.state.hidden_nodes.is_empty());
        assert!(store.journal.is_none());
    }
}
