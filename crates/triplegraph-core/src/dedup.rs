//! Relationship deduplication.
//!
//! Before creating an edge the engine checks whether an identical
//! `(from, type, to)` relationship exists. With [`EdgeLookup::MinDegree`]
//! the scan runs from whichever endpoint has fewer relationships of that
//! type, so hub nodes with many incoming edges stay cheap to link to.

use crate::store::{Direction, GraphStore, NodeId, RelId, StoreError};
use triplegraph_config::EdgeLookup;

/// Counters for edge lookups over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStats {
    pub lookups: u64,
    /// Relationships inspected across all lookups
    pub scanned: u64,
}

/// Find an existing `from -[rel_type]-> to` relationship.
pub fn find_relationship<S: GraphStore + ?Sized>(
    store: &S,
    from: NodeId,
    rel_type: &str,
    to: NodeId,
    strategy: EdgeLookup,
    stats: &mut LookupStats,
) -> Result<Option<RelId>, StoreError> {
    stats.lookups += 1;

    let scan_from_source = match strategy {
        EdgeLookup::Outgoing => true,
        EdgeLookup::MinDegree => {
            let out = store.degree(from, rel_type, Direction::Outgoing)?;
            if out == 0 {
                return Ok(None);
            }
            let incoming = store.degree(to, rel_type, Direction::Incoming)?;
            if incoming == 0 {
                return Ok(None);
            }
            out <= incoming
        }
    };

    let (anchor, dir) = if scan_from_source {
        (from, Direction::Outgoing)
    } else {
        (to, Direction::Incoming)
    };

    for rel in store.relationships(anchor, rel_type, dir)? {
        stats.scanned += 1;
        if rel.from == from && rel.to == to {
            return Ok(Some(rel.id));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceIdentity;
    use crate::store::MemoryGraphStore;

    fn node(store: &mut MemoryGraphStore, uri: &str) -> NodeId {
        store.create_node(&ResourceIdentity::new(uri)).unwrap()
    }

    /// `x -> y` plus `fan` other sources pointing at `y`.
    fn hub(fan: usize) -> (MemoryGraphStore, NodeId, NodeId, RelId) {
        let mut store = MemoryGraphStore::new();
        store.begin().unwrap();
        let x = node(&mut store, "http://x");
        let y = node(&mut store, "http://y");
        for i in 0..fan {
            let other = node(&mut store, &format!("http://s{i}"));
            store.create_relationship(other, "LINKS", y).unwrap();
        }
        let rel = store.create_relationship(x, "LINKS", y).unwrap();
        store.commit().unwrap();
        (store, x, y, rel)
    }

    #[test]
    fn test_min_degree_scans_smaller_side() {
        let (store, x, y, rel) = hub(500);
        let mut stats = LookupStats::default();

        let found = find_relationship(&store, x, "LINKS", y, EdgeLookup::MinDegree, &mut stats)
            .unwrap();
        assert_eq!(found, Some(rel));
        assert_eq!(stats.scanned, 1);
    }

    #[test]
    fn test_outgoing_strategy_scans_from_source() {
        let mut store = MemoryGraphStore::new();
        store.begin().unwrap();
        let x = node(&mut store, "http://x");
        let y = node(&mut store, "http://y");
        for i in 0..50 {
            let other = node(&mut store, &format!("http://t{i}"));
            store.create_relationship(x, "LINKS", other).unwrap();
        }
        store.create_relationship(x, "LINKS", y).unwrap();
        store.commit().unwrap();

        let mut outgoing = LookupStats::default();
        find_relationship(&store, x, "LINKS", y, EdgeLookup::Outgoing, &mut outgoing).unwrap();
        let mut min = LookupStats::default();
        find_relationship(&store, x, "LINKS", y, EdgeLookup::MinDegree, &mut min).unwrap();

        assert!(outgoing.scanned > 1);
        assert_eq!(min.scanned, 1);
    }

    #[test]
    fn test_absent_edge_short_circuits() {
        let (store, x, y, _) = hub(3);
        let mut stats = LookupStats::default();

        // Wrong type: out-degree is zero, nothing scanned
        let found =
            find_relationship(&store, x, "OTHER", y, EdgeLookup::MinDegree, &mut stats).unwrap();
        assert_eq!(found, None);
        assert_eq!(stats.scanned, 0);

        // Reverse direction
        let found =
            find_relationship(&store, y, "LINKS", x, EdgeLookup::MinDegree, &mut stats).unwrap();
        assert_eq!(found, None);
        assert_eq!(stats.lookups, 2);
    }
}
