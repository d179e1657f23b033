// Imports
use super::NodeKey;
use p2d::bounding_volume::Aabb;
use rstar::primitives::{GeomWithData, Rectangle};
use slotmap::SecondaryMap;

type IndexEntry = GeomWithData<Rectangle<[f64; 2]>, NodeKey>;

/// Spatial index over the node bounds, backed by an r-tree.
///
/// Answers the viewport-culling, marquee and overlap queries without walking the whole
/// graph. The bounds each key was indexed under are remembered in a side map, so a node
/// can be re-indexed or dropped as a tree lookup rather than a scan. Callers must
/// re-index a node whenever its geometry changes; loading a snapshot or history entry
/// rebuilds the index wholesale.
#[derive(Debug, Default)]
pub(super) struct SpatialIndex {
    tree: rstar::RTree<IndexEntry>,
    indexed_bounds: SecondaryMap<NodeKey, Aabb>,
}

impl SpatialIndex {
    /// Index a node under its current bounds, replacing any previous entry for the key.
    pub(crate) fn index(&mut self, key: NodeKey, bounds: Aabb) {
        self.remove(key);
        self.tree.insert(index_entry(key, bounds));
        self.indexed_bounds.insert(key, bounds);
    }

    /// Drop a node from the index.
    pub(crate) fn remove(&mut self, key: NodeKey) {
        if let Some(old_bounds) = self.indexed_bounds.remove(key) {
            self.tree.remove(&index_entry(key, old_bounds));
        }
    }

    /// The keys whose indexed bounds intersect the given rect. Unordered.
    pub(crate) fn hits(&self, bounds: Aabb) -> Vec<NodeKey> {
        self.tree
            .locate_in_envelope_intersecting(&rstar::AABB::from_corners(
                [bounds.mins[0], bounds.mins[1]],
                [bounds.maxs[0], bounds.maxs[1]],
            ))
            .map(|entry| entry.data)
            .collect()
    }

    /// Rebuild the whole index from scratch, bulk-loading the tree.
    pub(crate) fn rebuild(&mut self, nodes: Vec<(NodeKey, Aabb)>) {
        self.indexed_bounds = nodes.iter().cloned().collect();
        self.tree = rstar::RTree::bulk_load(
            nodes
                .into_iter()
                .map(|(key, bounds)| index_entry(key, bounds))
                .collect(),
        );
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

fn index_entry(key: NodeKey, bounds: Aabb) -> IndexEntry {
    IndexEntry::new(
        Rectangle::from_corners(
            [bounds.mins[0], bounds.mins[1]],
            [bounds.maxs[0], bounds.maxs[1]],
        ),
        key,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::HopSlotMap;

    fn mint_keys(count: usize) -> Vec<NodeKey> {
        let mut minter: HopSlotMap<NodeKey, ()> = HopSlotMap::with_key();
        (0..count).map(|_| minter.insert(())).collect()
    }

    fn aabb(x0: f64, y0: f64, x1: f64, y1: f64) -> Aabb {
        Aabb::new(na::point![x0, y0], na::point![x1, y1])
    }

    #[test]
    fn hits_only_intersecting_keys() {
        let keys = mint_keys(2);
        let mut index = SpatialIndex::default();
        index.index(keys[0], aabb(0.0, 0.0, 100.0, 100.0));
        index.index(keys[1], aabb(500.0, 500.0, 600.0, 600.0));

        let hits = index.hits(aabb(50.0, 50.0, 120.0, 120.0));
        assert_eq!(hits, vec![keys[0]]);
        assert!(index.hits(aabb(200.0, 200.0, 300.0, 300.0)).is_empty());
    }

    #[test]
    fn reindexing_moves_the_entry() {
        let keys = mint_keys(1);
        let mut index = SpatialIndex::default();
        index.index(keys[0], aabb(0.0, 0.0, 100.0, 100.0));
        index.index(keys[0], aabb(1000.0, 0.0, 1100.0, 100.0));

        assert!(index.hits(aabb(0.0, 0.0, 100.0, 100.0)).is_empty());
        assert_eq!(index.hits(aabb(1050.0, 50.0, 1060.0, 60.0)), vec![keys[0]]);
    }

    #[test]
    fn removal_uses_the_remembered_bounds() {
        let keys = mint_keys(2);
        let mut index = SpatialIndex::default();
        index.index(keys[0], aabb(0.0, 0.0, 100.0, 100.0));
        index.index(keys[1], aabb(50.0, 50.0, 150.0, 150.0));

        index.remove(keys[0]);
        assert_eq!(index.hits(aabb(0.0, 0.0, 200.0, 200.0)), vec![keys[1]]);
        // Removing twice is a no-op.
        index.remove(keys[0]);
    }
}
