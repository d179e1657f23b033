// Imports
use super::ALIGN_MARGIN;
use crate::store::{NodeKey, NodeStore};
use crate::WidgetFlags;
use pinboard_compose::ext::Vector2Ext;
use pinboard_compose::{Spring2d, SpringParams};
use slotmap::SecondaryMap;

/// The grid-align gesture state.
///
/// The drag rectangle determines the column count; nodes are matched to cells by nearest
/// center, not row-major by index, so resizing the drag box shuffles assignments as little
/// as possible.
#[derive(Debug, Clone)]
pub struct GridAlignState {
    /// World-space drag start.
    drag_start: na::Vector2<f64>,
    /// World-space drag position, updated every move.
    drag_current: na::Vector2<f64>,
    /// The participating keys, in z-order at gesture start.
    keys: Vec<NodeKey>,
    /// Node centers captured at gesture start; cell assignment matches against these.
    origin_centers: SecondaryMap<NodeKey, na::Vector2<f64>>,
    /// Cell extents: the largest node extents plus the margin.
    cell_size: na::Vector2<f64>,
    springs: SecondaryMap<NodeKey, Spring2d>,
    animating: bool,
}

impl GridAlignState {
    /// The drag width must exceed the cell width by this factor before a second column opens.
    const COLUMN_GATE: f64 = 1.1;
    /// The spring tuning for the grid animation.
    pub(crate) const SPRING_PARAMS: SpringParams = SpringParams::new(120.0, 12.0, 1.0 / 60.0);

    /// Start the gesture over the given selection.
    pub fn begin(
        store: &NodeStore,
        keys: &[NodeKey],
        drag_start: na::Vector2<f64>,
    ) -> Option<Self> {
        if keys.is_empty() {
            return None;
        }

        let mut origin_centers = SecondaryMap::new();
        let mut max_extents = na::Vector2::zeros();
        for &key in keys {
            let node = store.get_node_ref(key)?;
            origin_centers.insert(key, node.center());
            max_extents = max_extents.maxs(&node.size());
        }

        Some(Self {
            drag_start,
            drag_current: drag_start,
            keys: keys.to_vec(),
            origin_centers,
            cell_size: max_extents + na::Vector2::from_element(ALIGN_MARGIN),
            springs: SecondaryMap::new(),
            animating: false,
        })
    }

    pub fn animating(&self) -> bool {
        self.animating
    }

    /// The animated position for the given node, while the animation is in flight.
    pub fn anim_pos(&self, key: NodeKey) -> Option<na::Vector2<f64>> {
        if self.animating {
            self.springs.get(key).map(|spring| spring.pos)
        } else {
            None
        }
    }

    /// The live drag rectangle, for the overlay.
    pub fn drag_rect(&self) -> (na::Vector2<f64>, na::Vector2<f64>) {
        (self.drag_start, self.drag_current)
    }

    /// The column count the current drag extent produces.
    pub fn columns(&self) -> usize {
        let drag_width = (self.drag_current[0] - self.drag_start[0]).abs();
        if drag_width > Self::COLUMN_GATE * self.cell_size[0] {
            ((drag_width / self.cell_size[0]).round() as usize).max(1)
        } else {
            1
        }
    }

    pub fn rows(&self) -> usize {
        self.keys.len().div_ceil(self.columns())
    }

    /// Handle pointer movement: recompute the grid and spring every node toward its cell.
    pub fn handle_drag(
        &mut self,
        store: &NodeStore,
        mouse_world: na::Vector2<f64>,
    ) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        self.drag_current = mouse_world;

        for (key, target) in self.compute_targets(store) {
            let pos = self
                .springs
                .get(key)
                .map(|spring| spring.pos)
                .or_else(|| store.get_node_ref(key).map(|node| node.pos()))
                .unwrap_or(target);
            if let Some(entry) = self.springs.entry(key) {
                entry
                    .and_modify(|spring| spring.retarget(target))
                    .or_insert_with(|| Spring2d::new(pos, target));
            }
        }

        self.animating = true;
        widget_flags.redraw = true;
        widget_flags
    }

    /// Compute the target position for every node.
    ///
    /// Cells are walked in row-major order from the quadrant-dependent grid origin; each
    /// cell greedily takes the nearest still-unassigned node (squared distance between the
    /// cell center and the node center at gesture start).
    fn compute_targets(&self, store: &NodeStore) -> Vec<(NodeKey, na::Vector2<f64>)> {
        let columns = self.columns();
        let rows = self.rows();

        // The grid grows from the drag start into the drag direction, in all four quadrants.
        let origin_x = if self.drag_current[0] >= self.drag_start[0] {
            self.drag_start[0]
        } else {
            self.drag_start[0] - columns as f64 * self.cell_size[0]
        };
        let origin_y = if self.drag_current[1] >= self.drag_start[1] {
            self.drag_start[1]
        } else {
            self.drag_start[1] - rows as f64 * self.cell_size[1]
        };
        let origin = na::vector![origin_x, origin_y];

        let mut unassigned = self.keys.clone();
        let mut targets = Vec::with_capacity(self.keys.len());

        'cells: for row in 0..rows {
            for column in 0..columns {
                let cell_origin = origin
                    + na::vector![
                        column as f64 * self.cell_size[0],
                        row as f64 * self.cell_size[1]
                    ];
                let cell_center = cell_origin + self.cell_size * 0.5;

                let nearest = unassigned
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, &key)| {
                        self.origin_centers
                            .get(key)
                            .map(|center| (idx, (center - cell_center).magnitude_squared()))
                    })
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                let Some((idx, _)) = nearest else {
                    break 'cells;
                };
                let key = unassigned.remove(idx);

                let Some(node) = store.get_node_ref(key) else {
                    continue;
                };
                targets.push((key, cell_origin + (self.cell_size - node.size()) * 0.5));

                if unassigned.is_empty() {
                    break 'cells;
                }
            }
        }

        targets
    }

    /// Advance the springs by one frame.
    ///
    /// Springs that settle while the user is still dragging also write through to the node
    /// position so subsequent frames stay stable. Returns true when all have settled.
    pub fn step_animation(&mut self, store: &mut NodeStore) -> bool {
        if !self.animating {
            return true;
        }
        let mut all_settled = true;
        for (key, spring) in self.springs.iter_mut() {
            if spring.step(Self::SPRING_PARAMS) {
                let pos = spring.pos;
                store.update_node(key, |node| node.set_pos(pos));
            } else {
                all_settled = false;
            }
        }
        if all_settled {
            self.animating = false;
        }
        all_settled
    }

    /// Write the current animated positions into the store. Called on mouse-up.
    pub fn finalize_into_store(&mut self, store: &mut NodeStore) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        for (key, spring) in self.springs.iter() {
            store.update_node(key, |node| node.set_pos(spring.pos));
        }
        self.animating = false;
        widget_flags.redraw = true;
        widget_flags.store_modified = true;
        widget_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeType};
    use approx::assert_relative_eq;

    fn store_with_quad() -> (NodeStore, Vec<NodeKey>) {
        let mut store = NodeStore::default();
        let keys = [(0.0, 0.0), (400.0, 0.0), (0.0, 400.0), (400.0, 400.0)]
            .iter()
            .map(|&(x, y)| {
                store.insert_node(Node::new(
                    NodeType::Image,
                    na::vector![x, y],
                    na::vector![200.0, 200.0],
                ))
            })
            .collect();
        (store, keys)
    }

    #[test]
    fn columns_from_drag_extent() {
        let (store, keys) = store_with_quad();
        let mut state = GridAlignState::begin(&store, &keys, na::vector![50.0, 50.0]).unwrap();

        // cell width is 220; 600 wide drag rounds to 3 columns, 4 nodes need 2 rows.
        let _ = state.handle_drag(&store, na::vector![650.0, 650.0]);
        assert_eq!(state.columns(), 2 + 1);
        assert_eq!(state.rows(), 2);

        // Below the 1.1 * cell width gate a single column remains.
        let _ = state.handle_drag(&store, na::vector![50.0 + 230.0, 650.0]);
        assert_eq!(state.columns(), 1);
    }

    #[test]
    fn nearest_center_assignment_preserves_locality() {
        let (store, keys) = store_with_quad();
        let mut state = GridAlignState::begin(&store, &keys, na::vector![50.0, 50.0]).unwrap();
        let _ = state.handle_drag(&store, na::vector![650.0, 650.0]);

        let targets: SecondaryMap<NodeKey, na::Vector2<f64>> =
            state.compute_targets(&store).into_iter().collect();

        // Cells (top-left) are (50,50), (270,50), (490,50), (50,270); nodes are centered
        // in their cell, so the top-left node lands at (60,60).
        assert_relative_eq!(targets[keys[0]][0], 60.0);
        assert_relative_eq!(targets[keys[0]][1], 60.0);
        assert_relative_eq!(targets[keys[1]][0], 280.0);
        assert_relative_eq!(targets[keys[1]][1], 60.0);
        // The bottom-right node takes the third cell of the first row, the bottom-left
        // node wraps to the second row.
        assert_relative_eq!(targets[keys[3]][0], 500.0);
        assert_relative_eq!(targets[keys[3]][1], 60.0);
        assert_relative_eq!(targets[keys[2]][0], 60.0);
        assert_relative_eq!(targets[keys[2]][1], 280.0);
    }

    #[test]
    fn single_node_grid_centers_on_drag_start() {
        let mut store = NodeStore::default();
        let key = store.insert_node(Node::new(
            NodeType::Image,
            na::vector![500.0, 500.0],
            na::vector![200.0, 200.0],
        ));

        let mut state =
            GridAlignState::begin(&store, &[key], na::vector![100.0, 100.0]).unwrap();
        let _ = state.handle_drag(&store, na::vector![120.0, 120.0]);

        assert_eq!(state.columns(), 1);
        assert_eq!(state.rows(), 1);
        let targets = state.compute_targets(&store);
        // One cell with its origin at the drag start; the node is centered in it.
        assert_relative_eq!(targets[0].1[0], 110.0);
        assert_relative_eq!(targets[0].1[1], 110.0);
    }

    #[test]
    fn negative_quadrant_drag_moves_origin() {
        let (store, keys) = store_with_quad();
        let mut state = GridAlignState::begin(&store, &keys, na::vector![650.0, 650.0]).unwrap();
        let _ = state.handle_drag(&store, na::vector![50.0, 50.0]);

        assert_eq!(state.columns(), 3);
        let targets = state.compute_targets(&store);
        // Origin shifts left/up by the full grid extents; every cell stays left/above the start.
        for (_, target) in targets {
            assert!(target[0] + 200.0 <= 650.0 + 1e-9);
            assert!(target[1] + 200.0 <= 650.0 + 1e-9);
        }
    }
}
