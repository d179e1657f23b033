// Imports
use super::{AlignAxis, AlignDirection, ALIGN_MARGIN};
use crate::store::{NodeKey, NodeStore};
use crate::WidgetFlags;
use pinboard_compose::{Spring2d, SpringParams};
use slotmap::SecondaryMap;
use std::time::Instant;

/// The auto-align gesture state.
///
/// Lives on the engine rather than inside the interaction state, because the spring
/// animation keeps running after the mouse is released and is only committed into the
/// store once it settles.
#[derive(Debug, Clone)]
pub struct AutoAlignState {
    /// The packing center: center of the selection bounds at gesture start.
    ///
    /// Packing a row centered here leaves the packed bounds centered here as well, which
    /// is what makes reapplying the same axis idempotent.
    start: na::Vector2<f64>,
    /// World-space mouse position at gesture start. Center of the home circle.
    original_click: na::Vector2<f64>,
    /// Node origins captured once at gesture start. Never updated afterwards.
    originals: SecondaryMap<NodeKey, na::Vector2<f64>>,
    /// The packing order, captured once at gesture start and preserved across axis switches.
    ///
    /// Sorted along the dominant axis of the initial selection bounds. Nothing outside
    /// gesture start may write this.
    master_order: Vec<NodeKey>,
    /// The committed axis and direction, None before the first commit.
    committed: Option<(AlignAxis, AlignDirection)>,
    /// World-space point of the last commit or switch.
    commit_point: na::Vector2<f64>,
    /// Whether the cursor has left the home circle since gesture start.
    ///
    /// Axis switching only re-fires after that happened once.
    has_left_circle: bool,
    /// Whether the current commit packs in reverse master order.
    is_reorder_mode: bool,
    springs: SecondaryMap<NodeKey, Spring2d>,
    animating: bool,
}

impl AutoAlignState {
    /// Commit threshold in css pixels. Divided by the camera scale before comparing in
    /// world coordinates.
    const COMMIT_THRESHOLD: f64 = 40.0;
    /// Home circle radius in css pixels.
    const HOME_CIRCLE_RADIUS: f64 = 100.0;
    /// Cross-axis tolerance for detecting an already-aligned selection, in world units.
    const ALIGNED_EPSILON: f64 = 10.0;
    /// The spring tuning for the align animation.
    pub(crate) const SPRING_PARAMS: SpringParams = SpringParams::new(180.0, 13.0, 1.0 / 40.0);

    /// Start the gesture over the given selection.
    ///
    /// Returns None when the selection has fewer than two nodes.
    pub fn begin(
        store: &NodeStore,
        keys: &[NodeKey],
        click_world: na::Vector2<f64>,
    ) -> Option<Self> {
        if keys.len() < 2 {
            return None;
        }

        let selection_bounds = store.bounds_for_nodes(keys)?;

        let mut originals = SecondaryMap::new();
        for &key in keys {
            originals.insert(key, store.get_node_ref(key)?.pos());
        }

        // Vertical-dominant selections sort by y, otherwise by x.
        let dominant = if selection_bounds.extents()[1] > selection_bounds.extents()[0] {
            AlignAxis::Vertical
        } else {
            AlignAxis::Horizontal
        };
        let mut master_order = keys.to_vec();
        master_order.sort_by(|&a, &b| {
            let pa = originals[a][dominant.along()];
            let pb = originals[b][dominant.along()];
            pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
        });

        Some(Self {
            start: selection_bounds.center().coords,
            original_click: click_world,
            originals,
            master_order,
            committed: None,
            commit_point: click_world,
            has_left_circle: false,
            is_reorder_mode: false,
            springs: SecondaryMap::new(),
            animating: false,
        })
    }

    pub fn animating(&self) -> bool {
        self.animating
    }

    pub fn committed(&self) -> bool {
        self.committed.is_some()
    }

    /// The animated position for the given node, while the animation is in flight.
    pub fn anim_pos(&self, key: NodeKey) -> Option<na::Vector2<f64>> {
        if self.animating {
            self.springs.get(key).map(|spring| spring.pos)
        } else {
            None
        }
    }

    /// Handle pointer movement during the gesture.
    ///
    /// Commits when the dominant component of (mouse - commit point) crosses the threshold;
    /// once committed, further crossings re-commit with the new axis/direction, which also
    /// finalizes the previous arrangement into the store and records an undo entry.
    pub fn handle_drag(
        &mut self,
        store: &mut NodeStore,
        mouse_world: na::Vector2<f64>,
        scale: f64,
        now: Instant,
    ) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();

        if !self.has_left_circle
            && (mouse_world - self.original_click).magnitude()
                > Self::HOME_CIRCLE_RADIUS / scale
        {
            self.has_left_circle = true;
        }

        let delta = mouse_world - self.commit_point;
        let (axis, magnitude) = if delta[0].abs() >= delta[1].abs() {
            (AlignAxis::Horizontal, delta[0].abs())
        } else {
            (AlignAxis::Vertical, delta[1].abs())
        };
        let direction = AlignDirection::from_sign(delta[axis.along()]);

        if magnitude <= Self::COMMIT_THRESHOLD / scale {
            return widget_flags;
        }

        match self.committed {
            None => {
                self.commit(store, axis, direction, mouse_world);
                widget_flags.redraw = true;
            }
            Some((committed_axis, committed_direction)) => {
                // Axis switching is gated on having left the home circle once.
                if self.has_left_circle
                    && (axis != committed_axis || direction != committed_direction)
                {
                    widget_flags |= self.finalize_into_store(store);
                    widget_flags |= store.record(now);
                    self.commit(store, axis, direction, mouse_world);
                    widget_flags.redraw = true;
                }
            }
        }

        widget_flags
    }

    /// Commit the given axis immediately, without any drag. Used by the align shortcuts.
    pub fn commit_axis(&mut self, store: &NodeStore, axis: AlignAxis) {
        self.commit(store, axis, AlignDirection::Positive, self.original_click);
    }

    fn commit(
        &mut self,
        store: &NodeStore,
        axis: AlignAxis,
        direction: AlignDirection,
        commit_point: na::Vector2<f64>,
    ) {
        // Reapplying onto an already-aligned selection reverses the packing for this commit.
        self.is_reorder_mode = self.aligned_on(store, axis);
        self.committed = Some((axis, direction));
        self.commit_point = commit_point;

        for (key, target) in self.compute_targets(store, axis) {
            let pos = self.anim_pos_or_store(store, key).unwrap_or(target);
            if let Some(entry) = self.springs.entry(key) {
                entry
                    .and_modify(|spring| spring.retarget(target))
                    .or_insert_with(|| Spring2d::new(pos, target));
            }
        }
        self.animating = true;
    }

    /// Whether the cross coordinates of all participants are within tolerance of the first,
    /// judged on the effective (possibly mid-animation) positions.
    fn aligned_on(&self, store: &NodeStore, axis: AlignAxis) -> bool {
        let cross = axis.cross();
        let mut positions = self
            .master_order
            .iter()
            .filter_map(|&key| self.anim_pos_or_store(store, key));
        let Some(first) = positions.next() else {
            return false;
        };
        positions.all(|pos| (pos[cross] - first[cross]).abs() <= Self::ALIGNED_EPSILON)
    }

    fn anim_pos_or_store(&self, store: &NodeStore, key: NodeKey) -> Option<na::Vector2<f64>> {
        if self.animating {
            if let Some(spring) = self.springs.get(key) {
                return Some(spring.pos);
            }
        }
        store.get_node_ref(key).map(|node| node.pos())
    }

    /// Compute the packed target positions for the given axis.
    ///
    /// The cross coordinate is the mean of the original cross coordinates; along the axis
    /// the nodes pack in master order (reversed in reorder mode) with a fixed margin,
    /// centered on `start`.
    fn compute_targets(
        &self,
        store: &NodeStore,
        axis: AlignAxis,
    ) -> Vec<(NodeKey, na::Vector2<f64>)> {
        let along = axis.along();
        let cross = axis.cross();

        let mut order = self.master_order.clone();
        if self.is_reorder_mode {
            order.reverse();
        }

        let cross_value = {
            let sum: f64 = order
                .iter()
                .filter_map(|&key| self.originals.get(key).map(|pos| pos[cross]))
                .sum();
            sum / order.len() as f64
        };

        let sizes: Vec<(NodeKey, f64)> = order
            .iter()
            .filter_map(|&key| store.get_node_ref(key).map(|node| (key, node.size()[along])))
            .collect();
        let total: f64 = sizes.iter().map(|(_, extent)| extent).sum::<f64>()
            + ALIGN_MARGIN * (sizes.len().saturating_sub(1)) as f64;

        let mut cursor = self.start[along] - total * 0.5;
        sizes
            .into_iter()
            .map(|(key, extent)| {
                let mut target = na::Vector2::zeros();
                target[along] = cursor;
                target[cross] = cross_value;
                cursor += extent + ALIGN_MARGIN;
                (key, target)
            })
            .collect()
    }

    /// Advance the springs by one frame. Returns true when all of them have settled.
    pub fn step_animation(&mut self) -> bool {
        if !self.animating {
            return true;
        }
        let mut all_settled = true;
        for (_, spring) in self.springs.iter_mut() {
            if !spring.step(Self::SPRING_PARAMS) {
                all_settled = false;
            }
        }
        all_settled
    }

    /// Stop stepping but keep the scratch. Used when the springs settle while the user is
    /// still dragging.
    pub fn pause_animation(&mut self) {
        self.animating = false;
    }

    /// Write the current animated positions into the store.
    pub fn finalize_into_store(&mut self, store: &mut NodeStore) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        for (key, spring) in self.springs.iter() {
            store.update_node(key, |node| node.set_pos(spring.pos));
        }
        widget_flags.redraw = true;
        widget_flags.store_modified = true;
        widget_flags
    }

    /// Snap every spring to its target and write the targets into the store.
    pub fn snap_to_targets(&mut self, store: &mut NodeStore) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        for (_, spring) in self.springs.iter_mut() {
            spring.pos = spring.target;
            spring.vel = na::Vector2::zeros();
        }
        widget_flags |= self.finalize_into_store(store);
        self.animating = false;
        widget_flags
    }

    /// The participating keys in master order.
    pub fn keys(&self) -> &[NodeKey] {
        &self.master_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeType};
    use approx::assert_relative_eq;

    fn store_with_nodes(origins: &[(f64, f64)]) -> (NodeStore, Vec<NodeKey>) {
        let mut store = NodeStore::default();
        let keys = origins
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
    fn master_order_sorted_along_dominant_axis() {
        // Bounds 500x400, horizontal dominant: order by x is a, c, b.
        let (store, keys) = store_with_nodes(&[(0.0, 0.0), (300.0, 50.0), (100.0, 200.0)]);
        let state = AutoAlignState::begin(&store, &keys, na::vector![150.0, 100.0]).unwrap();

        assert_eq!(state.keys(), &[keys[0], keys[2], keys[1]]);
    }

    #[test]
    fn horizontal_targets_pack_around_start() {
        let (store, keys) = store_with_nodes(&[(0.0, 0.0), (300.0, 50.0), (100.0, 200.0)]);
        let state = AutoAlignState::begin(&store, &keys, na::vector![150.0, 100.0]).unwrap();

        let targets = state.compute_targets(&store, AlignAxis::Horizontal);
        // Selection bounds span (0,0)..(500,400), so the packing center x is 250. Total
        // packed length is 3 * 200 + 2 * 20 = 640, the first node starts at 250 - 320.
        let expected_cross = (0.0 + 50.0 + 200.0) / 3.0;
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].0, keys[0]);
        assert_relative_eq!(targets[0].1[0], -70.0);
        assert_relative_eq!(targets[0].1[1], expected_cross);
        assert_eq!(targets[1].0, keys[2]);
        assert_relative_eq!(targets[1].1[0], 150.0);
        assert_eq!(targets[2].0, keys[1]);
        assert_relative_eq!(targets[2].1[0], 370.0);
    }

    #[test]
    fn commit_threshold_scales_with_zoom() {
        let (mut store, keys) = store_with_nodes(&[(0.0, 0.0), (300.0, 50.0)]);
        let click = na::vector![150.0, 100.0];
        let mut state = AutoAlignState::begin(&store, &keys, click).unwrap();
        let now = Instant::now();

        // 30 world units at scale 2.0 is 60 css px, past the 40 px threshold.
        let _ = state.handle_drag(&mut store, click + na::vector![30.0, 0.0], 2.0, now);
        assert!(state.committed());

        let mut state2 = AutoAlignState::begin(&store, &keys, click).unwrap();
        // The same 30 world units at scale 1.0 is below the threshold.
        let _ = state2.handle_drag(&mut store, click + na::vector![30.0, 0.0], 1.0, now);
        assert!(!state2.committed());
    }

    #[test]
    fn reorder_mode_reverses_packing() {
        let (mut store, keys) = store_with_nodes(&[(0.0, 0.0), (300.0, 50.0), (100.0, 200.0)]);
        let click = na::vector![150.0, 100.0];
        let mut state = AutoAlignState::begin(&store, &keys, click).unwrap();
        let now = Instant::now();

        let _ = state.handle_drag(&mut store, click + na::vector![80.0, 0.0], 1.0, now);
        assert!(state.committed());
        assert!(!state.is_reorder_mode);
        let _ = state.snap_to_targets(&mut store);

        // A fresh gesture over the now-aligned selection detects reorder mode at commit.
        let mut second = AutoAlignState::begin(&store, &keys, click).unwrap();
        let _ = second.handle_drag(&mut store, click + na::vector![80.0, 0.0], 1.0, now);
        assert!(second.is_reorder_mode);

        let targets = second.compute_targets(&store, AlignAxis::Horizontal);
        // Reversed master order: b, c, a.
        assert_eq!(targets[0].0, keys[1]);
        assert_eq!(targets[2].0, keys[0]);
    }

    #[test]
    fn axis_switch_keeps_master_order_and_originals() {
        let (mut store, keys) = store_with_nodes(&[(0.0, 0.0), (300.0, 50.0), (100.0, 200.0)]);
        let click = na::vector![150.0, 100.0];
        let mut state = AutoAlignState::begin(&store, &keys, click).unwrap();
        let now = Instant::now();

        let master_order = state.keys().to_vec();
        let originals_a = state.originals[keys[0]];

        let _ = state.handle_drag(&mut store, click + na::vector![80.0, 0.0], 1.0, now);
        // Leave the home circle, then cross the threshold vertically from the new commit point.
        let _ = state.handle_drag(&mut store, click + na::vector![120.0, 0.0], 1.0, now);
        let _ = state.handle_drag(&mut store, click + na::vector![120.0, 90.0], 1.0, now);

        assert_eq!(state.committed, Some((AlignAxis::Vertical, AlignDirection::Positive)));
        assert_eq!(state.keys(), master_order.as_slice());
        assert_eq!(state.originals[keys[0]], originals_a);
    }

    #[test]
    fn no_axis_switch_inside_home_circle() {
        let (mut store, keys) = store_with_nodes(&[(0.0, 0.0), (300.0, 50.0)]);
        let click = na::vector![150.0, 100.0];
        let mut state = AutoAlignState::begin(&store, &keys, click).unwrap();
        let now = Instant::now();

        // Commit horizontally inside the home circle (threshold < circle radius).
        let _ = state.handle_drag(&mut store, click + na::vector![50.0, 0.0], 1.0, now);
        assert_eq!(
            state.committed,
            Some((AlignAxis::Horizontal, AlignDirection::Positive))
        );

        // Still inside the circle: a vertical crossing must not switch the axis.
        let _ = state.handle_drag(&mut store, click + na::vector![50.0, 60.0], 1.0, now);
        assert_eq!(
            state.committed,
            Some((AlignAxis::Horizontal, AlignDirection::Positive))
        );
    }
}
