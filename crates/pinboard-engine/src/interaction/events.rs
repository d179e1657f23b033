// Imports
use super::{
    node_resize_handle_center, node_rotate_handle_center, selection_box_bounds,
    selection_box_resize_handle_center, selection_box_rotate_handle_center, InteractionState,
    MARQUEE_CLICK_EXTENT, RESIZE_HANDLE_SIZE, ROTATE_HANDLE_SIZE,
};
use crate::engine::Engine;
use crate::node::Node;
use crate::WidgetFlags;
use p2d::bounding_volume::Aabb;
use pinboard_compose::eventresult::{EventPropagation, EventResult};
use pinboard_compose::ext::{AabbExt, Vector2Ext};
use pinboard_compose::hittest;
use pinboard_compose::inputevent::{GestureProgress, ModifierKey, MouseButton};
use std::collections::HashSet;
use std::time::Instant;

/// Snap increment for shift-rotation, in degrees.
const ROTATION_SNAP_STEP: f64 = 45.0;
/// The smallest scale the selection bounding-box resize applies.
const BBOX_SCALE_MIN: f64 = 0.1;

fn snap_rotation(initial_rotation: f64, delta: f64) -> f64 {
    let target = ((initial_rotation + delta) / ROTATION_SNAP_STEP).round() * ROTATION_SNAP_STEP;
    target - initial_rotation
}

impl Engine {
    pub(crate) fn handle_mouse_motion(
        &mut self,
        pos: na::Vector2<f64>,
        modifier_keys: &HashSet<ModifierKey>,
        now: Instant,
    ) -> (EventResult<GestureProgress>, WidgetFlags) {
        let mut widget_flags = WidgetFlags::default();
        self.cursor_pos = pos;

        let world = self.camera.screen_to_world(pos);
        let scale = self.camera.scale();
        let shift = modifier_keys.contains(&ModifierKey::KeyboardShift);
        let ctrl = modifier_keys.contains(&ModifierKey::KeyboardCtrl);

        let handled = match &mut self.interaction {
            InteractionState::Idle
            | InteractionState::EditTitle { .. }
            | InteractionState::EditText { .. } => false,
            InteractionState::Pan { last_pos } => {
                let delta = pos - *last_pos;
                *last_pos = pos;
                let offset = self.camera.offset() + delta;
                widget_flags |= self.camera.set_offset(offset);
                true
            }
            InteractionState::Marquee { current_world, .. } => {
                *current_world = world;
                widget_flags.redraw = true;
                true
            }
            InteractionState::DragNode { offsets, moved } => {
                for (key, offset) in offsets.iter() {
                    let target = world + *offset;
                    self.store.update_node(key, |node| node.set_pos(target));
                }
                *moved = true;
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::AltDragDuplicate { offsets } => {
                for (key, offset) in offsets.iter() {
                    let target = world + *offset;
                    self.store.update_node(key, |node| node.set_pos(target));
                }
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::GroupBoxDrag { offsets, moved } => {
                for (key, offset) in offsets.iter() {
                    let target = world + *offset;
                    self.store.update_node(key, |node| node.set_pos(target));
                }
                *moved = true;
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::ResizeSingle { key, start } => {
                let trial = world - start.pos;
                let new_size = if shift {
                    // Shift releases the aspect.
                    na::vector![
                        trial[0].max(Node::MIN_NODE_EXTENT),
                        trial[1].max(Node::MIN_NODE_EXTENT)
                    ]
                } else {
                    let s = (trial[0] / start.size[0])
                        .min(trial[1] / start.size[1])
                        .max(Node::MIN_NODE_EXTENT / start.size[0].min(start.size[1]));
                    start.size * s
                };
                let key = *key;
                self.store.update_node(key, |node| node.set_size(new_size));
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::ResizeMultiBbox {
                start_bounds,
                initial,
            } => {
                let anchor = start_bounds.mins.coords;
                let extents = start_bounds.extents();
                // Trial extents, floored to 10% of the originals.
                let trial = na::vector![
                    (world[0] - anchor[0]).max(BBOX_SCALE_MIN * extents[0]),
                    (world[1] - anchor[1]).max(BBOX_SCALE_MIN * extents[1])
                ];
                let sx = trial[0] / extents[0];
                let sy = trial[1] / extents[1];

                let scale_vec = if shift {
                    na::vector![sx.max(BBOX_SCALE_MIN), sy.max(BBOX_SCALE_MIN)]
                } else {
                    let s = sx.min(sy).max(BBOX_SCALE_MIN);
                    na::vector![s, s]
                };

                for (key, st) in initial.iter() {
                    let new_pos = anchor + (st.pos - anchor).component_mul(&scale_vec);
                    let new_size = st
                        .size
                        .component_mul(&scale_vec)
                        .maxs(&na::Vector2::from_element(Node::MIN_BBOX_EXTENT));
                    self.store.update_node(key, |node| {
                        node.set_pos(new_pos);
                        node.set_size(new_size);
                    });
                }
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::ResizeMultiHandle { anchor, initial } => {
                let Some(anchor_start) = initial.get(*anchor).copied() else {
                    return (
                        EventResult {
                            handled: false,
                            propagate: EventPropagation::Proceed,
                            progress: GestureProgress::InProgress,
                        },
                        widget_flags,
                    );
                };
                // The dragged node is the reference for width and height.
                let new_w = (world[0] - anchor_start.pos[0]).max(Node::MIN_NODE_EXTENT);
                let new_h = (world[1] - anchor_start.pos[1]).max(Node::MIN_NODE_EXTENT);
                let sx = new_w / anchor_start.size[0];
                let sy = new_h / anchor_start.size[1];

                for (key, st) in initial.iter() {
                    let new_size = match (ctrl, shift) {
                        // Match the anchor width and height.
                        (true, true) => na::vector![new_w, new_h],
                        // Match the anchor width, preserve the own aspect.
                        (true, false) => na::vector![new_w, new_w / st.aspect],
                        // Non-uniform.
                        (false, true) => na::vector![st.size[0] * sx, st.size[1] * sy],
                        // Uniform, preserving each node's own aspect.
                        (false, false) => {
                            let s = sx
                                .min(sy)
                                .max(Node::MIN_NODE_EXTENT / st.size[0].min(st.size[1]));
                            st.size * s
                        }
                    };
                    self.store.update_node(key, |node| node.set_size(new_size));
                }
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::RotateSingle {
                key,
                center,
                start_angle,
                initial_rotation,
            } => {
                let angle = na::Vector2::x().angle_ahead(&(world - *center));
                let mut delta = (angle - *start_angle).to_degrees();
                if shift {
                    delta = snap_rotation(*initial_rotation, delta);
                }
                let rotation = *initial_rotation + delta;
                let key = *key;
                self.store
                    .update_node(key, |node| node.set_rotation(rotation));
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::RotateGroupRigid {
                center,
                start_angle,
                applied_delta,
                reference: _,
                reference_rotation,
                keys,
            } => {
                let angle = na::Vector2::x().angle_ahead(&(world - *center));
                let mut delta = (angle - *start_angle).to_degrees();
                if shift {
                    // Snap so the reference node lands on a 45 degree multiple; the same
                    // delta applies to every participant.
                    delta = snap_rotation(*reference_rotation, delta);
                }
                let incremental = delta - *applied_delta;
                *applied_delta = delta;
                let keys = keys.clone();
                let pivot = *center;
                self.store.rotate_nodes_rigid(&keys, incremental, pivot);
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::RotateGroupIndividual {
                anchor: _,
                center,
                start_angle,
                anchor_rotation,
                initial,
            } => {
                let angle = na::Vector2::x().angle_ahead(&(world - *center));
                let mut delta = (angle - *start_angle).to_degrees();
                if shift {
                    delta = snap_rotation(*anchor_rotation, delta);
                }
                for (key, initial_rotation) in initial.iter() {
                    let rotation = *initial_rotation + delta;
                    self.store
                        .update_node(key, |node| node.set_rotation(rotation));
                }
                widget_flags.redraw = true;
                widget_flags.store_modified = true;
                true
            }
            InteractionState::AutoAlign => {
                if let Some(autoalign) = self.autoalign.as_mut() {
                    widget_flags |=
                        autoalign.handle_drag(&mut self.store, world, scale, now);
                }
                true
            }
            InteractionState::GridAlign => {
                if let Some(gridalign) = self.gridalign.as_mut() {
                    widget_flags |= gridalign.handle_drag(&self.store, world);
                }
                true
            }
        };

        (
            EventResult {
                handled,
                propagate: if handled {
                    EventPropagation::Stop
                } else {
                    EventPropagation::Proceed
                },
                progress: if handled {
                    GestureProgress::InProgress
                } else {
                    GestureProgress::Idle
                },
            },
            widget_flags,
        )
    }

    pub(crate) fn handle_mouse_up(
        &mut self,
        pos: na::Vector2<f64>,
        _button: MouseButton,
        now: Instant,
    ) -> (EventResult<GestureProgress>, WidgetFlags) {
        self.cursor_pos = pos;
        let world = self.camera.screen_to_world(pos);
        let was_active = !matches!(self.interaction, InteractionState::Idle);
        let widget_flags = self.finish_gesture(world, now);

        (
            EventResult {
                handled: was_active,
                propagate: if was_active {
                    EventPropagation::Stop
                } else {
                    EventPropagation::Proceed
                },
                progress: if was_active {
                    GestureProgress::Finished
                } else {
                    GestureProgress::Idle
                },
            },
            widget_flags,
        )
    }

    /// End the live gesture as if the mouse was released at `world`, committing whatever it
    /// mutated. Text editing survives this; it ends through [Engine::commit_editing].
    pub(crate) fn finish_gesture(
        &mut self,
        world: na::Vector2<f64>,
        now: Instant,
    ) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        let state = std::mem::take(&mut self.interaction);

        match state {
            InteractionState::Idle => {}
            editing @ (InteractionState::EditTitle { .. } | InteractionState::EditText { .. }) => {
                self.interaction = editing;
            }
            InteractionState::Pan { .. } => {
                self.schedule_viewport_persist();
            }
            InteractionState::Marquee {
                start_world,
                background_click_pending,
                ..
            } => {
                let rect = Aabb::new_positive(start_world.into(), world.into());
                let is_click = rect.extents()[0].max(rect.extents()[1]) < MARQUEE_CLICK_EXTENT;
                if is_click {
                    if background_click_pending {
                        self.store.deselect_all();
                    }
                } else {
                    let hits = self.store.keys_as_rendered_intersecting_bounds(rect);
                    self.store.replace_selection(&hits);
                }
                widget_flags.redraw = true;
            }
            InteractionState::DragNode { moved, .. }
            | InteractionState::GroupBoxDrag { moved, .. } => {
                if moved {
                    widget_flags |= self.commit(now);
                }
                widget_flags.redraw = true;
            }
            InteractionState::AltDragDuplicate { .. } => {
                widget_flags |= self.commit(now);
                widget_flags.redraw = true;
            }
            InteractionState::ResizeSingle { .. }
            | InteractionState::ResizeMultiBbox { .. }
            | InteractionState::ResizeMultiHandle { .. }
            | InteractionState::RotateSingle { .. }
            | InteractionState::RotateGroupRigid { .. }
            | InteractionState::RotateGroupIndividual { .. } => {
                widget_flags |= self.commit(now);
                widget_flags.redraw = true;
            }
            InteractionState::AutoAlign => {
                // Do not snap; the spring finishes on its own and commits natural
                // positions from the animation tick.
                if let Some(mut autoalign) = self.autoalign.take() {
                    if autoalign.animating() {
                        self.autoalign = Some(autoalign);
                    } else if autoalign.committed() {
                        widget_flags |= autoalign.finalize_into_store(&mut self.store);
                        widget_flags |= self.commit(now);
                    }
                }
                widget_flags.redraw = true;
            }
            InteractionState::GridAlign => {
                if let Some(mut gridalign) = self.gridalign.take() {
                    widget_flags |= gridalign.finalize_into_store(&mut self.store);
                    widget_flags |= self.commit(now);
                }
                widget_flags.redraw = true;
            }
        }

        widget_flags
    }

    pub(crate) fn handle_double_click(
        &mut self,
        pos: na::Vector2<f64>,
        now: Instant,
    ) -> (EventResult<GestureProgress>, WidgetFlags) {
        let mut widget_flags = WidgetFlags::default();
        self.cursor_pos = pos;
        let world = self.camera.screen_to_world(pos);
        let scale = self.camera.scale();

        if self.interaction.is_editing() {
            widget_flags |= self.commit_editing(now);
        }

        let selection = self.store.selection_keys_as_rendered();

        // Any rotation handle: zero the rotation of all participants.
        let on_rotation_handle = {
            let group_handle = selection.len() > 1
                && selection_box_bounds(&self.store, &self.camera)
                    .map(|bounds| {
                        hittest::circle_contains(
                            selection_box_rotate_handle_center(bounds, scale),
                            ROTATE_HANDLE_SIZE * 0.5 / scale,
                            world,
                        )
                    })
                    .unwrap_or(false);
            group_handle
                || selection.iter().any(|&key| {
                    self.store
                        .get_node_ref(key)
                        .map(|node| {
                            hittest::circle_contains(
                                node_rotate_handle_center(node, scale),
                                ROTATE_HANDLE_SIZE * 0.5 / scale,
                                world,
                            )
                        })
                        .unwrap_or(false)
                })
        };
        if on_rotation_handle {
            for &key in &selection {
                self.store.update_node(key, |node| node.set_rotation(0.0));
            }
            widget_flags |= self.commit(now);
            widget_flags.redraw = true;
            return handled_result(widget_flags);
        }

        // Any resize handle: restore the original aspect, keeping the current width.
        let on_resize_handle = {
            let group_handle = selection.len() > 1
                && selection_box_bounds(&self.store, &self.camera)
                    .map(|bounds| {
                        let center = selection_box_resize_handle_center(bounds);
                        let half = RESIZE_HANDLE_SIZE * 0.5 / scale;
                        (world[0] - center[0]).abs() <= half && (world[1] - center[1]).abs() <= half
                    })
                    .unwrap_or(false);
            group_handle
                || selection.iter().any(|&key| {
                    self.store
                        .get_node_ref(key)
                        .map(|node| {
                            let center = node_resize_handle_center(node);
                            let half = RESIZE_HANDLE_SIZE * 0.5 / scale;
                            (world[0] - center[0]).abs() <= half
                                && (world[1] - center[1]).abs() <= half
                        })
                        .unwrap_or(false)
                })
        };
        if on_resize_handle {
            for &key in &selection {
                self.store
                    .update_node(key, |node| node.restore_original_aspect());
            }
            widget_flags |= self.commit(now);
            widget_flags.redraw = true;
            return handled_result(widget_flags);
        }

        // Title bar or node body: start editing.
        if let Some(key) = self.store.topmost_titlebar_at(world) {
            let buffer = self
                .store
                .get_node_ref(key)
                .map(|node| node.title.clone())
                .unwrap_or_default();
            self.store.replace_selection(&[key]);
            self.interaction = InteractionState::EditTitle { key, buffer };
            widget_flags.redraw = true;
            return handled_result(widget_flags);
        }
        if let Some(key) = self.store.topmost_node_at(world) {
            self.store.replace_selection(&[key]);
            let node = self.store.get_node_ref(key);
            let is_text = node
                .map(|node| node.node_type == crate::node::NodeType::Text)
                .unwrap_or(false);
            if is_text {
                let buffer = node
                    .and_then(|node| node.properties.text.clone())
                    .unwrap_or_default();
                self.interaction = InteractionState::EditText { key, buffer };
            } else {
                let buffer = node.map(|node| node.title.clone()).unwrap_or_default();
                self.interaction = InteractionState::EditTitle { key, buffer };
            }
            widget_flags.redraw = true;
            return handled_result(widget_flags);
        }

        (
            EventResult {
                handled: false,
                propagate: EventPropagation::Proceed,
                progress: GestureProgress::Idle,
            },
            widget_flags,
        )
    }

    /// Commit a live title/text edit back into the node.
    pub(crate) fn commit_editing(&mut self, now: Instant) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        let state = std::mem::take(&mut self.interaction);

        match state {
            InteractionState::EditTitle { key, buffer } => {
                self.store.update_node(key, |node| node.title = buffer);
                widget_flags |= self.commit(now);
                widget_flags.redraw = true;
            }
            InteractionState::EditText { key, buffer } => {
                self.store
                    .update_node(key, |node| node.properties.text = Some(buffer));
                widget_flags |= self.commit(now);
                widget_flags.redraw = true;
            }
            other => self.interaction = other,
        }

        widget_flags
    }

    /// Handle an unexpected pointer loss: finish the live gesture and reset.
    pub(crate) fn handle_cancel(&mut self, now: Instant) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        if self.interaction.is_editing() {
            widget_flags |= self.commit_editing(now);
        }
        let world = self.camera.screen_to_world(self.cursor_pos);
        widget_flags | self.finish_gesture(world, now)
    }
}

fn handled_result(widget_flags: WidgetFlags) -> (EventResult<GestureProgress>, WidgetFlags) {
    (
        EventResult {
            handled: true,
            propagate: EventPropagation::Stop,
            progress: GestureProgress::Finished,
        },
        widget_flags,
    )
}
