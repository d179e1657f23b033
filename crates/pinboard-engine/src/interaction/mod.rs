// Modules
pub(crate) mod events;
pub(crate) mod keyboard;

// Imports
use crate::align::{AutoAlignState, GridAlignState};
use crate::camera::Camera;
use crate::engine::Engine;
use crate::node::Node;
use crate::store::{NodeKey, NodeStore};
use crate::WidgetFlags;
use p2d::bounding_volume::Aabb;
use pinboard_compose::ext::{AabbExt, Vector2Ext};
use pinboard_compose::eventresult::{EventPropagation, EventResult};
use pinboard_compose::hittest;
use pinboard_compose::inputevent::{GestureProgress, ModifierKey, MouseButton};
use slotmap::SecondaryMap;
use std::collections::HashSet;
use std::time::Instant;

/// Side length of the per-node and selection-box resize handles, in css pixels.
pub(crate) const RESIZE_HANDLE_SIZE: f64 = 16.0;
/// Diameter of the rotation handles, in css pixels.
pub(crate) const ROTATE_HANDLE_SIZE: f64 = 16.0;
/// Distance of a rotation handle from the edge it floats above, in css pixels.
pub(crate) const ROTATE_HANDLE_OFFSET: f64 = 24.0;
/// Margin between the multi-selection bounds and its overlay box, in css pixels.
pub(crate) const SELECTION_BOX_MARGIN: f64 = 8.0;
/// Below this on-screen node extent (css pixels) handles are suppressed.
pub(crate) const HANDLE_SUPPRESS_THRESHOLD: f64 = 24.0;
/// A marquee smaller than this (world units) counts as a click.
pub(crate) const MARQUEE_CLICK_EXTENT: f64 = 5.0;

/// Per-node geometry captured at resize gesture start.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResizeStart {
    pub pos: na::Vector2<f64>,
    pub size: na::Vector2<f64>,
    pub aspect: f64,
}

impl ResizeStart {
    fn capture(node: &Node) -> Self {
        Self {
            pos: node.pos(),
            size: node.size(),
            aspect: node.aspect_ratio(),
        }
    }
}

/// The active gesture. Exactly one variant is live at any time; each variant owns the
/// scratch state of its gesture and nothing else. The auto/grid align scratch lives on the
/// engine instead, because their animations outlive the drag.
#[derive(Debug, Clone, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Pan {
        last_pos: na::Vector2<f64>,
    },
    Marquee {
        start_world: na::Vector2<f64>,
        current_world: na::Vector2<f64>,
        /// Deselect everything on mouse-up if no drag occurred.
        background_click_pending: bool,
    },
    DragNode {
        /// Key -> (node.pos - mouse) captured at mouse-down.
        offsets: SecondaryMap<NodeKey, na::Vector2<f64>>,
        moved: bool,
    },
    AltDragDuplicate {
        offsets: SecondaryMap<NodeKey, na::Vector2<f64>>,
    },
    GroupBoxDrag {
        offsets: SecondaryMap<NodeKey, na::Vector2<f64>>,
        moved: bool,
    },
    ResizeSingle {
        key: NodeKey,
        start: ResizeStart,
    },
    ResizeMultiBbox {
        start_bounds: Aabb,
        initial: SecondaryMap<NodeKey, ResizeStart>,
    },
    ResizeMultiHandle {
        anchor: NodeKey,
        initial: SecondaryMap<NodeKey, ResizeStart>,
    },
    RotateSingle {
        key: NodeKey,
        center: na::Vector2<f64>,
        start_angle: f64,
        initial_rotation: f64,
    },
    RotateGroupRigid {
        center: na::Vector2<f64>,
        start_angle: f64,
        /// Applied delta so far, in degrees.
        applied_delta: f64,
        /// The reference node for shift snapping and its initial rotation.
        reference: NodeKey,
        reference_rotation: f64,
        keys: Vec<NodeKey>,
    },
    RotateGroupIndividual {
        anchor: NodeKey,
        center: na::Vector2<f64>,
        start_angle: f64,
        anchor_rotation: f64,
        initial: SecondaryMap<NodeKey, f64>,
    },
    AutoAlign,
    GridAlign,
    EditTitle {
        key: NodeKey,
        buffer: String,
    },
    EditText {
        key: NodeKey,
        buffer: String,
    },
}

impl InteractionState {
    pub(crate) fn is_editing(&self) -> bool {
        matches!(
            self,
            InteractionState::EditTitle { .. } | InteractionState::EditText { .. }
        )
    }

    /// Whether one of the align gestures is live.
    pub(crate) fn align_active(&self) -> bool {
        matches!(
            self,
            InteractionState::AutoAlign | InteractionState::GridAlign
        )
    }
}

/// World position of the resize handle of a node: its bottom-right corner, rotated with it.
pub(crate) fn node_resize_handle_center(node: &Node) -> na::Vector2<f64> {
    hittest::rotate_about(
        node.pos() + node.size(),
        node.center(),
        node.rotation().to_radians(),
    )
}

/// World position of the rotation handle of a node: floating above the top-edge midpoint,
/// rotated with it.
pub(crate) fn node_rotate_handle_center(node: &Node, scale: f64) -> na::Vector2<f64> {
    let local = node.pos() + na::vector![node.size()[0] * 0.5, -ROTATE_HANDLE_OFFSET / scale];
    hittest::rotate_about(local, node.center(), node.rotation().to_radians())
}

/// The multi-selection overlay box: the selection bounds, extended by the overlay margin.
pub(crate) fn selection_box_bounds(store: &NodeStore, camera: &Camera) -> Option<Aabb> {
    if store.selection_keys_as_rendered().len() < 2 {
        return None;
    }
    Some(
        store
            .selection_bounds()?
            .extend_by(na::Vector2::from_element(
                SELECTION_BOX_MARGIN / camera.scale(),
            )),
    )
}

/// World position of the selection-box resize handle (bottom-right corner of the overlay).
pub(crate) fn selection_box_resize_handle_center(box_bounds: Aabb) -> na::Vector2<f64> {
    box_bounds.maxs.coords
}

/// World position of the selection-box rotation handle (floating above the top-edge center).
pub(crate) fn selection_box_rotate_handle_center(box_bounds: Aabb, scale: f64) -> na::Vector2<f64> {
    na::vector![
        box_bounds.center().coords[0],
        box_bounds.mins[1] - ROTATE_HANDLE_OFFSET / scale
    ]
}

fn square_handle_contains(center: na::Vector2<f64>, scale: f64, probe: na::Vector2<f64>) -> bool {
    let half = RESIZE_HANDLE_SIZE * 0.5 / scale;
    (probe[0] - center[0]).abs() <= half && (probe[1] - center[1]).abs() <= half
}

fn circle_handle_contains(center: na::Vector2<f64>, scale: f64, probe: na::Vector2<f64>) -> bool {
    hittest::circle_contains(center, ROTATE_HANDLE_SIZE * 0.5 / scale, probe)
}

fn gesture_started(widget_flags: WidgetFlags) -> (EventResult<GestureProgress>, WidgetFlags) {
    (
        EventResult {
            handled: true,
            propagate: EventPropagation::Stop,
            progress: GestureProgress::InProgress,
        },
        widget_flags,
    )
}

impl Engine {
    /// The single priority-ordered arbitration of mouse-down events.
    ///
    /// The rules are checked top to bottom, the first match wins and claims the gesture.
    pub(crate) fn handle_mouse_down(
        &mut self,
        pos: na::Vector2<f64>,
        button: MouseButton,
        modifier_keys: &HashSet<ModifierKey>,
        now: Instant,
    ) -> (EventResult<GestureProgress>, WidgetFlags) {
        let mut widget_flags = WidgetFlags::default();
        self.cursor_pos = pos;

        let world = self.camera.screen_to_world(pos);
        let scale = self.camera.scale();
        let shift = modifier_keys.contains(&ModifierKey::KeyboardShift);
        let ctrl = modifier_keys.contains(&ModifierKey::KeyboardCtrl);
        let alt = modifier_keys.contains(&ModifierKey::KeyboardAlt);
        let left = button == MouseButton::Left;

        // A mouse-down always ends whatever was live before: commit text editing, divert
        // any still-active gesture as if the mouse had been released here.
        if self.interaction.is_editing() {
            widget_flags |= self.commit_editing(now);
        }
        if !matches!(self.interaction, InteractionState::Idle) {
            widget_flags |= self.finish_gesture(world, now);
        }

        let selection = self.store.selection_keys_as_rendered();

        // 1. The whole-selection rotation handle.
        if left && selection.len() > 1 {
            if let (Some(box_bounds), Some(selection_bounds)) = (
                selection_box_bounds(&self.store, &self.camera),
                self.store.selection_bounds(),
            ) {
                let handle = selection_box_rotate_handle_center(box_bounds, scale);
                if circle_handle_contains(handle, scale, world) {
                    let center = selection_bounds.center().coords;
                    let reference = selection[0];
                    let reference_rotation = self
                        .store
                        .get_node_ref(reference)
                        .map(|node| node.rotation())
                        .unwrap_or(0.0);
                    self.interaction = InteractionState::RotateGroupRigid {
                        center,
                        start_angle: na::Vector2::x().angle_ahead(&(world - center)),
                        applied_delta: 0.0,
                        reference,
                        reference_rotation,
                        keys: selection.clone(),
                    };
                    return gesture_started(widget_flags);
                }
            }
        }

        // 2. A selected node's own rotation handle.
        if left {
            let handle_hit = selection.iter().rev().copied().find(|&key| {
                self.store
                    .get_node_ref(key)
                    .map(|node| {
                        circle_handle_contains(node_rotate_handle_center(node, scale), scale, world)
                    })
                    .unwrap_or(false)
            });
            if let Some(key) = handle_hit {
                if let Some(node) = self.store.get_node_ref(key) {
                    let center = node.center();
                    let start_angle = na::Vector2::x().angle_ahead(&(world - center));
                    if selection.len() == 1 {
                        self.interaction = InteractionState::RotateSingle {
                            key,
                            center,
                            start_angle,
                            initial_rotation: node.rotation(),
                        };
                    } else {
                        let anchor_rotation = node.rotation();
                        let mut initial = SecondaryMap::new();
                        for &sel_key in &selection {
                            if let Some(sel_node) = self.store.get_node_ref(sel_key) {
                                initial.insert(sel_key, sel_node.rotation());
                            }
                        }
                        self.interaction = InteractionState::RotateGroupIndividual {
                            anchor: key,
                            center,
                            start_angle,
                            anchor_rotation,
                            initial,
                        };
                    }
                    return gesture_started(widget_flags);
                }
            }
        }

        let node_hit = self.store.topmost_node_at(world);
        let titlebar_hit = self.store.topmost_titlebar_at(world);
        let empty_space = node_hit.is_none() && titlebar_hit.is_none();

        // 3. Ctrl+Shift on empty space: grid align.
        if left && ctrl && shift && empty_space && !selection.is_empty() {
            if let Some(state) = GridAlignState::begin(&self.store, &selection, world) {
                self.gridalign = Some(state);
                self.interaction = InteractionState::GridAlign;
                widget_flags.redraw = true;
                return gesture_started(widget_flags);
            }
        }

        // 4. Middle button, or Ctrl without Shift: pan.
        if button == MouseButton::Middle || (left && ctrl && !shift) {
            self.interaction = InteractionState::Pan { last_pos: pos };
            return gesture_started(widget_flags);
        }

        // 5. A mid-flight auto-align animation snaps to its targets, commits, and
        //    arbitration continues below.
        if let Some(mut autoalign) = self.autoalign.take() {
            if autoalign.animating() {
                widget_flags |= autoalign.snap_to_targets(&mut self.store);
                widget_flags |= self.commit(now);
            }
        }

        // 6. A group box title bar starts dragging the box with its contained nodes.
        if left {
            if let Some(key) = titlebar_hit {
                self.store.replace_selection(&[key]);
                let mut offsets = SecondaryMap::new();
                let mut drag_keys = vec![key];
                drag_keys.extend(self.store.groupbox_contained_keys(key));
                for drag_key in drag_keys {
                    if let Some(node) = self.store.get_node_ref(drag_key) {
                        offsets.insert(drag_key, node.pos() - world);
                    }
                }
                self.interaction = InteractionState::GroupBoxDrag {
                    offsets,
                    moved: false,
                };
                widget_flags.redraw = true;
                return gesture_started(widget_flags);
            }
        }

        // 7. A selected node's resize handle.
        if left {
            let handle_hit = selection.iter().rev().copied().find(|&key| {
                self.store
                    .get_node_ref(key)
                    .map(|node| square_handle_contains(node_resize_handle_center(node), scale, world))
                    .unwrap_or(false)
            });
            if let Some(key) = handle_hit {
                if selection.len() > 1 {
                    let mut initial = SecondaryMap::new();
                    for &sel_key in &selection {
                        if let Some(node) = self.store.get_node_ref(sel_key) {
                            initial.insert(sel_key, ResizeStart::capture(node));
                        }
                    }
                    self.interaction = InteractionState::ResizeMultiHandle {
                        anchor: key,
                        initial,
                    };
                } else if let Some(node) = self.store.get_node_ref(key) {
                    self.interaction = InteractionState::ResizeSingle {
                        key,
                        start: ResizeStart::capture(node),
                    };
                }
                return gesture_started(widget_flags);
            }
        }

        // 8. Shift on empty space with a multi-selection: auto align.
        if left && shift && !ctrl && empty_space && selection.len() > 1 {
            if let Some(state) = AutoAlignState::begin(&self.store, &selection, world) {
                self.autoalign = Some(state);
                self.interaction = InteractionState::AutoAlign;
                widget_flags.redraw = true;
                return gesture_started(widget_flags);
            }
        }

        // 9. The selection-box resize handle.
        if left && selection.len() > 1 {
            if let (Some(box_bounds), Some(start_bounds)) = (
                selection_box_bounds(&self.store, &self.camera),
                self.store.selection_bounds(),
            ) {
                let handle = selection_box_resize_handle_center(box_bounds);
                if square_handle_contains(handle, scale, world) {
                    let mut initial = SecondaryMap::new();
                    for &sel_key in &selection {
                        if let Some(node) = self.store.get_node_ref(sel_key) {
                            initial.insert(sel_key, ResizeStart::capture(node));
                        }
                    }
                    self.interaction = InteractionState::ResizeMultiBbox {
                        start_bounds,
                        initial,
                    };
                    return gesture_started(widget_flags);
                }
            }
        }

        // 10. Alt on a node clones the selection in place and drags the clones.
        if left && alt {
            if let Some(key) = node_hit {
                if !self.store.selected(key).unwrap_or(false) {
                    self.store.replace_selection(&[key]);
                }
                let duplicated = self.store.duplicate_selection(na::Vector2::zeros());
                // Undo for the duplication is committed at mouse-down already.
                widget_flags |= self.commit(now);

                let mut offsets = SecondaryMap::new();
                for &dup_key in &duplicated {
                    if let Some(node) = self.store.get_node_ref(dup_key) {
                        offsets.insert(dup_key, node.pos() - world);
                    }
                }
                self.interaction = InteractionState::AltDragDuplicate { offsets };
                widget_flags.redraw = true;
                return gesture_started(widget_flags);
            }
        }

        // 11. A plain node hit: toggle with Shift, otherwise select and drag.
        if left {
            if let Some(key) = node_hit {
                if shift {
                    let selected = self.store.selected(key).unwrap_or(false);
                    self.store.set_selected(key, !selected);
                    widget_flags.redraw = true;
                    // Stays idle, ready for a drag of the updated selection.
                    return gesture_started(widget_flags);
                }

                if !self.store.selected(key).unwrap_or(false) {
                    self.store.replace_selection(&[key]);
                }

                // Only the selection moves here. Contained nodes follow a group box
                // solely through its title bar (rule 6).
                let drag_keys = self.store.selection_keys_as_rendered();
                let mut offsets = SecondaryMap::new();
                for &drag_key in &drag_keys {
                    if let Some(node) = self.store.get_node_ref(drag_key) {
                        offsets.insert(drag_key, node.pos() - world);
                    }
                }
                self.interaction = InteractionState::DragNode {
                    offsets,
                    moved: false,
                };
                widget_flags.redraw = true;
                return gesture_started(widget_flags);
            }
        }

        // 12. Empty space without modifiers: marquee, with a pending background click that
        //     deselects everything if no drag occurs.
        if left && empty_space && !shift && !ctrl && !alt {
            self.interaction = InteractionState::Marquee {
                start_world: world,
                current_world: world,
                background_click_pending: true,
            };
            return gesture_started(widget_flags);
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
}
