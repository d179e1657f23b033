
// Imports
use crate::align::{AlignAxis, AutoAlignState, GridAlignState};
use crate::camera::Camera;
use crate::interaction::InteractionState;
use crate::node::{Node, NodeType};
use crate::render::RenderState;
use crate::snapshot::{CanvasSnapshot, NodeRecord, UndoStackRecord};
use crate::storage::CanvasStorage;
use crate::store::{HistoryEntry, NodeKey, NodeStore};
use crate::tasks::{Debouncer, PollOutcome, Poller};
use crate::WidgetFlags;
use futures::channel::mpsc;
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use pinboard_compose::eventresult::{EventPropagation, EventResult};
use pinboard_compose::inputevent::{GestureProgress, InputEvent};
use slotmap::HopSlotMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

/// An engine task, processed with [Engine::handle_engine_task] on the embedder's event loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineTask {
    /// Persist the canvas snapshot and the undo stack.
    PersistCanvas,
    /// Persist the viewport record.
    PersistViewport,
    /// A debounced surface resize has settled; reapply surface-dependent state.
    SurfaceResized,
    /// A polled device scale factor reading.
    ScaleFactorPolled(f64),
    /// Indicates that the application is quitting. Sent to quit the handler which receives
    /// the tasks.
    Quit,
}

#[derive(Debug, Clone)]
pub struct EngineTaskSender(mpsc::UnboundedSender<EngineTask>);

impl EngineTaskSender {
    pub fn send(&self, task: EngineTask) {
        if let Err(e) = self.0.unbounded_send(task) {
            let err = format!("{e:?}");
            error!(
                "Failed to send engine task {:?}, Err: {err}",
                e.into_inner()
            );
        }
    }
}

#[derive(Debug)]
pub struct EngineTaskReceiver(mpsc::UnboundedReceiver<EngineTask>);

impl EngineTaskReceiver {
    pub fn recv(&mut self) -> futures::stream::Next<'_, UnboundedReceiver<EngineTask>> {
        self.0.next()
    }
}

/// The in-process clipboard buffer.
///
/// Holds serialized node records plus the selection bounds center they were copied around,
/// so pasting places the bounding-box center at the mouse.
#[derive(Debug, Clone, Default)]
pub struct ClipboardBuffer {
    records: Vec<NodeRecord>,
    anchor: Option<na::Vector2<f64>>,
}

impl ClipboardBuffer {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The engine: the infinite-canvas core tying together store, camera, gesture state machine,
/// align animators, render pipeline and persistence observers.
#[derive(Debug)]
pub struct Engine {
    pub store: NodeStore,
    pub camera: Camera,
    pub(crate) interaction: InteractionState,
    /// Auto-align scratch; outlives the drag while its springs settle.
    pub(crate) autoalign: Option<AutoAlignState>,
    /// Grid-align scratch; cleared on mouse-up.
    pub(crate) gridalign: Option<GridAlignState>,
    pub(crate) clipboard: ClipboardBuffer,
    pub(crate) render_state: RenderState,
    /// Last known pointer position in surface coordinates.
    pub(crate) cursor_pos: na::Vector2<f64>,
    storage: Option<Box<dyn CanvasStorage + Send>>,
    // the task sender. Must not be modified, only cloned.
    tasks_tx: EngineTaskSender,
    tasks_rx: Option<EngineTaskReceiver>,
    /// Coalesces viewport changes (zoom, pan) into one persist after a quiet period.
    viewport_save_debouncer: Debouncer,
    /// Coalesces surface resize streams into one reapply after a quiet period.
    resize_debouncer: Debouncer,
}

impl Default for Engine {
    fn default() -> Self {
        let (tasks_tx, tasks_rx) = mpsc::unbounded::<EngineTask>();
        let tasks_tx = EngineTaskSender(tasks_tx);

        let viewport_save_debouncer = {
            let tasks_tx = tasks_tx.clone();
            Debouncer::new(
                move || tasks_tx.send(EngineTask::PersistViewport),
                Self::VIEWPORT_SAVE_DEBOUNCE,
            )
        };
        let resize_debouncer = {
            let tasks_tx = tasks_tx.clone();
            Debouncer::new(
                move || tasks_tx.send(EngineTask::SurfaceResized),
                Self::RESIZE_DEBOUNCE,
            )
        };

        Self {
            store: NodeStore::default(),
            camera: Camera::default(),
            interaction: InteractionState::default(),
            autoalign: None,
            gridalign: None,
            clipboard: ClipboardBuffer::default(),
            render_state: RenderState::default(),
            cursor_pos: na::Vector2::zeros(),
            storage: None,
            tasks_tx,
            tasks_rx: Some(EngineTaskReceiver(tasks_rx)),
            viewport_save_debouncer,
            resize_debouncer,
        }
    }
}

impl Engine {
    /// Debounce until a viewport change (zoom, pan) is persisted.
    const VIEWPORT_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);
    /// Debounce for surface resize handling.
    const RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);
    /// Interval of the device scale factor poll.
    const SCALE_FACTOR_POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Offset applied to duplicated nodes so the copies are apparent.
    const DUPLICATE_OFFSET: na::Vector2<f64> = na::vector![20.0, 20.0];
    const TEXT_NODE_DEFAULT_SIZE: na::Vector2<f64> = na::vector![200.0, 100.0];
    const GROUPBOX_DEFAULT_SIZE: na::Vector2<f64> = na::vector![400.0, 300.0];

    pub fn engine_tasks_tx(&self) -> EngineTaskSender {
        self.tasks_tx.clone()
    }

    pub fn take_engine_tasks_rx(&mut self) -> Option<EngineTaskReceiver> {
        self.tasks_rx.take()
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    /// Attach the external persistence collaborator.
    pub fn attach_storage(&mut self, storage: Box<dyn CanvasStorage + Send>) {
        self.storage = Some(storage);
    }

    pub fn detach_storage(&mut self) -> Option<Box<dyn CanvasStorage + Send>> {
        self.storage.take()
    }

    /// Handle an input event. The single entry point of the interaction state machine.
    pub fn handle_event(
        &mut self,
        event: InputEvent,
        now: Instant,
    ) -> (EventResult<GestureProgress>, WidgetFlags) {
        let (event_result, widget_flags) = match event {
            InputEvent::Down {
                pos,
                button,
                modifier_keys,
            } => self.handle_mouse_down(pos, button, &modifier_keys, now),
            InputEvent::Motion { pos, modifier_keys } => {
                self.handle_mouse_motion(pos, &modifier_keys, now)
            }
            InputEvent::Up { pos, button, .. } => self.handle_mouse_up(pos, button, now),
            InputEvent::DoubleClick { pos, .. } => self.handle_double_click(pos, now),
            InputEvent::Wheel { pos, delta_y } => self.handle_wheel(pos, delta_y),
            InputEvent::KeyPressed {
                keyboard_key,
                modifier_keys,
            } => self.handle_key_pressed(keyboard_key, &modifier_keys, now),
            InputEvent::Text { text } => self.handle_text(text, now),
            InputEvent::Cancel => {
                let widget_flags = self.handle_cancel(now);
                (
                    EventResult {
                        handled: true,
                        propagate: EventPropagation::Stop,
                        progress: GestureProgress::Finished,
                    },
                    widget_flags,
                )
            }
        };

        if widget_flags.redraw {
            self.render_state.mark_dirty();
        }
        if widget_flags.view_modified {
            self.schedule_viewport_persist();
        }

        (event_result, widget_flags)
    }

    /// Wheel zoom about the cursor. Modifier keys deliberately play no part here.
    fn handle_wheel(
        &mut self,
        pos: na::Vector2<f64>,
        delta_y: f64,
    ) -> (EventResult<GestureProgress>, WidgetFlags) {
        self.cursor_pos = pos;
        let factor = if delta_y > 0.0 {
            Camera::WHEEL_ZOOM_UP
        } else {
            Camera::WHEEL_ZOOM_DOWN
        };
        let widget_flags = self.camera.zoom_at(pos, factor);

        (
            EventResult {
                handled: true,
                propagate: EventPropagation::Stop,
                progress: GestureProgress::Idle,
            },
            widget_flags,
        )
    }

    /// A commit boundary: record the graph state for undo and persist, best-effort.
    pub(crate) fn commit(&mut self, now: Instant) -> WidgetFlags {
        let mut widget_flags = self.store.record(now);
        widget_flags |= self.persist_canvas();
        widget_flags.store_modified = true;
        widget_flags
    }

    /// Persist the canvas snapshot and the undo stack.
    ///
    /// A failing snapshot write is logged and ignored. A failing undo-stack write clears
    /// the undo history instead of risking cascading quota errors.
    pub(crate) fn persist_canvas(&mut self) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        let snapshot = CanvasSnapshot::from_store(&self.store);
        let undo_stack = UndoStackRecord {
            entries: self
                .store
                .history_up_to_live()
                .map(CanvasSnapshot::from_history_entry)
                .collect(),
        };

        let Some(storage) = self.storage.as_mut() else {
            return widget_flags;
        };
        if let Err(e) = storage.save_canvas_state(&snapshot) {
            error!("Saving the canvas snapshot failed, Err: {e:?}");
        }
        if let Err(e) = storage.save_undo_stack(&undo_stack) {
            error!("Saving the undo stack failed, clearing the history. Err: {e:?}");
            widget_flags |= self
                .store
                .clear_history(self.store.create_history_entry());
        }
        widget_flags
    }

    pub(crate) fn persist_viewport(&mut self) {
        let record = self.camera.extract_viewport_record();
        if let Some(storage) = self.storage.as_mut() {
            if let Err(e) = storage.save_viewport(&record) {
                error!("Saving the viewport record failed, Err: {e:?}");
            }
        }
    }

    /// Schedule a debounced viewport persist. Repeated calls coalesce.
    pub(crate) fn schedule_viewport_persist(&mut self) {
        if let Err(e) = self.viewport_save_debouncer.arm() {
            error!("Scheduling the debounced viewport persist failed, Err: {e:?}");
        }
    }

    /// Update the surface size. The reapply work is debounced while a live resize streams.
    pub fn set_surface_size(&mut self, size: na::Vector2<f64>) -> WidgetFlags {
        let widget_flags = self.camera.set_size(size);
        if let Err(e) = self.resize_debouncer.arm() {
            error!("Scheduling the debounced surface reapply failed, Err: {e:?}");
        }
        widget_flags
    }

    /// Install the 1 Hz scale-factor poll.
    ///
    /// `read_scale_factor` runs on a background thread; readings reach the engine as
    /// [EngineTask::ScaleFactorPolled] and pass the hysteresis in
    /// [Engine::update_scale_factor]. Dropping the returned handle stops the poll.
    pub fn install_scale_factor_poll<F>(&self, read_scale_factor: F) -> Poller
    where
        F: Fn() -> f64 + Send + 'static,
    {
        let tasks_tx = self.tasks_tx.clone();
        Poller::new(
            move || {
                tasks_tx.send(EngineTask::ScaleFactorPolled(read_scale_factor()));
                PollOutcome::Continue
            },
            Self::SCALE_FACTOR_POLL_INTERVAL,
        )
    }

    /// Feed a polled device scale factor. Changes below the hysteresis are ignored.
    pub fn update_scale_factor(&mut self, scale_factor: f64) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        if self.camera.update_scale_factor(scale_factor) {
            widget_flags.redraw = true;
            widget_flags.resize = true;
            self.render_state.mark_dirty();
        }
        widget_flags
    }

    /// Handle a received task from the tasks channel.
    ///
    /// Returns flags plus whether the handler loop should quit.
    pub fn handle_engine_task(&mut self, task: EngineTask) -> (WidgetFlags, bool) {
        let mut widget_flags = WidgetFlags::default();
        match task {
            EngineTask::PersistCanvas => {
                widget_flags |= self.persist_canvas();
            }
            EngineTask::PersistViewport => {
                self.persist_viewport();
            }
            EngineTask::SurfaceResized => {
                widget_flags.redraw = true;
                self.render_state.mark_dirty();
            }
            EngineTask::ScaleFactorPolled(scale_factor) => {
                widget_flags |= self.update_scale_factor(scale_factor);
            }
            EngineTask::Quit => return (widget_flags, true),
        }
        (widget_flags, false)
    }

    /// Advance the align spring animations by one frame.
    pub fn tick_animations(&mut self, now: Instant) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();

        let auto_settled = match self.autoalign.as_mut() {
            Some(autoalign) if autoalign.animating() => {
                widget_flags.redraw = true;
                autoalign.step_animation()
            }
            _ => false,
        };
        if auto_settled {
            if matches!(self.interaction, InteractionState::AutoAlign) {
                // Still dragging: stop the animator but keep the scratch for axis switches.
                if let Some(autoalign) = self.autoalign.as_mut() {
                    autoalign.pause_animation();
                }
            } else if let Some(mut autoalign) = self.autoalign.take() {
                widget_flags |= autoalign.finalize_into_store(&mut self.store);
                widget_flags |= self.commit(now);
            }
        }

        if let Some(gridalign) = self.gridalign.as_mut() {
            if gridalign.animating() {
                widget_flags.redraw = true;
                gridalign.step_animation(&mut self.store);
            }
        }

        if widget_flags.redraw {
            self.render_state.mark_dirty();
        }
        widget_flags
    }

    /// The node position with any in-flight align animation applied.
    pub fn effective_node_pos(&self, key: NodeKey) -> Option<na::Vector2<f64>> {
        self.autoalign
            .as_ref()
            .and_then(|autoalign| autoalign.anim_pos(key))
            .or_else(|| {
                self.gridalign
                    .as_ref()
                    .and_then(|gridalign| gridalign.anim_pos(key))
            })
            .or_else(|| self.store.get_node_ref(key).map(|node| node.pos()))
    }

    /// Signal that a video node is playing; defeats the draw short-circuit.
    pub fn set_media_playing(&mut self, playing: bool) {
        self.render_state.set_media_playing(playing);
    }

    fn abort_align_animations(&mut self) {
        self.autoalign = None;
        self.gridalign = None;
        if self.interaction.align_active() {
            self.interaction = InteractionState::Idle;
        }
    }

    /// Undo the latest changes.
    pub fn undo(&mut self, now: Instant) -> WidgetFlags {
        self.abort_align_animations();
        let mut widget_flags = self.store.undo(now);
        widget_flags |= self.persist_canvas();
        self.render_state.mark_dirty();
        widget_flags
    }

    /// Redo the latest changes.
    pub fn redo(&mut self, now: Instant) -> WidgetFlags {
        self.abort_align_animations();
        let mut widget_flags = self.store.redo(now);
        widget_flags |= self.persist_canvas();
        self.render_state.mark_dirty();
        widget_flags
    }

    pub fn can_undo(&self) -> bool {
        self.store.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.store.can_redo()
    }

    /// Takes a snapshot of the current state.
    pub fn take_snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot::from_store(&self.store)
    }

    /// Import a canvas snapshot, replacing the current graph.
    ///
    /// Any active align animation is aborted and its scratch cleared before the nodes are
    /// rebuilt.
    pub fn load_snapshot(&mut self, snapshot: CanvasSnapshot) -> WidgetFlags {
        self.abort_align_animations();
        self.interaction = InteractionState::Idle;
        let mut widget_flags = self.store.import_nodes(snapshot.into_nodes());
        widget_flags.refresh_ui = true;
        self.render_state.mark_dirty();
        widget_flags
    }

    /// Load everything the storage collaborator has: viewport, canvas, undo stack.
    ///
    /// Corrupt records degrade gracefully: a bad snapshot starts empty, a bad viewport
    /// resets to identity, a bad undo stack just leaves a fresh history.
    pub fn load_from_storage(&mut self, _now: Instant) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        let Some(storage) = self.storage.as_mut() else {
            return widget_flags;
        };

        let viewport = storage.load_viewport();
        let canvas = storage.load_canvas_state();
        let undo_stack = storage.load_undo_stack();

        match viewport {
            Ok(Some(record)) => {
                widget_flags |= self.camera.load_viewport_record(record);
            }
            Ok(None) => {}
            Err(e) => {
                error!("Loading the viewport record failed, keeping identity. Err: {e:?}");
            }
        }

        match canvas {
            Ok(Some(snapshot)) => {
                widget_flags |= self.load_snapshot(snapshot);
            }
            Ok(None) => {}
            Err(e) => {
                error!("Loading the canvas snapshot failed, starting empty. Err: {e:?}");
                widget_flags |= self.store.clear();
            }
        }

        match undo_stack {
            Ok(Some(record)) if !record.entries.is_empty() => {
                let entries = record
                    .entries
                    .into_iter()
                    .map(history_entry_from_snapshot)
                    .collect::<Vec<HistoryEntry>>();
                widget_flags |= self.store.restore_history(entries);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Loading the undo stack failed, starting with a fresh history. Err: {e:?}");
            }
        }

        self.render_state.mark_dirty();
        widget_flags
    }

    /// Ingress for externally created nodes (drag-drop, paste from other apps).
    ///
    /// Appends to the graph, selects the new node and commits undo.
    pub fn insert_node(&mut self, node: Node, now: Instant) -> (NodeKey, WidgetFlags) {
        let key = self.store.insert_node(node);
        self.store.replace_selection(&[key]);
        let mut widget_flags = self.commit(now);
        widget_flags.redraw = true;
        self.render_state.mark_dirty();
        (key, widget_flags)
    }

    /// Delete the selected nodes.
    pub fn delete_selection(&mut self, now: Instant) -> WidgetFlags {
        let selection = self.store.selection_keys_as_rendered();
        if selection.is_empty() {
            return WidgetFlags::default();
        }
        for key in selection {
            self.store.remove_node(key);
        }
        let mut widget_flags = self.commit(now);
        widget_flags.redraw = true;
        widget_flags
    }

    /// Copy the selection into the in-process clipboard.
    pub fn copy_selection(&mut self) -> WidgetFlags {
        let selection = self.store.selection_keys_as_rendered();
        if selection.is_empty() {
            return WidgetFlags::default();
        }
        self.clipboard.records = selection
            .iter()
            .filter_map(|&key| self.store.get_node_ref(key).map(NodeRecord::from_node))
            .collect();
        self.clipboard.anchor = self
            .store
            .selection_bounds()
            .map(|bounds| bounds.center().coords);
        WidgetFlags::default()
    }

    /// Cut: copy, then delete.
    pub fn cut_selection(&mut self, now: Instant) -> WidgetFlags {
        let mut widget_flags = self.copy_selection();
        widget_flags |= self.delete_selection(now);
        widget_flags
    }

    /// Paste the clipboard with its bounding-box center at `pos`.
    pub fn paste_clipboard(&mut self, pos: na::Vector2<f64>, now: Instant) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        if self.clipboard.is_empty() {
            return widget_flags;
        }
        let offset = pos - self.clipboard.anchor.unwrap_or(pos);

        let mut new_keys = Vec::with_capacity(self.clipboard.records.len());
        for record in self.clipboard.records.clone() {
            if let Some(mut node) = record.into_node() {
                node.translate(offset);
                new_keys.push(self.store.insert_node(node));
            }
        }
        self.store.replace_selection(&new_keys);
        widget_flags |= self.commit(now);
        widget_flags.redraw = true;
        widget_flags
    }

    /// Duplicate the selection in place, with a cascading offset.
    pub fn duplicate_selection_in_place(&mut self, now: Instant) -> WidgetFlags {
        let duplicated = self.store.duplicate_selection(Self::DUPLICATE_OFFSET);
        if duplicated.is_empty() {
            return WidgetFlags::default();
        }
        let mut widget_flags = self.commit(now);
        widget_flags.redraw = true;
        widget_flags
    }

    pub fn select_all(&mut self) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        let all = self.store.keys_as_rendered();
        self.store.replace_selection(&all);
        widget_flags.redraw = true;
        widget_flags
    }

    /// Fit the viewport to the selection, or to the whole graph if nothing is selected.
    pub fn fit_view(&mut self) -> WidgetFlags {
        let bounds = self
            .store
            .selection_bounds()
            .or_else(|| self.store.bounds_all());
        match bounds {
            Some(bounds) => self.camera.fit_to(bounds),
            None => WidgetFlags::default(),
        }
    }

    /// Move every selected node one z-step, within its overlapping subset.
    pub fn z_step_selection(&mut self, forward: bool, now: Instant) -> WidgetFlags {
        let selection = self.store.selection_keys_as_rendered();
        let mut changed = false;
        if forward {
            for &key in selection.iter().rev() {
                changed |= self.store.z_step_forward(key);
            }
        } else {
            for &key in selection.iter() {
                changed |= self.store.z_step_backward(key);
            }
        }
        if !changed {
            return WidgetFlags::default();
        }
        let mut widget_flags = self.commit(now);
        widget_flags.redraw = true;
        widget_flags
    }

    /// Immediately auto-align the selection along the given axis (keys `1` / `2`).
    ///
    /// Starts the same spring animation as the drag gesture; the commit happens when it
    /// settles.
    pub fn align_selection(&mut self, axis: AlignAxis) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        let selection = self.store.selection_keys_as_rendered();
        if selection.len() < 2 {
            return widget_flags;
        }
        let anchor = self.camera.screen_to_world(self.cursor_pos);
        if let Some(mut state) = AutoAlignState::begin(&self.store, &selection, anchor) {
            state.commit_axis(&self.store, axis);
            self.autoalign = Some(state);
            widget_flags.redraw = true;
            self.render_state.mark_dirty();
        }
        widget_flags
    }

    /// Toggle title visibility on the selection, skipping text nodes.
    pub fn toggle_selection_titles(&mut self, now: Instant) -> WidgetFlags {
        let selection = self.store.selection_keys_as_rendered();
        let mut changed = false;
        for key in selection {
            let is_text = self
                .store
                .get_node_ref(key)
                .map(|node| node.node_type == NodeType::Text)
                .unwrap_or(true);
            if !is_text {
                self.store
                    .update_node(key, |node| node.flags.hide_title = !node.flags.hide_title);
                changed = true;
            }
        }
        if !changed {
            return WidgetFlags::default();
        }
        let mut widget_flags = self.commit(now);
        widget_flags.redraw = true;
        widget_flags
    }

    /// Create a text node at the given world position (key `t`).
    pub fn create_text_node(&mut self, pos: na::Vector2<f64>, now: Instant) -> WidgetFlags {
        let node = Node::new(NodeType::Text, pos, Self::TEXT_NODE_DEFAULT_SIZE);
        let (_, widget_flags) = self.insert_node(node, now);
        widget_flags
    }

    /// Create an empty group box at the given world position (key `g`).
    pub fn create_groupbox(&mut self, pos: na::Vector2<f64>, now: Instant) -> WidgetFlags {
        let node = Node::new(NodeType::GroupBox, pos, Self::GROUPBOX_DEFAULT_SIZE);
        let (_, widget_flags) = self.insert_node(node, now);
        widget_flags
    }
}

/// Rebuild an in-memory history entry from a persisted snapshot.
fn history_entry_from_snapshot(snapshot: CanvasSnapshot) -> HistoryEntry {
    let mut node_components = HopSlotMap::with_key();
    let mut z_order = Vec::new();
    for node in snapshot.into_nodes() {
        let key = node_components.insert(Arc::new(node));
        z_order.push(key);
    }
    HistoryEntry {
        node_components: Arc::new(node_components),
        z_order: Arc::new(z_order),
    }
}
