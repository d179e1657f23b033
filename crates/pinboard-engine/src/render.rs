// Imports
use crate::engine::Engine;
use crate::interaction::{
    node_resize_handle_center, node_rotate_handle_center, selection_box_bounds,
    selection_box_resize_handle_center, selection_box_rotate_handle_center, InteractionState,
    HANDLE_SUPPRESS_THRESHOLD, RESIZE_HANDLE_SIZE, ROTATE_HANDLE_SIZE,
};
use crate::node::{Node, NodeType};
use p2d::bounding_volume::{Aabb, BoundingVolume};
use piet::{RenderContext, Text, TextLayoutBuilder};
use pinboard_compose::ext::{AabbExt, Vector2Ext};
use std::time::Instant;

/// Spacing of the background dot grid, in world units.
const GRID_SPACING: f64 = 20.0;
/// Below this scale the dot grid is hidden.
const GRID_MIN_SCALE: f64 = 0.5;
/// Margin around the viewport within which media resources stay loaded, in world units.
const RESOURCE_MARGIN: f64 = 200.0;

const BACKGROUND_COLOR: piet::Color = piet::Color::rgb8(0x1e, 0x1e, 0x22);
const GRID_DOT_COLOR: piet::Color = piet::Color::rgb8(0x3a, 0x3a, 0x42);
const NODE_PLACEHOLDER_COLOR: piet::Color = piet::Color::rgb8(0x55, 0x55, 0x5c);
const NODE_GREYBOX_COLOR: piet::Color = piet::Color::rgb8(0x80, 0x80, 0x88);
const GROUPBOX_BORDER_COLOR: piet::Color = piet::Color::rgb8(0x8a, 0x9a, 0xb0);
const GROUPBOX_TITLEBAR_COLOR: piet::Color = piet::Color::rgba8(0x8a, 0x9a, 0xb0, 0x50);
const SELECTION_OUTLINE_COLOR: piet::Color = piet::Color::rgb8(0x4d, 0x9f, 0xff);
const SELECTION_FILL_COLOR: piet::Color = piet::Color::rgba8(0x4d, 0x9f, 0xff, 0x14);
const HANDLE_FILL_COLOR: piet::Color = piet::Color::rgb8(0xf2, 0xf2, 0xf7);
const MARQUEE_COLOR: piet::Color = piet::Color::rgba8(0x4d, 0x9f, 0xff, 0xcc);
const GRID_ALIGN_RECT_COLOR: piet::Color = piet::Color::rgba8(0x7f, 0xd4, 0x8a, 0xcc);
const OVERLAY_TEXT_COLOR: piet::Color = piet::Color::rgb8(0xb8, 0xb8, 0xc2);

/// The level of detail a node is rendered at, by its on-screen footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LevelOfDetail {
    /// Below 5 css px: a filled rectangle, nothing else.
    FilledRect,
    /// Below 32 css px: a grey box.
    GreyBox,
    /// Below 64 css px: a small thumbnail with nearest-neighbor sampling.
    Thumbnail,
    /// Full resolution with bilinear sampling.
    Full,
}

impl LevelOfDetail {
    /// Pick the level from the node's larger on-screen extent, in css pixels.
    pub fn from_screen_extent(extent: f64) -> Self {
        if extent < 5.0 {
            LevelOfDetail::FilledRect
        } else if extent < 32.0 {
            LevelOfDetail::GreyBox
        } else if extent < 64.0 {
            LevelOfDetail::Thumbnail
        } else {
            LevelOfDetail::Full
        }
    }
}

/// Paints node interiors. The engine draws chrome (placeholders, group box frames,
/// selection overlays); what an image, video or text node looks like inside is the
/// embedder's business.
pub trait NodeRenderer<R>
where
    R: RenderContext,
{
    /// Draw the node interior. The context transform maps the node's world coordinates to
    /// the surface, including its rotation; drawing the rect `pos..pos+size` fills the node.
    fn draw_node(
        &mut self,
        cx: &mut R,
        node: &Node,
        lod: LevelOfDetail,
        show_title: bool,
    ) -> anyhow::Result<()>;
}

/// Demand-driven media resource lifecycle, invoked from the render pass.
///
/// Nodes scrolled into the (margin-extended) viewport get `load_resource`, nodes outside
/// get `unload_resource`. Both must be cheap and idempotent.
pub trait ResourceLifecycle {
    fn load_resource(&mut self, node: &Node);
    fn unload_resource(&mut self, node: &Node);
}

/// A no-op [NodeRenderer], for headless use and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNodeRenderer;

impl<R> NodeRenderer<R> for NullNodeRenderer
where
    R: RenderContext,
{
    fn draw_node(
        &mut self,
        _cx: &mut R,
        _node: &Node,
        _lod: LevelOfDetail,
        _show_title: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A no-op [ResourceLifecycle], for headless use and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResources;

impl ResourceLifecycle for NullResources {
    fn load_resource(&mut self, _node: &Node) {}
    fn unload_resource(&mut self, _node: &Node) {}
}

/// Dirty-flag state of the draw loop.
#[derive(Debug, Clone)]
pub struct RenderState {
    dirty: bool,
    media_playing: bool,
    last_frame: Option<Instant>,
    fps: f64,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            dirty: true,
            media_playing: false,
            last_frame: None,
            fps: 0.0,
        }
    }
}

impl RenderState {
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn set_media_playing(&mut self, playing: bool) {
        self.media_playing = playing;
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_presented(&mut self, now: Instant) {
        if let Some(last) = self.last_frame {
            let elapsed = now.duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                self.fps = 1.0 / elapsed;
            }
        }
        self.last_frame = Some(now);
        self.dirty = false;
    }
}

impl Engine {
    /// Draw one frame.
    ///
    /// Short-circuits when nothing changed, no animation is in flight, and no video is
    /// playing. The animation loop is expected to call this every frame regardless.
    pub fn draw<R>(
        &mut self,
        cx: &mut R,
        node_renderer: &mut impl NodeRenderer<R>,
        resources: &mut impl ResourceLifecycle,
        now: Instant,
    ) -> anyhow::Result<()>
    where
        R: RenderContext,
    {
        let animating = self
            .autoalign
            .as_ref()
            .map(|autoalign| autoalign.animating())
            .unwrap_or(false)
            || self
                .gridalign
                .as_ref()
                .map(|gridalign| gridalign.animating())
                .unwrap_or(false);
        if !self.render_state.dirty && !animating && !self.render_state.media_playing {
            return Ok(());
        }

        let scale = self.camera.scale();
        let viewport = self.camera.viewport();

        cx.clear(None, BACKGROUND_COLOR);
        if scale >= GRID_MIN_SCALE {
            self.draw_grid_dots(cx, viewport);
        }

        // Resource lifecycle: media in the margin-extended viewport loads, the rest unloads.
        let resource_bounds = self.camera.visible_bounds(RESOURCE_MARGIN);
        for key in self.store.keys_as_rendered() {
            let Some(node) = self.store.get_node_ref(key) else {
                continue;
            };
            if !node.node_type.is_media() {
                continue;
            }
            if self.node_effective_bounds(key).intersects(&resource_bounds) {
                resources.load_resource(node);
            } else {
                resources.unload_resource(node);
            }
        }

        // Node pass in z-order, group boxes below everything else.
        let keys = self.store.keys_as_rendered();
        let (groupboxes, others): (Vec<_>, Vec<_>) = keys.into_iter().partition(|&key| {
            self.store
                .get_node_ref(key)
                .map(|node| node.flags.groupbox)
                .unwrap_or(false)
        });
        for key in groupboxes.into_iter().chain(others) {
            if self.node_effective_bounds(key).intersects(&viewport) {
                self.draw_node(cx, node_renderer, key)?;
            }
        }

        self.draw_overlays(cx)?;

        self.render_state.frame_presented(now);
        Ok(())
    }

    /// The node bounds with any in-flight align animation applied.
    fn node_effective_bounds(&self, key: crate::store::NodeKey) -> Aabb {
        let Some(node) = self.store.get_node_ref(key) else {
            return Aabb::new_zero();
        };
        match self.effective_node_pos(key) {
            Some(pos) if pos != node.pos() => {
                let offset = pos - node.pos();
                node.bounds().translate(offset)
            }
            _ => node.bounds(),
        }
    }

    fn draw_grid_dots<R>(&self, cx: &mut R, viewport: Aabb)
    where
        R: RenderContext,
    {
        let dot_radius = 1.0;

        let start_x = (viewport.mins[0] / GRID_SPACING).floor() * GRID_SPACING;
        let start_y = (viewport.mins[1] / GRID_SPACING).floor() * GRID_SPACING;

        let mut y = start_y;
        while y <= viewport.maxs[1] {
            let mut x = start_x;
            while x <= viewport.maxs[0] {
                let screen = self.camera.world_to_screen(na::vector![x, y]);
                cx.fill(
                    kurbo::Circle::new(screen.to_kurbo_point(), dot_radius),
                    &GRID_DOT_COLOR,
                );
                x += GRID_SPACING;
            }
            y += GRID_SPACING;
        }
    }

    fn draw_node<R>(
        &self,
        cx: &mut R,
        node_renderer: &mut impl NodeRenderer<R>,
        key: crate::store::NodeKey,
    ) -> anyhow::Result<()>
    where
        R: RenderContext,
    {
        let Some(node) = self.store.get_node_ref(key) else {
            return Ok(());
        };
        let scale = self.camera.scale();
        let effective_pos = self.effective_node_pos(key).unwrap_or_else(|| node.pos());

        let footprint = node.size().max() * scale;
        let lod = LevelOfDetail::from_screen_extent(footprint);

        cx.save().map_err(|e| anyhow::anyhow!("{e:?}"))?;

        // World-to-surface, with the node rotation about its (effective) center.
        let offset = self.camera.offset();
        let center = effective_pos + node.size() * 0.5;
        let transform = kurbo::Affine::translate(offset.to_kurbo_vec())
            * kurbo::Affine::scale(scale)
            * kurbo::Affine::translate(center.to_kurbo_vec())
            * kurbo::Affine::rotate(node.rotation().to_radians())
            * kurbo::Affine::translate(-center.to_kurbo_vec());
        cx.transform(transform);

        let rect = kurbo::Rect::new(
            effective_pos[0],
            effective_pos[1],
            effective_pos[0] + node.size()[0],
            effective_pos[1] + node.size()[1],
        );

        match lod {
            LevelOfDetail::FilledRect => {
                cx.fill(rect, &NODE_PLACEHOLDER_COLOR);
            }
            LevelOfDetail::GreyBox => {
                cx.fill(rect, &NODE_GREYBOX_COLOR);
            }
            _ => {
                if node.node_type == NodeType::GroupBox {
                    // Group box chrome is engine business: frame plus title bar band.
                    cx.stroke(rect, &GROUPBOX_BORDER_COLOR, 1.5 / scale);
                    let titlebar = kurbo::Rect::new(
                        rect.x0,
                        rect.y0,
                        rect.x1,
                        rect.y0 + Node::GROUPBOX_TITLEBAR_HEIGHT,
                    );
                    cx.fill(titlebar, &GROUPBOX_TITLEBAR_COLOR);
                }
                let show_title = footprint >= 64.0 && !node.flags.hide_title;
                node_renderer.draw_node(cx, node, lod, show_title)?;
            }
        }

        cx.restore().map_err(|e| anyhow::anyhow!("{e:?}"))?;

        // Per-node selection chrome, suppressed in align modes and below the on-screen
        // threshold where handles would overlap the body.
        let selected = self.store.selected(key).unwrap_or(false);
        if selected && !self.interaction.align_active() && footprint >= HANDLE_SUPPRESS_THRESHOLD
        {
            self.draw_node_selection_chrome(cx, node, effective_pos)?;
        }

        Ok(())
    }

    fn draw_node_selection_chrome<R>(
        &self,
        cx: &mut R,
        node: &Node,
        effective_pos: na::Vector2<f64>,
    ) -> anyhow::Result<()>
    where
        R: RenderContext,
    {
        let scale = self.camera.scale();
        let offset = effective_pos - node.pos();

        cx.save().map_err(|e| anyhow::anyhow!("{e:?}"))?;

        // Selection border around the rotated node outline, in surface space.
        let center = self.camera.world_to_screen(node.center() + offset);
        let transform = kurbo::Affine::translate(center.to_kurbo_vec())
            * kurbo::Affine::rotate(node.rotation().to_radians())
            * kurbo::Affine::translate(-center.to_kurbo_vec());
        cx.transform(transform);
        let top_left = self.camera.world_to_screen(node.pos() + offset);
        let border = kurbo::Rect::new(
            top_left[0],
            top_left[1],
            top_left[0] + node.size()[0] * scale,
            top_left[1] + node.size()[1] * scale,
        );
        cx.stroke(border, &SELECTION_OUTLINE_COLOR, 2.0);
        cx.restore().map_err(|e| anyhow::anyhow!("{e:?}"))?;

        // Handles, fixed-size in surface space.
        let resize = self
            .camera
            .world_to_screen(node_resize_handle_center(node) + offset);
        draw_square_handle(cx, resize);
        let rotate = self
            .camera
            .world_to_screen(node_rotate_handle_center(node, scale) + offset);
        draw_circle_handle(cx, rotate);

        Ok(())
    }

    fn draw_overlays<R>(&self, cx: &mut R) -> anyhow::Result<()>
    where
        R: RenderContext,
    {
        let scale = self.camera.scale();

        // Multi-selection box with its handles.
        if !self.interaction.align_active() {
            if let Some(box_bounds) = selection_box_bounds(&self.store, &self.camera) {
                let mins = self.camera.world_to_screen(box_bounds.mins.coords);
                let maxs = self.camera.world_to_screen(box_bounds.maxs.coords);
                let rect = kurbo::Rect::new(mins[0], mins[1], maxs[0], maxs[1]);
                cx.fill(rect, &SELECTION_FILL_COLOR);
                cx.stroke(rect, &SELECTION_OUTLINE_COLOR, 1.0);

                let resize = self
                    .camera
                    .world_to_screen(selection_box_resize_handle_center(box_bounds));
                draw_square_handle(cx, resize);
                let rotate = self
                    .camera
                    .world_to_screen(selection_box_rotate_handle_center(box_bounds, scale));
                draw_circle_handle(cx, rotate);
            }
        }

        // Marquee rectangle.
        if let InteractionState::Marquee {
            start_world,
            current_world,
            ..
        } = &self.interaction
        {
            let start = self.camera.world_to_screen(*start_world);
            let current = self.camera.world_to_screen(*current_world);
            let rect = kurbo::Rect::from_points(start.to_kurbo_point(), current.to_kurbo_point());
            let mut style = piet::StrokeStyle::new();
            style.set_dash_pattern(vec![6.0, 4.0]);
            cx.fill(rect, &SELECTION_FILL_COLOR);
            cx.stroke_styled(rect, &MARQUEE_COLOR, 1.0, &style);
        }

        // Grid-align drag rectangle.
        if let Some(gridalign) = self.gridalign.as_ref() {
            let (start_world, current_world) = gridalign.drag_rect();
            let start = self.camera.world_to_screen(start_world);
            let current = self.camera.world_to_screen(current_world);
            let rect = kurbo::Rect::from_points(start.to_kurbo_point(), current.to_kurbo_point());
            let mut style = piet::StrokeStyle::new();
            style.set_dash_pattern(vec![6.0, 4.0]);
            cx.stroke_styled(rect, &GRID_ALIGN_RECT_COLOR, 1.0, &style);
        }

        // FPS and node count readout.
        let readout = format!(
            "{:.0} fps  {} nodes",
            self.render_state.fps(),
            self.store.node_count()
        );
        let layout = cx
            .text()
            .new_text_layout(readout)
            .default_attribute(piet::TextAttribute::TextColor(OVERLAY_TEXT_COLOR))
            .build()
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        cx.draw_text(&layout, kurbo::Point::new(8.0, 8.0));

        Ok(())
    }
}

fn draw_square_handle<R>(cx: &mut R, center: na::Vector2<f64>)
where
    R: RenderContext,
{
    let half = RESIZE_HANDLE_SIZE * 0.5;
    let rect = kurbo::Rect::new(
        center[0] - half,
        center[1] - half,
        center[0] + half,
        center[1] + half,
    );
    cx.fill(rect, &HANDLE_FILL_COLOR);
    cx.stroke(rect, &SELECTION_OUTLINE_COLOR, 1.0);
}

fn draw_circle_handle<R>(cx: &mut R, center: na::Vector2<f64>)
where
    R: RenderContext,
{
    let circle = kurbo::Circle::new(center.to_kurbo_point(), ROTATE_HANDLE_SIZE * 0.5);
    cx.fill(circle, &HANDLE_FILL_COLOR);
    cx.stroke(circle, &SELECTION_OUTLINE_COLOR, 1.0);
}
