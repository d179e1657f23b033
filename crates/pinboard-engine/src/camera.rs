// Imports
use crate::WidgetFlags;
use p2d::bounding_volume::Aabb;
use pinboard_compose::ext::AabbExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The viewport transform between surface (css pixel) and world coordinates.
///
/// `surface = world * scale + offset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename = "camera")]
pub struct Camera {
    /// The offset in surface coordinates.
    #[serde(rename = "offset")]
    offset: na::Vector2<f64>,
    /// The scale, origin at (0.0, 0.0).
    #[serde(rename = "scale")]
    scale: f64,
    /// The surface dimensions in css pixels.
    #[serde(skip)]
    size: na::Vector2<f64>,
    /// The scale factor of the surface, usually 1.0 or 2.0 for high-dpi screens.
    ///
    /// This value could become a non-integer value in the future, so it is stored as float.
    #[serde(skip)]
    scale_factor: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: na::Vector2::zeros(),
            scale: 1.0,
            size: na::vector![800.0, 600.0],
            scale_factor: 1.0,
        }
    }
}

impl Camera {
    /// The wheel zoom factor for one step up.
    pub const WHEEL_ZOOM_UP: f64 = 1.1;
    /// The wheel zoom factor for one step down.
    pub const WHEEL_ZOOM_DOWN: f64 = 0.9;
    /// The largest scale a persisted viewport record is accepted with.
    pub const PERSISTED_SCALE_MAX: f64 = 10.0;
    /// The largest offset component a persisted viewport record is accepted with.
    pub const PERSISTED_OFFSET_MAX: f64 = 1e6;
    /// Scale factor changes below this hysteresis are ignored.
    pub const SCALE_FACTOR_HYSTERESIS: f64 = 0.1;
    /// Padding factor applied when fitting bounds into the viewport.
    const FIT_PADDING: f64 = 0.9;

    pub fn with_offset(mut self, offset: na::Vector2<f64>) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_size(mut self, size: na::Vector2<f64>) -> Self {
        self.size = size;
        self
    }

    /// The current viewport offset in surface coordinate space.
    pub fn offset(&self) -> na::Vector2<f64> {
        self.offset
    }

    pub fn set_offset(&mut self, offset: na::Vector2<f64>) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        self.offset = offset;
        widget_flags.redraw = true;
        widget_flags.view_modified = true;
        widget_flags
    }

    /// The current scale.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The current surface size in css pixels.
    pub fn size(&self) -> na::Vector2<f64> {
        self.size
    }

    pub fn set_size(&mut self, size: na::Vector2<f64>) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        self.size = size;
        widget_flags.redraw = true;
        widget_flags.resize = true;
        widget_flags
    }

    /// The scale factor of the surface.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Update the scale factor, ignoring changes below the hysteresis.
    ///
    /// Returns true when it actually changed.
    pub fn update_scale_factor(&mut self, scale_factor: f64) -> bool {
        if (scale_factor - self.scale_factor).abs() < Self::SCALE_FACTOR_HYSTERESIS {
            return false;
        }
        self.scale_factor = scale_factor;
        true
    }

    /// The physical surface size in device pixels.
    pub fn physical_size(&self) -> na::Vector2<f64> {
        self.size * self.scale_factor
    }

    /// Transform a surface coordinate to world space.
    pub fn screen_to_world(&self, pos: na::Vector2<f64>) -> na::Vector2<f64> {
        (pos - self.offset) / self.scale
    }

    /// Transform a world coordinate to surface space.
    pub fn world_to_screen(&self, pos: na::Vector2<f64>) -> na::Vector2<f64> {
        pos * self.scale + self.offset
    }

    /// Scale about the given surface point so the world coordinate under it stays fixed.
    pub fn zoom_at(&mut self, screen_point: na::Vector2<f64>, factor: f64) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        if !factor.is_finite() || factor <= 0.0 {
            warn!("Ignoring zoom with invalid factor `{factor}`.");
            return widget_flags;
        }

        self.offset = screen_point - (screen_point - self.offset) * factor;
        self.scale *= factor;

        widget_flags.redraw = true;
        widget_flags.zoomed = true;
        widget_flags.view_modified = true;
        widget_flags
    }

    /// The viewport in world coordinate space.
    pub fn viewport(&self) -> Aabb {
        Aabb::new(
            self.screen_to_world(na::Vector2::zeros()).into(),
            self.screen_to_world(self.size).into(),
        )
    }

    /// The world-space viewport, extended by `margin` world units on every side.
    ///
    /// Used by culling and the resource load/unload hooks.
    pub fn visible_bounds(&self, margin: f64) -> Aabb {
        self.viewport().extend_by(na::Vector2::from_element(margin))
    }

    /// The transform from world coords to surface coords.
    ///
    /// To get the inverse, call `.inverse()`.
    pub fn transform(&self) -> na::Affine2<f64> {
        na::try_convert(
            na::Translation2::from(self.offset).to_homogeneous()
                * na::Scale2::from(na::Vector2::from_element(self.scale)).to_homogeneous(),
        )
        .unwrap_or_else(na::Affine2::identity)
    }

    /// Center the viewport on the world origin and reset the scale to 1.0.
    pub fn reset_to_origin(&mut self) -> WidgetFlags {
        self.scale = 1.0;
        self.offset = self.size * 0.5;
        let mut widget_flags = WidgetFlags::default();
        widget_flags.redraw = true;
        widget_flags.zoomed = true;
        widget_flags.view_modified = true;
        widget_flags
    }

    /// Fit the given world bounds into the viewport, centered, with some padding.
    pub fn fit_to(&mut self, bounds: Aabb) -> WidgetFlags {
        let mut widget_flags = WidgetFlags::default();
        let extents = bounds.extents();
        if extents[0] <= 0.0 || extents[1] <= 0.0 {
            return widget_flags;
        }

        self.scale = ((self.size[0] / extents[0]).min(self.size[1] / extents[1])
            * Self::FIT_PADDING)
            .max(f64::MIN_POSITIVE);
        self.offset = self.size * 0.5 - bounds.center().coords * self.scale;

        widget_flags.redraw = true;
        widget_flags.zoomed = true;
        widget_flags.view_modified = true;
        widget_flags
    }

    /// Extract the record that is persisted separately from the canvas snapshot.
    pub fn extract_viewport_record(&self) -> ViewportRecord {
        ViewportRecord {
            offset: [self.offset[0], self.offset[1]],
            scale: self.scale,
        }
    }

    /// Load a persisted viewport record, applying the safety clamp.
    pub fn load_viewport_record(&mut self, record: ViewportRecord) -> WidgetFlags {
        let record = record.sanitized();
        self.offset = na::vector![record.offset[0], record.offset[1]];
        self.scale = record.scale;

        let mut widget_flags = WidgetFlags::default();
        widget_flags.redraw = true;
        widget_flags.view_modified = true;
        widget_flags
    }
}

/// The separately persisted viewport record.
///
/// Deliberately not part of the canvas snapshot: undo must not teleport the camera.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename = "viewport_record")]
pub struct ViewportRecord {
    #[serde(rename = "offset")]
    pub offset: [f64; 2],
    #[serde(rename = "scale")]
    pub scale: f64,
}

impl Default for ViewportRecord {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            scale: 1.0,
        }
    }
}

impl ViewportRecord {
    /// Apply the load-time safety clamp.
    ///
    /// Each violated field is reset on its own: a bad offset keeps a valid scale and vice versa.
    pub fn sanitized(mut self) -> Self {
        let offset_valid = self.offset.iter().all(|component| {
            component.is_finite() && component.abs() <= Camera::PERSISTED_OFFSET_MAX
        });
        if !offset_valid {
            warn!(
                "Persisted viewport offset `{:?}` out of range, resetting.",
                self.offset
            );
            self.offset = [0.0, 0.0];
        }

        if !self.scale.is_finite()
            || self.scale <= 0.0
            || self.scale > Camera::PERSISTED_SCALE_MAX
        {
            warn!(
                "Persisted viewport scale `{}` out of range, resetting.",
                self.scale
            );
            self.scale = 1.0;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn screen_world_roundtrip() {
        let camera = Camera::default()
            .with_scale(1.5)
            .with_offset(na::vector![4.0, 2.0]);

        let world = na::vector![10.0, 2.0];
        let screen = camera.world_to_screen(world);

        assert_relative_eq!(screen[0], 10.0 * 1.5 + 4.0);
        assert_relative_eq!(screen[1], 2.0 * 1.5 + 2.0);
        assert_relative_eq!(camera.screen_to_world(screen)[0], world[0]);
        assert_relative_eq!(camera.screen_to_world(screen)[1], world[1]);
    }

    #[test]
    fn zoom_at_keeps_anchor_fixed() {
        let mut camera = Camera::default()
            .with_scale(2.0)
            .with_offset(na::vector![30.0, -10.0]);
        let anchor = na::vector![123.0, 456.0];
        let world_before = camera.screen_to_world(anchor);

        let _ = camera.zoom_at(anchor, Camera::WHEEL_ZOOM_UP);
        let world_after = camera.screen_to_world(anchor);

        assert_relative_eq!(world_before[0], world_after[0], epsilon = 1e-9);
        assert_relative_eq!(world_before[1], world_after[1], epsilon = 1e-9);
        assert_relative_eq!(camera.scale(), 2.0 * Camera::WHEEL_ZOOM_UP);
    }

    #[test]
    fn viewport_bounds() {
        let camera = Camera::default()
            .with_scale(2.0)
            .with_offset(na::vector![10.0, 10.0])
            .with_size(na::vector![20.0, 30.0]);

        let viewport = camera.viewport();
        assert_relative_eq!(viewport.mins[0], -5.0);
        assert_relative_eq!(viewport.mins[1], -5.0);
        assert_relative_eq!(viewport.maxs[0], 5.0);
        assert_relative_eq!(viewport.maxs[1], 10.0);
    }

    #[test]
    fn viewport_record_clamp_resets_offset_keeps_scale() {
        let record = ViewportRecord {
            offset: [f64::INFINITY, 0.0],
            scale: 1.0,
        }
        .sanitized();

        assert_eq!(record.offset, [0.0, 0.0]);
        assert_relative_eq!(record.scale, 1.0);
    }

    #[test]
    fn viewport_record_clamp_rejects_out_of_range_scale() {
        let record = ViewportRecord {
            offset: [40.0, -20.0],
            scale: 11.0,
        }
        .sanitized();

        assert_eq!(record.offset, [40.0, -20.0]);
        assert_relative_eq!(record.scale, 1.0);

        let record = ViewportRecord {
            offset: [0.0, 0.0],
            scale: -0.5,
        }
        .sanitized();
        assert_relative_eq!(record.scale, 1.0);
    }

    #[test]
    fn scale_factor_hysteresis() {
        let mut camera = Camera::default();
        assert!(!camera.update_scale_factor(1.05));
        assert_relative_eq!(camera.scale_factor(), 1.0);
        assert!(camera.update_scale_factor(2.0));
        assert_relative_eq!(camera.scale_factor(), 2.0);
    }
}
