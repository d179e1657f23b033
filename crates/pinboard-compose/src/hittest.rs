// Imports

/// Rotate `point` around `center` by `angle` (radians, counter clockwise).
pub fn rotate_about(
    point: na::Vector2<f64>,
    center: na::Vector2<f64>,
    angle: f64,
) -> na::Vector2<f64> {
    na::Rotation2::new(angle) * (point - center) + center
}

/// Whether `probe` lies inside the rectangle with top-left `origin` and extents `size`,
/// rotated by `rotation` (degrees) about its center.
///
/// The probe is inverse-rotated into the rectangle's local frame, then tested axis-aligned.
pub fn rotated_rect_contains(
    origin: na::Vector2<f64>,
    size: na::Vector2<f64>,
    rotation: f64,
    probe: na::Vector2<f64>,
) -> bool {
    let center = origin + size * 0.5;
    let local = rotate_about(probe, center, -rotation.to_radians());
    local[0] >= origin[0]
        && local[0] <= origin[0] + size[0]
        && local[1] >= origin[1]
        && local[1] <= origin[1] + size[1]
}

/// Whether `probe` lies inside the circle at `center` with `radius`.
pub fn circle_contains(center: na::Vector2<f64>, radius: f64, probe: na::Vector2<f64>) -> bool {
    (probe - center).magnitude_squared() <= radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unrotated_rect() {
        let origin = na::vector![10.0, 10.0];
        let size = na::vector![100.0, 50.0];
        assert!(rotated_rect_contains(origin, size, 0.0, na::vector![60.0, 35.0]));
        assert!(!rotated_rect_contains(origin, size, 0.0, na::vector![60.0, 70.0]));
    }

    #[test]
    fn rotated_rect() {
        // A 100x20 rect rotated by 90 degrees covers a vertical band through its center.
        let origin = na::vector![0.0, 0.0];
        let size = na::vector![100.0, 20.0];
        assert!(rotated_rect_contains(origin, size, 90.0, na::vector![50.0, 55.0]));
        assert!(!rotated_rect_contains(origin, size, 90.0, na::vector![95.0, 10.0]));
    }

    #[test]
    fn rotate_about_quarter_turn() {
        let rotated = rotate_about(
            na::vector![2.0, 1.0],
            na::vector![1.0, 1.0],
            std::f64::consts::FRAC_PI_2,
        );
        assert_relative_eq!(rotated[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[1], 2.0, epsilon = 1e-12);
    }
}
