// Imports
use serde::{Deserialize, Serialize};

/// Parameters for the damped spring integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename = "spring_params")]
pub struct SpringParams {
    /// The spring stiffness.
    #[serde(rename = "stiffness")]
    pub stiffness: f64,
    /// The damping coefficient.
    #[serde(rename = "damping")]
    pub damping: f64,
    /// The fixed integration time step in seconds.
    #[serde(rename = "dt")]
    pub dt: f64,
}

impl Default for SpringParams {
    fn default() -> Self {
        Self {
            stiffness: 120.0,
            damping: 12.0,
            dt: 1.0 / 60.0,
        }
    }
}

impl SpringParams {
    /// New spring parameters.
    pub const fn new(stiffness: f64, damping: f64, dt: f64) -> Self {
        Self {
            stiffness,
            damping,
            dt,
        }
    }
}

/// A 2D damped spring driving a position toward a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring2d {
    /// The current position.
    pub pos: na::Vector2<f64>,
    /// The current velocity.
    pub vel: na::Vector2<f64>,
    /// The target position.
    pub target: na::Vector2<f64>,
}

impl Spring2d {
    /// The tolerance below which position error and velocity count as settled.
    pub const SETTLE_TOLERANCE: f64 = 0.05;

    /// A new spring at rest at `pos`, aiming for `target`.
    pub fn new(pos: na::Vector2<f64>, target: na::Vector2<f64>) -> Self {
        Self {
            pos,
            vel: na::Vector2::zeros(),
            target,
        }
    }

    /// Advance the spring by one fixed time step.
    ///
    /// Returns true when the spring has settled after this step.
    pub fn step(&mut self, params: SpringParams) -> bool {
        let accel = (self.target - self.pos) * params.stiffness - self.vel * params.damping;
        self.vel += accel * params.dt;
        self.pos += self.vel * params.dt;
        self.settled()
    }

    /// Whether position error and velocity are both below the settle tolerance.
    pub fn settled(&self) -> bool {
        (self.target - self.pos).magnitude() < Self::SETTLE_TOLERANCE
            && self.vel.magnitude() < Self::SETTLE_TOLERANCE
    }

    /// Aim for a new target, keeping the current position and velocity.
    pub fn retarget(&mut self, target: na::Vector2<f64>) {
        self.target = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn converges_to_target() {
        let params = SpringParams::new(120.0, 12.0, 1.0 / 60.0);
        let mut spring = Spring2d::new(na::vector![0.0, 0.0], na::vector![100.0, -40.0]);

        let mut steps = 0;
        while !spring.step(params) {
            steps += 1;
            assert!(steps < 10_000, "spring did not settle");
        }

        assert_relative_eq!(spring.pos[0], 100.0, epsilon = Spring2d::SETTLE_TOLERANCE);
        assert_relative_eq!(spring.pos[1], -40.0, epsilon = Spring2d::SETTLE_TOLERANCE);
    }

    #[test]
    fn settled_at_rest_on_target() {
        let spring = Spring2d::new(na::vector![3.0, 4.0], na::vector![3.0, 4.0]);
        assert!(spring.settled());
    }

    #[test]
    fn retarget_keeps_momentum() {
        let params = SpringParams::new(180.0, 13.0, 1.0 / 40.0);
        let mut spring = Spring2d::new(na::vector![0.0, 0.0], na::vector![50.0, 0.0]);
        spring.step(params);
        let vel = spring.vel;
        spring.retarget(na::vector![-50.0, 0.0]);
        assert_eq!(spring.vel, vel);
        assert!(!spring.settled());
    }
}
