//! Wheel odometry for the mecanum base.
//!
//! Integrates wheel feedback into a planar pose with first-order Euler steps.
//! Heading is advanced first, then the body velocity is rotated into the odom
//! frame with the new heading.
//!
//! # Coordinate Frame
//!
//! - X forward, Y left
//! - Heading counter-clockwise positive, not wrapped

use std::time::Instant;

use crate::config::FeedbackMode;

use super::kinematics::{BodyVelocity, WheelGeometry, WheelVelocitySet, body_velocity};

/// Pose and body-frame velocity estimate
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OdometryState {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
    pub last_update_time: Option<Instant>,
}

/// One feedback sample: wheel positions (rad) or wheel velocities (rad/s),
/// depending on the [`FeedbackMode`], in [front_left, front_right, rear_left, rear_right] order
pub type WheelFeedback = [f64; 4];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Uninitialized,
    Tracking {
        // Wheel positions at the last sample (only meaningful in position mode)
        last_positions: WheelFeedback,
    },
}

/// Accumulates wheel feedback into an [`OdometryState`]
#[derive(Debug, Clone)]
pub struct OdometryEstimator {
    geometry: WheelGeometry,
    mode: FeedbackMode,
    phase: Phase,
    state: OdometryState,
}

impl OdometryEstimator {
    pub fn new(geometry: WheelGeometry, mode: FeedbackMode) -> Self {
        Self {
            geometry,
            mode,
            phase: Phase::Uninitialized,
            state: OdometryState::default(),
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.phase, Phase::Tracking { .. })
    }

    pub fn state(&self) -> &OdometryState {
        &self.state
    }

    /// Back to Uninitialized with a zero pose
    pub fn reset(&mut self) {
        self.phase = Phase::Uninitialized;
        self.state = OdometryState::default();
    }

    /// Back to Uninitialized keeping the pose, so the next sample does not
    /// integrate across the time the controller was inactive
    pub fn restart(&mut self) {
        self.phase = Phase::Uninitialized;
    }

    /// Fold in one feedback sample taken at `now`.
    ///
    /// The first sample after a reset only records the time (and wheel
    /// positions). Samples not newer than the last one leave the state alone.
    pub fn update(&mut self, feedback: WheelFeedback, now: Instant) -> OdometryState {
        let last_positions = match (self.phase, self.state.last_update_time) {
            (Phase::Tracking { last_positions }, Some(last)) if now > last => last_positions,
            (Phase::Tracking { .. }, _) => return self.state,
            (Phase::Uninitialized, _) => {
                self.phase = Phase::Tracking {
                    last_positions: feedback,
                };
                self.state.last_update_time = Some(now);
                return self.state;
            }
        };

        let last = self.state.last_update_time.unwrap_or(now);
        let dt = now.duration_since(last).as_secs_f64();

        let wheels = match self.mode {
            FeedbackMode::Velocity => feedback,
            FeedbackMode::Position => {
                std::array::from_fn(|i| (feedback[i] - last_positions[i]) / dt)
            }
        };
        let body = body_velocity(&WheelVelocitySet::from_array(wheels), &self.geometry);
        self.integrate(body, dt);

        self.phase = Phase::Tracking {
            last_positions: feedback,
        };
        self.state.last_update_time = Some(now);
        self.state
    }

    fn integrate(&mut self, body: BodyVelocity, dt: f64) {
        let s = &mut self.state;
        s.heading += body.angular_z * dt;
        let (sin, cos) = s.heading.sin_cos();
        s.x += (body.linear_x * cos - body.linear_y * sin) * dt;
        s.y += (body.linear_x * sin + body.linear_y * cos) * dt;

        s.linear_x = body.linear_x;
        s.linear_y = body.linear_y;
        s.angular_z = body.angular_z;
    }
}
