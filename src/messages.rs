// Define message types for the runtime

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::drive::kinematics::WheelVelocitySet;
use crate::drive::mailbox::VelocityCommand;
use crate::drive::odometry::OdometryState;

// Command from teleop/scripts -> runtime
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TwistCommand {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

impl TwistCommand {
    /// Stamp the command with its arrival time
    pub fn stamped(&self, received_at: Instant) -> VelocityCommand {
        VelocityCommand::new(self.linear_x, self.linear_y, self.angular_z, received_at)
    }
}

// Wheel setpoints runtime -> observers, rad/s
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WheelActuation {
    pub front_left: f64,
    pub front_right: f64,
    pub rear_left: f64,
    pub rear_right: f64,
}

impl From<&WheelVelocitySet> for WheelActuation {
    fn from(w: &WheelVelocitySet) -> Self {
        Self {
            front_left: w.front_left,
            front_right: w.front_right,
            rear_left: w.rear_left,
            rear_right: w.rear_right,
        }
    }
}

/// Odometry published once per feedback cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdometryMsg {
    /// Milliseconds since runtime start at the sample time
    pub stamp_ms: f64,
    pub frame_id: String,
    pub child_frame_id: String,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

impl OdometryMsg {
    pub fn from_state(
        state: &OdometryState,
        epoch: Instant,
        frame_id: &str,
        child_frame_id: &str,
    ) -> Self {
        let stamp_ms = state
            .last_update_time
            .map(|t| t.saturating_duration_since(epoch).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        Self {
            stamp_ms,
            frame_id: frame_id.to_string(),
            child_frame_id: child_frame_id.to_string(),
            x: state.x,
            y: state.y,
            heading: state.heading,
            linear_x: state.linear_x,
            linear_y: state.linear_y,
            angular_z: state.angular_z,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Inactive,
}
