// Simulated mecanum base: ideal wheels that track their setpoints exactly

use std::convert::Infallible;
use std::time::Instant;

use super::WheelHardware;
use crate::config::FeedbackMode;
use crate::drive::controller::{InterfaceDescriptor, InterfaceKind};
use crate::drive::kinematics::WheelVelocitySet;
use crate::drive::odometry::WheelFeedback;

#[derive(Debug, Clone)]
pub struct SimulatedBase {
    wheel_names: Vec<String>,
    velocities: [f64; 4],
    positions: [f64; 4],
    // Advance with wall time on each read; otherwise only `advance` moves the wheels
    wall_clock: Option<Instant>,
}

impl SimulatedBase {
    /// Wheels move with wall time between feedback reads
    pub fn realtime(wheel_names: &[String]) -> Self {
        Self {
            wall_clock: Some(Instant::now()),
            ..Self::manual(wheel_names)
        }
    }

    /// Wheels move only when [`SimulatedBase::advance`] is called
    pub fn manual(wheel_names: &[String]) -> Self {
        Self {
            wheel_names: wheel_names.to_vec(),
            velocities: [0.0; 4],
            positions: [0.0; 4],
            wall_clock: None,
        }
    }

    pub fn advance(&mut self, dt: f64) {
        for (p, v) in self.positions.iter_mut().zip(self.velocities) {
            *p += v * dt;
        }
    }

    pub fn velocities(&self) -> WheelVelocitySet {
        WheelVelocitySet::from_array(self.velocities)
    }
}

impl WheelHardware for SimulatedBase {
    type Error = Infallible;

    fn command_interfaces(&self) -> Vec<InterfaceDescriptor> {
        self.wheel_names
            .iter()
            .map(|w| InterfaceDescriptor::new(w.as_str(), InterfaceKind::Velocity))
            .collect()
    }

    fn state_interfaces(&self) -> Vec<InterfaceDescriptor> {
        [InterfaceKind::Position, InterfaceKind::Velocity]
            .into_iter()
            .flat_map(|kind| {
                self.wheel_names
                    .iter()
                    .map(move |w| InterfaceDescriptor::new(w.as_str(), kind))
            })
            .collect()
    }

    fn read_feedback(&mut self, mode: FeedbackMode) -> Result<WheelFeedback, Infallible> {
        if let Some(last) = self.wall_clock {
            let now = Instant::now();
            self.advance(now.duration_since(last).as_secs_f64());
            self.wall_clock = Some(now);
        }
        Ok(match mode {
            FeedbackMode::Position => self.positions,
            FeedbackMode::Velocity => self.velocities,
        })
    }

    fn write_velocities(&mut self, wheels: &WheelVelocitySet) -> Result<(), Infallible> {
        self.velocities = wheels.as_array();
        Ok(())
    }
}
