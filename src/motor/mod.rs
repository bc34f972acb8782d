// Wheel hardware for the mecanum base
//
// Provides:
// - The WheelHardware trait the runtime drives each cycle
// - Feetech STS3215 serial protocol implementation
// - A four-wheel Feetech driver and a simulated base

mod driver;
pub mod feetech;
mod sim;

pub use driver::MotorDriver;
pub use feetech::{FeetechBus, FeetechError};
pub use sim::SimulatedBase;

use crate::config::FeedbackMode;
use crate::drive::controller::InterfaceDescriptor;
use crate::drive::kinematics::WheelVelocitySet;
use crate::drive::odometry::WheelFeedback;

/// Four wheel command sinks and their state sources
pub trait WheelHardware {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Velocity command interfaces offered, one per wheel
    fn command_interfaces(&self) -> Vec<InterfaceDescriptor>;

    /// Every state interface offered (position and/or velocity per wheel)
    fn state_interfaces(&self) -> Vec<InterfaceDescriptor>;

    /// Wheel angles (rad) or angular velocities (rad/s), in wheel order
    fn read_feedback(&mut self, mode: FeedbackMode) -> Result<WheelFeedback, Self::Error>;

    /// Send wheel angular velocity setpoints (rad/s)
    fn write_velocities(&mut self, wheels: &WheelVelocitySet) -> Result<(), Self::Error>;

    /// Stop all wheels immediately
    fn stop(&mut self) -> Result<(), Self::Error> {
        self.write_velocities(&WheelVelocitySet::zero())
    }
}

/// Pick the offered interfaces that match `wanted`, in `wanted` order.
/// Anything missing is left out, so activation sees the short count.
pub fn claim(
    offered: &[InterfaceDescriptor],
    wanted: &[InterfaceDescriptor],
) -> Vec<InterfaceDescriptor> {
    wanted
        .iter()
        .filter(|w| offered.contains(w))
        .cloned()
        .collect()
}
