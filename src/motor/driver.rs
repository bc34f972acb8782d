// Four-wheel driver on a Feetech bus
//
// Speaks wheel angular velocity (rad/s) and continuous wheel angle (rad) to the
// controller, raw steps to the motors.

use std::f64::consts::TAU;

use tracing::{debug, info, warn};

use super::WheelHardware;
use super::feetech::{FeetechBus, FeetechError, OperatingMode, Register, STEPS_PER_REVOLUTION};
use crate::config::FeedbackMode;
use crate::drive::controller::{InterfaceDescriptor, InterfaceKind};
use crate::drive::kinematics::WheelVelocitySet;
use crate::drive::odometry::WheelFeedback;

/// Maximum raw velocity command (safety limit)
const MAX_RAW: f64 = 3000.0;

const STEPS_PER_RAD: f64 = STEPS_PER_REVOLUTION / TAU;

/// Scale all wheels together so none exceeds MAX_RAW, keeping the direction of travel
fn to_raw(wheels: &WheelVelocitySet) -> [i16; 4] {
    let steps = wheels.as_array().map(|w| w * STEPS_PER_RAD);
    let peak = steps.iter().fold(0.0f64, |m, s| m.max(s.abs()));
    let scale = if peak > MAX_RAW { MAX_RAW / peak } else { 1.0 };
    steps.map(|s| (s * scale).round() as i16)
}

/// Turns a wrapping 12-bit encoder into a continuous angle
#[derive(Debug, Clone, Copy, Default)]
struct Unwrapper {
    last: Option<u16>,
    steps: i64,
}

impl Unwrapper {
    fn update(&mut self, raw: u16) -> f64 {
        if let Some(last) = self.last {
            let half = (STEPS_PER_REVOLUTION / 2.0) as i64;
            let mut delta = raw as i64 - last as i64;
            if delta > half {
                delta -= STEPS_PER_REVOLUTION as i64;
            } else if delta < -half {
                delta += STEPS_PER_REVOLUTION as i64;
            }
            self.steps += delta;
        }
        self.last = Some(raw);
        self.steps as f64 / STEPS_PER_RAD
    }
}

/// Mecanum base on four Feetech servos in velocity mode
pub struct MotorDriver {
    bus: FeetechBus,
    motor_ids: [u8; 4], // [front_left, front_right, rear_left, rear_right]
    wheel_names: Vec<String>,
    encoders: [Unwrapper; 4],
}

impl MotorDriver {
    /// Connect to the bus; `wheel_names` label the motors in the same order as `motor_ids`
    pub fn new(port: &str, motor_ids: [u8; 4], wheel_names: &[String]) -> Result<Self, FeetechError> {
        info!("Opening motor bus on {}", port);
        Ok(Self {
            bus: FeetechBus::open(port)?,
            motor_ids,
            wheel_names: wheel_names.to_vec(),
            encoders: [Unwrapper::default(); 4],
        })
    }

    /// Ping every motor, then put them in velocity mode with torque on
    pub fn initialize(&mut self) -> Result<(), FeetechError> {
        info!("Initializing motors {:?} for velocity control", self.motor_ids);
        for &id in &self.motor_ids {
            if !self.bus.ping(id)? {
                warn!("Motor {} not responding to ping", id);
                return Err(FeetechError::Timeout { id });
            }
            debug!("Motor {} responding", id);
        }
        for &id in &self.motor_ids {
            self.bus.set_torque(id, false)?;
            self.bus.set_operating_mode(id, OperatingMode::Velocity)?;
            self.bus.set_torque(id, true)?;
        }
        info!("Motors initialized successfully");
        Ok(())
    }

    fn descriptors(&self, kinds: &[InterfaceKind]) -> Vec<InterfaceDescriptor> {
        kinds
            .iter()
            .flat_map(|&kind| {
                self.wheel_names
                    .iter()
                    .map(move |w| InterfaceDescriptor::new(w.as_str(), kind))
            })
            .collect()
    }
}

impl WheelHardware for MotorDriver {
    type Error = FeetechError;

    fn command_interfaces(&self) -> Vec<InterfaceDescriptor> {
        self.descriptors(&[InterfaceKind::Velocity])
    }

    fn state_interfaces(&self) -> Vec<InterfaceDescriptor> {
        self.descriptors(&[InterfaceKind::Position, InterfaceKind::Velocity])
    }

    fn read_feedback(&mut self, mode: FeedbackMode) -> Result<WheelFeedback, FeetechError> {
        let mut out = [0.0; 4];
        for (i, &id) in self.motor_ids.iter().enumerate() {
            out[i] = match mode {
                FeedbackMode::Position => self.encoders[i].update(self.bus.get_position(id)?),
                FeedbackMode::Velocity => self.bus.get_velocity(id)? as f64 / STEPS_PER_RAD,
            };
        }
        Ok(out)
    }

    fn write_velocities(&mut self, wheels: &WheelVelocitySet) -> Result<(), FeetechError> {
        let raw = to_raw(wheels);
        debug!("Setting wheel velocities: {:?}", raw);
        let data: [(u8, i16); 4] = std::array::from_fn(|i| (self.motor_ids[i], raw[i]));
        self.bus.sync_write_i16(Register::GoalVelocity, &data)
    }
}

impl Drop for MotorDriver {
    fn drop(&mut self) {
        // Try to stop motors when driver is dropped (safety measure)
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_raw_one_revolution() {
        let raw = to_raw(&WheelVelocitySet::new(TAU * 0.5, -TAU * 0.5, 0.0, 0.1));
        assert_eq!(raw[0], 2048);
        assert_eq!(raw[1], -2048);
        assert_eq!(raw[2], 0);
        assert_eq!(raw[3], 65);
    }

    #[test]
    fn test_to_raw_scales_together() {
        // 2 rev/s and 1 rev/s: clamped to MAX_RAW keeping the 2:1 ratio
        let raw = to_raw(&WheelVelocitySet::new(2.0 * TAU, TAU, -TAU, 0.0));
        assert_eq!(raw[0], 3000);
        assert_eq!(raw[1], 1500);
        assert_eq!(raw[2], -1500);
    }

    #[test]
    fn test_unwrap_across_zero() {
        let mut enc = Unwrapper::default();
        assert_eq!(enc.update(4000), 0.0);
        // 4000 -> 100 is +196 steps forward, not -3900
        let angle = enc.update(100);
        assert!((angle - 196.0 / STEPS_PER_RAD).abs() < 1e-12);
        let angle = enc.update(4000);
        assert!(angle.abs() < 1e-12);
    }
}
