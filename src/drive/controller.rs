// Mecanum drive controller: lifecycle plus the periodic control cycle
//
// Command path:  mailbox -> staleness check -> speed limiter -> inverse kinematics -> wheel setpoints
// Feedback path: wheel feedback -> forward kinematics -> odometry
//
// Lifecycle (Unconfigured/Inactive/Active/Finalized) belongs to the controller and is
// separate from the odometry estimator's own Uninitialized/Tracking phase.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{ConfigError, DriveConfig, FeedbackMode};
use crate::messages::RuntimeHealth;

use super::frames;
use super::kinematics::{BodyVelocity, WheelGeometry, WheelVelocitySet, wheel_velocities};
use super::limiter::{AxisId, SpeedLimiter};
use super::mailbox::{CommandReceiver, VelocityCommand};
use super::odometry::{OdometryEstimator, OdometryState, WheelFeedback};

/// Host lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unconfigured,
    Inactive,
    Active,
    Finalized,
}

/// What a hardware interface carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Position,
    Velocity,
}

impl From<FeedbackMode> for InterfaceKind {
    fn from(mode: FeedbackMode) -> Self {
        match mode {
            FeedbackMode::Position => InterfaceKind::Position,
            FeedbackMode::Velocity => InterfaceKind::Velocity,
        }
    }
}

/// A named wheel interface offered by the hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub wheel: String,
    pub kind: InterfaceKind,
}

impl InterfaceDescriptor {
    pub fn new(wheel: impl Into<String>, kind: InterfaceKind) -> Self {
        Self {
            wheel: wheel.into(),
            kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("Controller must be inactive to activate, currently {0:?}")]
    WrongState(Lifecycle),

    #[error("No wheel interfaces assigned")]
    Unassigned,

    #[error("Expected 4 {role} interfaces, got {got}")]
    Count { role: &'static str, got: usize },

    #[error("{role} interface {index} is {got:?}, expected {expected:?}")]
    Mismatch {
        role: &'static str,
        index: usize,
        got: InterfaceDescriptor,
        expected: InterfaceDescriptor,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Cannot {transition} from {state:?}")]
    InvalidTransition {
        transition: &'static str,
        state: Lifecycle,
    },

    #[error("Configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutput {
    /// Setpoints to write this cycle; `None` once command processing has halted
    pub wheels: Option<WheelVelocitySet>,
    /// Fresh estimate when feedback was processed
    pub odometry: Option<OdometryState>,
    pub health: RuntimeHealth,
}

/// Per-configuration state driven once per tick
#[derive(Debug)]
pub struct ControlCycle {
    geometry: WheelGeometry,
    limiter: SpeedLimiter,
    odometry: OdometryEstimator,
    cmd_timeout: Duration,
    halt_on_timeout: bool,
    latest_cmd: Option<VelocityCommand>,
    health: RuntimeHealth,
}

impl ControlCycle {
    pub fn new(config: &DriveConfig) -> Self {
        let geometry = WheelGeometry::new(
            config.wheel_separation_x,
            config.wheel_separation_y,
            config.wheel_radius,
        );
        Self {
            geometry,
            limiter: SpeedLimiter::new(config.linear_x, config.linear_y, config.angular_z),
            odometry: OdometryEstimator::new(geometry, config.feedback_mode),
            cmd_timeout: config.cmd_timeout(),
            halt_on_timeout: config.halt_on_timeout,
            latest_cmd: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn limiter(&self) -> &SpeedLimiter {
        &self.limiter
    }

    pub fn odometry(&self) -> &OdometryEstimator {
        &self.odometry
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Drain the mailbox and produce limited wheel setpoints
    pub fn command_step(
        &mut self,
        commands: &mut CommandReceiver,
        now: Instant,
        dt: f64,
    ) -> WheelVelocitySet {
        if let Some(cmd) = commands.take() {
            self.latest_cmd = Some(cmd);
        }

        let target = match self.latest_cmd {
            Some(cmd) if cmd.age(now) <= self.cmd_timeout => {
                if self.health != RuntimeHealth::Ok {
                    debug!("Receiving fresh commands");
                }
                self.health = RuntimeHealth::Ok;
                cmd
            }
            stale => {
                // Watchdog triggered - bring the base to rest
                if self.health == RuntimeHealth::Ok {
                    if let Some(cmd) = stale {
                        warn!("Command stale ({:?} old), stopping base", cmd.age(now));
                    }
                }
                self.health = RuntimeHealth::CmdStale;
                if self.halt_on_timeout {
                    self.limiter.reset();
                    return WheelVelocitySet::zero();
                }
                VelocityCommand::zero(now)
            }
        };

        let body = BodyVelocity::new(
            self.limiter.limit(AxisId::LinearX, target.linear_x, dt),
            self.limiter.limit(AxisId::LinearY, target.linear_y, dt),
            self.limiter.limit(AxisId::AngularZ, target.angular_z, dt),
        );
        wheel_velocities(body, &self.geometry)
    }

    pub fn feedback_step(&mut self, feedback: WheelFeedback, now: Instant) -> OdometryState {
        self.odometry.update(feedback, now)
    }

    fn reset_command_path(&mut self) {
        self.limiter.reset();
        self.latest_cmd = None;
        self.health = RuntimeHealth::CmdStale;
    }
}

struct Bindings {
    commands: Vec<InterfaceDescriptor>,
    states: Vec<InterfaceDescriptor>,
}

/// Lifecycle-managed mecanum drive controller
pub struct MecanumDriveController {
    lifecycle: Lifecycle,
    commands: CommandReceiver,
    config: Option<DriveConfig>,
    cycle: Option<ControlCycle>,
    bindings: Option<Bindings>,
    // Pose is zeroed only on the first activation after configure
    fresh: bool,
    terminal_zero: bool,
    odom_frame_id: String,
    base_frame_id: String,
}

impl MecanumDriveController {
    pub fn new(commands: CommandReceiver) -> Self {
        Self {
            lifecycle: Lifecycle::Unconfigured,
            commands,
            config: None,
            cycle: None,
            bindings: None,
            fresh: false,
            terminal_zero: false,
            odom_frame_id: String::new(),
            base_frame_id: String::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn config(&self) -> Option<&DriveConfig> {
        self.config.as_ref()
    }

    pub fn cycle(&self) -> Option<&ControlCycle> {
        self.cycle.as_ref()
    }

    pub fn odom_frame_id(&self) -> &str {
        &self.odom_frame_id
    }

    pub fn base_frame_id(&self) -> &str {
        &self.base_frame_id
    }

    /// Interfaces the controller will ask for once configured: (commands, states)
    pub fn required_interfaces(&self) -> Option<(Vec<InterfaceDescriptor>, Vec<InterfaceDescriptor>)> {
        let config = self.config.as_ref()?;
        let state_kind = InterfaceKind::from(config.feedback_mode);
        let commands = config
            .wheel_names
            .iter()
            .map(|w| InterfaceDescriptor::new(w.as_str(), InterfaceKind::Velocity))
            .collect();
        let states = config
            .wheel_names
            .iter()
            .map(|w| InterfaceDescriptor::new(w.as_str(), state_kind))
            .collect();
        Some((commands, states))
    }

    pub fn configure(&mut self, config: DriveConfig) -> Result<(), LifecycleError> {
        if !matches!(self.lifecycle, Lifecycle::Unconfigured | Lifecycle::Inactive) {
            return Err(LifecycleError::InvalidTransition {
                transition: "configure",
                state: self.lifecycle,
            });
        }
        config.validate()?;

        self.odom_frame_id = frames::compose(
            config.tf_frame_prefix_enable,
            &config.tf_frame_prefix,
            &config.namespace,
            &config.odom_frame_id,
        );
        self.base_frame_id = frames::compose(
            config.tf_frame_prefix_enable,
            &config.tf_frame_prefix,
            &config.namespace,
            &config.base_frame_id,
        );
        self.cycle = Some(ControlCycle::new(&config));
        info!(
            "Configured: radius={} separation=({}, {}) feedback={:?}",
            config.wheel_radius,
            config.wheel_separation_x,
            config.wheel_separation_y,
            config.feedback_mode
        );
        self.config = Some(config);
        self.fresh = true;
        self.lifecycle = Lifecycle::Inactive;
        Ok(())
    }

    /// Bind hardware interfaces; checked on activation
    pub fn assign_interfaces(
        &mut self,
        commands: Vec<InterfaceDescriptor>,
        states: Vec<InterfaceDescriptor>,
    ) {
        self.bindings = Some(Bindings { commands, states });
    }

    pub fn activate(&mut self) -> Result<(), ActivationError> {
        if self.lifecycle != Lifecycle::Inactive {
            return Err(ActivationError::WrongState(self.lifecycle));
        }
        let bindings = self.bindings.as_ref().ok_or(ActivationError::Unassigned)?;
        let (want_commands, want_states) = self
            .required_interfaces()
            .ok_or(ActivationError::WrongState(self.lifecycle))?;
        check_bindings("command", &bindings.commands, &want_commands)?;
        check_bindings("state", &bindings.states, &want_states)?;

        let Some(cycle) = self.cycle.as_mut() else {
            return Err(ActivationError::WrongState(self.lifecycle));
        };
        cycle.reset_command_path();
        if self.fresh {
            cycle.odometry.reset();
            self.fresh = false;
        } else {
            cycle.odometry.restart();
        }
        self.commands.clear();
        self.terminal_zero = false;
        self.lifecycle = Lifecycle::Active;
        info!("Activated");
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<(), LifecycleError> {
        if self.lifecycle != Lifecycle::Active {
            return Err(LifecycleError::InvalidTransition {
                transition: "deactivate",
                state: self.lifecycle,
            });
        }
        if let Some(cycle) = self.cycle.as_mut() {
            cycle.reset_command_path();
        }
        self.terminal_zero = true;
        self.lifecycle = Lifecycle::Inactive;
        info!("Deactivated, halting wheels");
        Ok(())
    }

    pub fn cleanup(&mut self) -> Result<(), LifecycleError> {
        if self.lifecycle != Lifecycle::Inactive {
            return Err(LifecycleError::InvalidTransition {
                transition: "cleanup",
                state: self.lifecycle,
            });
        }
        self.cycle = None;
        self.config = None;
        self.bindings = None;
        self.lifecycle = Lifecycle::Unconfigured;
        info!("Cleaned up");
        Ok(())
    }

    /// Final transition; an active controller gets its terminal zero cycle first
    pub fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::Active {
            self.terminal_zero = true;
        }
        self.lifecycle = Lifecycle::Finalized;
    }

    /// Run one control cycle. Never fails and never blocks.
    pub fn update(
        &mut self,
        now: Instant,
        dt: f64,
        feedback: Option<WheelFeedback>,
    ) -> CycleOutput {
        match (self.lifecycle, self.cycle.as_mut()) {
            (Lifecycle::Active, Some(cycle)) => {
                let wheels = cycle.command_step(&mut self.commands, now, dt);
                let odometry = feedback.map(|f| cycle.feedback_step(f, now));
                CycleOutput {
                    wheels: Some(wheels),
                    odometry,
                    health: cycle.health(),
                }
            }
            _ => {
                let wheels = std::mem::take(&mut self.terminal_zero).then(WheelVelocitySet::zero);
                CycleOutput {
                    wheels,
                    odometry: None,
                    health: RuntimeHealth::Inactive,
                }
            }
        }
    }
}

fn check_bindings(
    role: &'static str,
    got: &[InterfaceDescriptor],
    expected: &[InterfaceDescriptor],
) -> Result<(), ActivationError> {
    if got.len() != expected.len() {
        return Err(ActivationError::Count {
            role,
            got: got.len(),
        });
    }
    for (index, (g, e)) in got.iter().zip(expected).enumerate() {
        if g != e {
            return Err(ActivationError::Mismatch {
                role,
                index,
                got: g.clone(),
                expected: e.clone(),
            });
        }
    }
    Ok(())
}
