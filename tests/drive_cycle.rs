// Closed-loop runs of the drive controller against the simulated base

use std::time::{Duration, Instant};

use mecanum_zenoh_runtime::config::{DriveConfig, FeedbackMode};
use mecanum_zenoh_runtime::drive::controller::ActivationError;
use mecanum_zenoh_runtime::drive::limiter::AxisId;
use mecanum_zenoh_runtime::drive::mailbox::{self, CommandSender};
use mecanum_zenoh_runtime::drive::{AxisLimits, Lifecycle, MecanumDriveController};
use mecanum_zenoh_runtime::messages::{RuntimeHealth, TwistCommand};
use mecanum_zenoh_runtime::motor::{self, SimulatedBase, WheelHardware};

const DT: f64 = 0.02;

fn ramp_config(feedback_mode: FeedbackMode) -> DriveConfig {
    DriveConfig {
        linear_x: AxisLimits {
            max_acceleration: Some(1.0),
            max_deceleration: Some(-1.0),
            ..Default::default()
        },
        feedback_mode,
        ..Default::default()
    }
}

/// Configure, claim the simulated wheels and activate
fn bring_up(config: DriveConfig) -> (MecanumDriveController, CommandSender, SimulatedBase) {
    let (tx, rx) = mailbox::channel();
    let base = SimulatedBase::manual(&config.wheel_names);
    let mut controller = MecanumDriveController::new(rx);
    controller.configure(config).unwrap();

    let (commands, states) = controller.required_interfaces().unwrap();
    controller.assign_interfaces(
        motor::claim(&base.command_interfaces(), &commands),
        motor::claim(&base.state_interfaces(), &states),
    );
    controller.activate().unwrap();
    (controller, tx, base)
}

struct Rig {
    controller: MecanumDriveController,
    tx: CommandSender,
    base: SimulatedBase,
    mode: FeedbackMode,
    start: Instant,
    tick: u32,
}

impl Rig {
    fn new(config: DriveConfig) -> Self {
        let mode = config.feedback_mode;
        let (controller, tx, base) = bring_up(config);
        Self {
            controller,
            tx,
            base,
            mode,
            start: Instant::now(),
            tick: 0,
        }
    }

    fn now(&self) -> Instant {
        self.start + Duration::from_millis(20) * self.tick
    }

    /// One loop iteration: optional command, feedback, update, actuate, advance
    fn step(&mut self, cmd: Option<TwistCommand>) -> RuntimeHealth {
        self.tick += 1;
        let now = self.now();
        if let Some(cmd) = cmd {
            assert!(self.tx.publish(cmd.stamped(now)));
        }
        let feedback = self.base.read_feedback(self.mode).unwrap();
        let out = self.controller.update(now, DT, Some(feedback));
        if let Some(wheels) = out.wheels {
            self.base.write_velocities(&wheels).unwrap();
        }
        self.base.advance(DT);
        out.health
    }
}

fn forward(v: f64) -> TwistCommand {
    TwistCommand {
        linear_x: v,
        ..Default::default()
    }
}

#[test]
fn test_ramp_cruise_then_watchdog_stop() {
    let mut rig = Rig::new(ramp_config(FeedbackMode::Position));

    // 3s of fresh 0.5 m/s commands; the limiter ramps at 1 m/s^2
    for _ in 0..150 {
        assert_eq!(rig.step(Some(forward(0.5))), RuntimeHealth::Ok);
    }
    let x_rate = rig.controller.cycle().unwrap().limiter().previous(AxisId::LinearX);
    assert!((x_rate - 0.5).abs() < 1e-12);

    // Odometry lags the actuation by one cycle: 25 ramp cycles plus 124 at cruise
    let state = *rig.controller.cycle().unwrap().odometry().state();
    let expected = 0.0004 * (25.0 * 26.0 / 2.0) + 124.0 * 0.5 * DT;
    assert!((state.x - expected).abs() < 1e-6, "x = {}", state.x);
    assert!(state.y.abs() < 1e-12);
    assert!(state.heading.abs() < 1e-12);
    assert!((state.linear_x - 0.5).abs() < 1e-9);

    // Commands stop: fresh for the 500ms timeout, then a limited decay to rest
    let mut healths = Vec::new();
    for _ in 0..60 {
        healths.push(rig.step(None));
    }
    assert!(healths[..25].iter().all(|h| *h == RuntimeHealth::Ok));
    assert!(healths[25..].iter().all(|h| *h == RuntimeHealth::CmdStale));
    assert!(rig.base.velocities().as_array().iter().all(|w| w.abs() < 1e-9));
}

#[test]
fn test_strafe_with_velocity_feedback() {
    let mut rig = Rig::new(DriveConfig {
        feedback_mode: FeedbackMode::Velocity,
        ..Default::default()
    });

    let cmd = TwistCommand {
        linear_y: 0.2,
        ..Default::default()
    };
    for _ in 0..50 {
        rig.step(Some(cmd));
    }

    // Strafing left: front-left and rear-right spin backwards
    let wheels = rig.base.velocities();
    assert!(wheels.front_left < 0.0 && wheels.rear_right < 0.0);
    assert!(wheels.front_right > 0.0 && wheels.rear_left > 0.0);

    let state = *rig.controller.cycle().unwrap().odometry().state();
    assert!((state.linear_y - 0.2).abs() < 1e-9);
    assert!(state.linear_x.abs() < 1e-9);
    assert!(state.y > 0.18 && state.y < 0.2, "y = {}", state.y);
}

#[test]
fn test_deactivate_writes_one_zero_then_goes_quiet() {
    let mut rig = Rig::new(ramp_config(FeedbackMode::Position));
    for _ in 0..20 {
        rig.step(Some(forward(0.3)));
    }
    assert!(!rig.base.velocities().is_zero());

    rig.controller.deactivate().unwrap();
    assert_eq!(rig.controller.lifecycle(), Lifecycle::Inactive);

    let now = rig.now();
    let out = rig.controller.update(now, DT, None);
    assert!(out.wheels.unwrap().is_zero());
    assert_eq!(out.health, RuntimeHealth::Inactive);
    rig.base.write_velocities(&out.wheels.unwrap()).unwrap();

    let out = rig.controller.update(now + Duration::from_millis(20), DT, None);
    assert!(out.wheels.is_none());
    assert!(rig.base.velocities().is_zero());
}

#[test]
fn test_reactivation_keeps_pose() {
    let mut rig = Rig::new(ramp_config(FeedbackMode::Position));
    for _ in 0..50 {
        rig.step(Some(forward(0.5)));
    }
    let before = rig.controller.cycle().unwrap().odometry().state().x;
    assert!(before > 0.0);

    rig.controller.deactivate().unwrap();
    rig.controller.activate().unwrap();
    for _ in 0..5 {
        rig.step(None);
    }
    let after = rig.controller.cycle().unwrap().odometry().state().x;
    assert!((after - before).abs() < 1e-9);
}

#[test]
fn test_missing_wheel_blocks_activation() {
    let (_tx, rx) = mailbox::channel();
    let config = DriveConfig::default();
    let base = SimulatedBase::manual(&config.wheel_names[..3]);
    let mut controller = MecanumDriveController::new(rx);
    controller.configure(config).unwrap();

    let (commands, states) = controller.required_interfaces().unwrap();
    controller.assign_interfaces(
        motor::claim(&base.command_interfaces(), &commands),
        motor::claim(&base.state_interfaces(), &states),
    );
    assert!(matches!(
        controller.activate(),
        Err(ActivationError::Count { role: "command", got: 3 })
    ));
    assert_eq!(controller.lifecycle(), Lifecycle::Inactive);
}
