// Control loop with command intake and watchdog
//
// A spawned intake task decodes commands from zenoh and hands them to the control
// loop through the mailbox. The loop ticks at the configured rate: read wheel
// feedback, run one controller cycle, write wheel setpoints, publish odometry and
// health. Ctrl-C deactivates the controller, writes its terminal zero cycle and exits.

use std::time::Instant;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::{DriveConfig, FeedbackMode, MOTOR_IDS, TOPIC_CMD_BASE, TOPIC_HEALTH, TOPIC_ODOM, TOPIC_RT_WHEELS};
use crate::drive::controller::{CycleOutput, MecanumDriveController};
use crate::drive::mailbox::{self, CommandSender};
use crate::messages::{OdometryMsg, TwistCommand, WheelActuation};
use crate::motor::{self, MotorDriver, SimulatedBase, WheelHardware};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which wheels the runtime drives
#[derive(Debug, Clone)]
pub enum Backend {
    Simulated,
    Feetech { port: String },
}

pub async fn run(config: DriveConfig, backend: Backend) -> Result<(), BoxError> {
    let (sender, receiver) = mailbox::channel();
    let mut controller = MecanumDriveController::new(receiver);
    let wheel_names = config.wheel_names.clone();
    controller.configure(config)?;

    match backend {
        Backend::Simulated => {
            info!("Using simulated base");
            drive(controller, SimulatedBase::realtime(&wheel_names), sender).await
        }
        Backend::Feetech { port } => {
            let mut driver = MotorDriver::new(&port, MOTOR_IDS, &wheel_names)?;
            driver.initialize()?;
            drive(controller, driver, sender).await
        }
    }
}

/// Bind `hardware` to the controller, activate it and run until Ctrl-C
async fn drive<H: WheelHardware>(
    mut controller: MecanumDriveController,
    mut hardware: H,
    mut sender: CommandSender,
) -> Result<(), BoxError> {
    let (want_commands, want_states) = controller
        .required_interfaces()
        .ok_or("controller is not configured")?;
    controller.assign_interfaces(
        motor::claim(&hardware.command_interfaces(), &want_commands),
        motor::claim(&hardware.state_interfaces(), &want_states),
    );
    controller.activate()?;

    let (feedback_mode, period) = match controller.config() {
        Some(config) => (config.feedback_mode, config.period()),
        None => return Err("controller lost its configuration".into()),
    };

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let pub_wheels = session.declare_publisher(TOPIC_RT_WHEELS).await?;
    let pub_odom = session.declare_publisher(TOPIC_ODOM).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let intake = tokio::spawn(async move {
        while let Ok(sample) = subscriber.recv_async().await {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<TwistCommand>(&payload) {
                Ok(cmd) => {
                    debug!("Received command: {:?}", cmd);
                    sender.publish(cmd.stamped(Instant::now()));
                }
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }
    });

    info!(
        "Runtime started: {:.0}Hz loop, {}ms watchdog timeout",
        1.0 / period.as_secs_f64(),
        controller.config().map_or(0, |c| c.cmd_timeout().as_millis())
    );
    info!("Subscribed to: {}", TOPIC_CMD_BASE);
    info!("Publishing to: {}, {}, {}", TOPIC_RT_WHEELS, TOPIC_ODOM, TOPIC_HEALTH);

    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let epoch = Instant::now();
    let mut last = epoch;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        // 1. Feedback, controller cycle, actuation
        let out = hardware_cycle(&mut controller, &mut hardware, feedback_mode, now, dt)?;

        // 2. Publish
        if let Some(wheels) = out.wheels {
            pub_wheels
                .put(serde_json::to_string(&WheelActuation::from(&wheels))?)
                .await?;
        }
        if let Some(state) = out.odometry {
            let msg = OdometryMsg::from_state(
                &state,
                epoch,
                controller.odom_frame_id(),
                controller.base_frame_id(),
            );
            pub_odom.put(serde_json::to_string(&msg)?).await?;
        }
        pub_health.put(serde_json::to_string(&out.health)?).await?;
    }

    intake.abort();
    controller.deactivate()?;
    hardware_cycle(&mut controller, &mut hardware, feedback_mode, Instant::now(), 0.0)?;
    controller.shutdown();
    info!("Base stopped");
    Ok(())
}

/// Read feedback, run one controller cycle and write the wheel setpoints.
///
/// Bus I/O blocks, so the worker thread is handed to the blocking pool for the
/// duration. Needs the multi-threaded runtime. A failed read skips odometry for
/// this cycle; a failed write is returned.
fn hardware_cycle<H: WheelHardware>(
    controller: &mut MecanumDriveController,
    hardware: &mut H,
    mode: FeedbackMode,
    now: Instant,
    dt: f64,
) -> Result<CycleOutput, H::Error> {
    tokio::task::block_in_place(|| {
        let feedback = match hardware.read_feedback(mode) {
            Ok(feedback) => Some(feedback),
            Err(e) => {
                warn!("Failed to read wheel feedback: {}", e);
                None
            }
        };
        let out = controller.update(now, dt, feedback);
        if let Some(wheels) = out.wheels {
            hardware.write_velocities(&wheels)?;
        }
        Ok(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::mailbox::VelocityCommand;

    fn active_on(base: &SimulatedBase) -> (MecanumDriveController, CommandSender) {
        let (tx, rx) = mailbox::channel();
        let mut controller = MecanumDriveController::new(rx);
        controller.configure(DriveConfig::default()).unwrap();
        let (commands, states) = controller.required_interfaces().unwrap();
        controller.assign_interfaces(
            motor::claim(&base.command_interfaces(), &commands),
            motor::claim(&base.state_interfaces(), &states),
        );
        controller.activate().unwrap();
        (controller, tx)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_hardware_cycle_off_the_async_worker() {
        let names = DriveConfig::default().wheel_names;
        let mut base = SimulatedBase::manual(&names);
        let (mut controller, mut tx) = active_on(&base);

        let now = Instant::now();
        tx.publish(VelocityCommand::new(0.1, 0.0, 0.0, now));
        let out = hardware_cycle(&mut controller, &mut base, FeedbackMode::Position, now, 0.02)
            .unwrap();

        // Unlimited axes: 0.1 m/s on 0.05 m wheels
        let wheels = out.wheels.unwrap();
        assert_eq!(base.velocities(), wheels);
        assert!(wheels.as_array().iter().all(|w| (w - 2.0).abs() < 1e-12));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_hardware_cycle_writes_terminal_zero() {
        let names = DriveConfig::default().wheel_names;
        let mut base = SimulatedBase::manual(&names);
        let (mut controller, mut tx) = active_on(&base);

        let now = Instant::now();
        tx.publish(VelocityCommand::new(0.0, 0.1, 0.0, now));
        hardware_cycle(&mut controller, &mut base, FeedbackMode::Position, now, 0.02).unwrap();
        assert!(!base.velocities().is_zero());

        controller.deactivate().unwrap();
        let out = hardware_cycle(&mut controller, &mut base, FeedbackMode::Position, now, 0.0)
            .unwrap();
        assert!(out.wheels.unwrap().is_zero());
        assert!(base.velocities().is_zero());
    }
}
