// Mecanum drive core: command handoff, speed limiting, kinematics, odometry
// and the lifecycle-managed controller that runs them once per cycle.

pub mod controller;
pub mod frames;
pub mod kinematics;
pub mod limiter;
pub mod mailbox;
pub mod odometry;

pub use controller::{ControlCycle, CycleOutput, Lifecycle, MecanumDriveController};
pub use kinematics::{BodyVelocity, WheelGeometry, WheelVelocitySet};
pub use limiter::{AxisLimits, SpeedLimiter};
pub use mailbox::{CommandReceiver, CommandSender, VelocityCommand};
pub use odometry::{OdometryEstimator, OdometryState};
