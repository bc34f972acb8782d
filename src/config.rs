// Timeouts, topics, motor configuration and the drive parameters loaded at configure time
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drive::limiter::AxisLimits;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(500);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "mecanum/cmd/base"; // commands
pub const TOPIC_RT_WHEELS: &str = "mecanum/rt/wheels"; // wheel setpoints
pub const TOPIC_ODOM: &str = "mecanum/state/odom"; // odometry
pub const TOPIC_HEALTH: &str = "mecanum/state/health"; // health status

// Serial port for the Feetech motor bus
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

// Motor IDs in wheel order: front_left, front_right, rear_left, rear_right
pub const MOTOR_IDS: [u8; 4] = [1, 2, 3, 4];

pub const DEFAULT_WHEEL_NAMES: [&str; 4] = [
    "front_left_wheel",
    "front_right_wheel",
    "rear_left_wheel",
    "rear_right_wheel",
];

/// Errors raised while loading or validating a [`DriveConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Expected 4 wheel names, got {0}")]
    WheelCount(usize),

    #[error("{name} must be finite and > 0, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} = {value} does not give a usable non-zero duration")]
    DurationRange { name: &'static str, value: f64 },

    #[error("{axis}.{field} has the wrong sign or is not finite: {value}")]
    LimitSign {
        axis: &'static str,
        field: &'static str,
        value: f64,
    },

    #[error("{axis}: max_velocity {max} is below min_velocity {min}")]
    VelocityRange {
        axis: &'static str,
        min: f64,
        max: f64,
    },
}

/// Where the odometry reads its wheel feedback from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    #[default]
    Position,
    Velocity,
}

/// Drive parameters, fixed between configure and cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub wheel_names: Vec<String>,
    pub wheel_separation_x: f64,
    pub wheel_separation_y: f64,
    pub wheel_radius: f64,
    pub linear_x: AxisLimits,
    pub linear_y: AxisLimits,
    pub angular_z: AxisLimits,
    pub feedback_mode: FeedbackMode,
    /// Seconds without a fresh command before it counts as stale
    pub cmd_vel_timeout: f64,
    /// Zero the wheels immediately on a stale command instead of decelerating
    pub halt_on_timeout: bool,
    pub update_rate_hz: f64,
    pub odom_frame_id: String,
    pub base_frame_id: String,
    pub tf_frame_prefix_enable: bool,
    pub tf_frame_prefix: String,
    pub namespace: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            wheel_names: DEFAULT_WHEEL_NAMES.iter().map(|s| s.to_string()).collect(),
            wheel_separation_x: 0.2,
            wheel_separation_y: 0.2,
            wheel_radius: 0.05,
            linear_x: AxisLimits::default(),
            linear_y: AxisLimits::default(),
            angular_z: AxisLimits::default(),
            feedback_mode: FeedbackMode::Position,
            cmd_vel_timeout: CMD_TIMEOUT.as_secs_f64(),
            halt_on_timeout: false,
            update_rate_hz: LOOP_HZ as f64,
            odom_frame_id: "odom".to_string(),
            base_frame_id: "base_link".to_string(),
            tf_frame_prefix_enable: true,
            tf_frame_prefix: String::new(),
            namespace: String::new(),
        }
    }
}

impl DriveConfig {
    /// Load a config from a JSON file; missing fields fall back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wheel_names.len() != 4 {
            return Err(ConfigError::WheelCount(self.wheel_names.len()));
        }

        for (name, value) in [
            ("wheel_separation_x", self.wheel_separation_x),
            ("wheel_separation_y", self.wheel_separation_y),
            ("wheel_radius", self.wheel_radius),
            ("cmd_vel_timeout", self.cmd_vel_timeout),
            ("update_rate_hz", self.update_rate_hz),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        if self.try_cmd_timeout().is_none() {
            return Err(ConfigError::DurationRange {
                name: "cmd_vel_timeout",
                value: self.cmd_vel_timeout,
            });
        }
        if self.try_period().is_none() {
            return Err(ConfigError::DurationRange {
                name: "update_rate_hz",
                value: self.update_rate_hz,
            });
        }

        self.linear_x.validate("linear_x")?;
        self.linear_y.validate("linear_y")?;
        self.angular_z.validate("angular_z")?;
        Ok(())
    }

    /// Command age limit; the built-in default if the value does not validate
    pub fn cmd_timeout(&self) -> Duration {
        self.try_cmd_timeout().unwrap_or(CMD_TIMEOUT)
    }

    /// Loop period; the built-in rate if the value does not validate
    pub fn period(&self) -> Duration {
        self.try_period()
            .unwrap_or(Duration::from_millis(1000 / LOOP_HZ))
    }

    fn try_cmd_timeout(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.cmd_vel_timeout)
            .ok()
            .filter(|d| !d.is_zero())
    }

    // tokio's interval rejects a zero period
    fn try_period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(1.0 / self.update_rate_hz)
            .ok()
            .filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DriveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.feedback_mode, FeedbackMode::Position);
        assert_eq!(config.period(), Duration::from_millis(20));
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let config = DriveConfig {
            wheel_radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                name: "wheel_radius",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_wrong_wheel_count() {
        let config = DriveConfig {
            wheel_names: vec!["left".into(), "right".into()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::WheelCount(2))));
    }

    #[test]
    fn test_rejects_timeout_beyond_duration_range() {
        let config = DriveConfig {
            cmd_vel_timeout: 1e20,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DurationRange {
                name: "cmd_vel_timeout",
                ..
            })
        ));
        assert_eq!(config.cmd_timeout(), CMD_TIMEOUT);
    }

    #[test]
    fn test_rejects_rate_with_overflowing_period() {
        let config = DriveConfig {
            update_rate_hz: 1e-300,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DurationRange {
                name: "update_rate_hz",
                ..
            })
        ));
        assert_eq!(config.period(), Duration::from_millis(20));
    }

    #[test]
    fn test_rejects_rate_with_zero_period() {
        let config = DriveConfig {
            update_rate_hz: 1e12,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DurationRange {
                name: "update_rate_hz",
                ..
            })
        ));
        assert!(!config.period().is_zero());
    }

    #[test]
    fn test_rejects_timeout_below_one_nanosecond() {
        let config = DriveConfig {
            cmd_vel_timeout: 1e-12,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DurationRange { .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "wheel_radius": 0.1,
            "feedback_mode": "velocity",
            "linear_x": { "max_acceleration": 2.0, "max_deceleration": -4.0 }
        }"#;
        let config: DriveConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.wheel_radius, 0.1);
        assert_eq!(config.feedback_mode, FeedbackMode::Velocity);
        assert_eq!(config.linear_x.max_acceleration, Some(2.0));
        assert_eq!(config.linear_x.max_velocity, None);
        assert_eq!(config.wheel_names.len(), 4);
        assert!(config.validate().is_ok());
    }
}
