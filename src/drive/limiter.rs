// Per-axis speed limiter
//
// Bounds how fast a commanded velocity may change between cycles. Limits are
// signed rates: the forward pair (max_acceleration >= 0, max_deceleration <= 0)
// governs the non-negative half of the axis, the reverse pair
// (max_acceleration_reverse <= 0, max_deceleration_reverse >= 0) governs the
// negative half. A step that crosses zero brakes with the deceleration rate of
// the side it leaves and spends the rest of the cycle accelerating with the
// rate of the side it enters.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ConfigError;

/// Controlled axes of the base, in command order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisId {
    LinearX,
    LinearY,
    AngularZ,
}

impl AxisId {
    pub const ALL: [AxisId; 3] = [AxisId::LinearX, AxisId::LinearY, AxisId::AngularZ];

    fn index(self) -> usize {
        match self {
            AxisId::LinearX => 0,
            AxisId::LinearY => 1,
            AxisId::AngularZ => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AxisId::LinearX => "linear_x",
            AxisId::LinearY => "linear_y",
            AxisId::AngularZ => "angular_z",
        }
    }
}

/// Limits for one axis. `None` leaves that bound open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisLimits {
    pub max_velocity: Option<f64>,
    /// Defaults to `-max_velocity` when only the upper bound is set
    pub min_velocity: Option<f64>,
    pub max_acceleration: Option<f64>,
    pub max_deceleration: Option<f64>,
    pub max_acceleration_reverse: Option<f64>,
    pub max_deceleration_reverse: Option<f64>,
    pub max_jerk: Option<f64>,
}

impl AxisLimits {
    pub fn validate(&self, axis: &'static str) -> Result<(), ConfigError> {
        let signed = [
            ("max_acceleration", self.max_acceleration, 1.0),
            ("max_deceleration", self.max_deceleration, -1.0),
            ("max_acceleration_reverse", self.max_acceleration_reverse, -1.0),
            ("max_deceleration_reverse", self.max_deceleration_reverse, 1.0),
            ("max_jerk", self.max_jerk, 1.0),
        ];
        for (field, value, sign) in signed {
            if let Some(value) = value {
                if !value.is_finite() || value * sign < 0.0 {
                    return Err(ConfigError::LimitSign { axis, field, value });
                }
            }
        }

        for (field, value) in [
            ("max_velocity", self.max_velocity),
            ("min_velocity", self.min_velocity),
        ] {
            if let Some(value) = value.filter(|v| !v.is_finite()) {
                return Err(ConfigError::LimitSign { axis, field, value });
            }
        }

        let (min, max) = self.velocity_bounds();
        if max < min {
            return Err(ConfigError::VelocityRange { axis, min, max });
        }
        Ok(())
    }

    fn velocity_bounds(&self) -> (f64, f64) {
        let max = self.max_velocity.unwrap_or(f64::INFINITY);
        let min = match (self.min_velocity, self.max_velocity) {
            (Some(min), _) => min,
            (None, Some(max)) => -max,
            (None, None) => f64::NEG_INFINITY,
        };
        (min, max)
    }
}

/// Unsigned rate for a signed limit; an open limit is unbounded
fn rate(limit: Option<f64>) -> f64 {
    limit.map_or(f64::INFINITY, f64::abs)
}

/// How a desired value relates to the previous output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Hold,
    Accelerating,
    Decelerating,
    Reversing,
}

impl Transition {
    pub fn classify(prev: f64, desired: f64) -> Self {
        if desired == prev {
            Transition::Hold
        } else if prev == 0.0 {
            Transition::Accelerating
        } else if desired != 0.0 && desired.signum() != prev.signum() {
            Transition::Reversing
        } else if desired.abs() > prev.abs() {
            Transition::Accelerating
        } else {
            Transition::Decelerating
        }
    }
}

/// Limiter state for a single axis
#[derive(Debug, Clone)]
pub struct AxisLimiter {
    limits: AxisLimits,
    // [previous, previous_previous]
    history: [f64; 2],
}

impl AxisLimiter {
    pub fn new(limits: AxisLimits) -> Self {
        Self {
            limits,
            history: [0.0; 2],
        }
    }

    /// Last accepted output
    pub fn previous(&self) -> f64 {
        self.history[0]
    }

    pub fn reset(&mut self) {
        self.history = [0.0; 2];
    }

    /// Limit `desired` for a cycle of `dt` seconds and record the result
    pub fn limit(&mut self, desired: f64, dt: f64) -> f64 {
        let prev = self.previous();
        if !(dt.is_finite() && dt > 0.0 && desired.is_finite()) {
            self.push(prev);
            return prev;
        }

        let mut v = self.limit_jerk(desired, dt);
        v = self.limit_rate(v, dt);
        v = self.limit_velocity(v);

        trace!(
            "limit: prev={:.4} desired={:.4} out={:.4} ({:?})",
            prev,
            desired,
            v,
            Transition::classify(prev, desired)
        );
        self.push(v);
        v
    }

    fn push(&mut self, v: f64) {
        self.history.rotate_right(1);
        self.history[0] = v;
    }

    fn limit_jerk(&self, v: f64, dt: f64) -> f64 {
        let Some(jerk) = self.limits.max_jerk else {
            return v;
        };
        let [v0, v1] = self.history;
        let dv = v - v0;
        let dv0 = v0 - v1;
        let da_max = jerk * 2.0 * dt * dt;
        let da = (dv - dv0).clamp(-da_max, da_max);
        v0 + dv0 + da
    }

    /// Largest reachable values below and above `prev` within `dt`
    fn step_bounds(&self, prev: f64, dt: f64) -> (f64, f64) {
        let acc = rate(self.limits.max_acceleration);
        let dec = rate(self.limits.max_deceleration);
        let acc_rev = rate(self.limits.max_acceleration_reverse);
        let dec_rev = rate(self.limits.max_deceleration_reverse);

        let hi = if prev >= 0.0 {
            prev + acc * dt
        } else {
            let to_zero = -prev / dec_rev;
            if to_zero >= dt {
                prev + dec_rev * dt
            } else {
                acc * (dt - to_zero)
            }
        };

        let lo = if prev <= 0.0 {
            prev - acc_rev * dt
        } else {
            let to_zero = prev / dec;
            if to_zero >= dt {
                prev - dec * dt
            } else {
                -acc_rev * (dt - to_zero)
            }
        };

        (lo, hi)
    }

    fn limit_rate(&self, v: f64, dt: f64) -> f64 {
        let (lo, hi) = self.step_bounds(self.previous(), dt);
        v.max(lo).min(hi)
    }

    fn limit_velocity(&self, v: f64) -> f64 {
        let (min, max) = self.limits.velocity_bounds();
        v.max(min).min(max)
    }
}

/// One [`AxisLimiter`] per controlled axis
#[derive(Debug, Clone)]
pub struct SpeedLimiter {
    axes: [AxisLimiter; 3],
}

impl SpeedLimiter {
    pub fn new(linear_x: AxisLimits, linear_y: AxisLimits, angular_z: AxisLimits) -> Self {
        Self {
            axes: [
                AxisLimiter::new(linear_x),
                AxisLimiter::new(linear_y),
                AxisLimiter::new(angular_z),
            ],
        }
    }

    pub fn limit(&mut self, axis: AxisId, desired: f64, dt: f64) -> f64 {
        self.axes[axis.index()].limit(desired, dt)
    }

    pub fn previous(&self, axis: AxisId) -> f64 {
        self.axes[axis.index()].previous()
    }

    pub fn reset(&mut self) {
        self.axes.iter_mut().for_each(AxisLimiter::reset);
    }
}
