// Mecanum kinematics for the 4-wheel base
// Converts body-frame velocities (x, y, yaw rate) to wheel angular velocities and back.
//
// Wheel layout, with k = wheel_separation_x + wheel_separation_y:
//   front_left  = (vx - vy - k*wz) / r
//   front_right = (vx + vy + k*wz) / r
//   rear_left   = (vx + vy - k*wz) / r
//   rear_right  = (vx - vy + k*wz) / r

/// Base geometry in meters, all values > 0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    pub wheel_separation_x: f64,
    pub wheel_separation_y: f64,
    pub wheel_radius: f64,
}

impl WheelGeometry {
    pub fn new(wheel_separation_x: f64, wheel_separation_y: f64, wheel_radius: f64) -> Self {
        Self {
            wheel_separation_x,
            wheel_separation_y,
            wheel_radius,
        }
    }

    fn lever(&self) -> f64 {
        self.wheel_separation_x + self.wheel_separation_y
    }
}

/// Wheel angular velocities in rad/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelVelocitySet {
    pub front_left: f64,
    pub front_right: f64,
    pub rear_left: f64,
    pub rear_right: f64,
}

impl WheelVelocitySet {
    pub fn new(front_left: f64, front_right: f64, rear_left: f64, rear_right: f64) -> Self {
        Self {
            front_left,
            front_right,
            rear_left,
            rear_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns velocities as array [front_left, front_right, rear_left, rear_right]
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_left,
            self.rear_right,
        ]
    }

    pub fn from_array(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|&w| w == 0.0)
    }
}

/// Body-frame velocity: forward, left, counter-clockwise
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyVelocity {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

impl BodyVelocity {
    pub fn new(linear_x: f64, linear_y: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            linear_y,
            angular_z,
        }
    }
}

/// Body velocity -> wheel angular velocities
pub fn wheel_velocities(body: BodyVelocity, geometry: &WheelGeometry) -> WheelVelocitySet {
    let BodyVelocity {
        linear_x: vx,
        linear_y: vy,
        angular_z: wz,
    } = body;
    let r = geometry.wheel_radius;
    let turn = geometry.lever() * wz;

    WheelVelocitySet {
        front_left: (vx - vy - turn) / r,
        front_right: (vx + vy + turn) / r,
        rear_left: (vx + vy - turn) / r,
        rear_right: (vx - vy + turn) / r,
    }
}

/// Wheel angular velocities -> body velocity
///
/// Four wheels over-determine three degrees of freedom. This is the
/// least-squares solution; the columns of the wheel matrix are orthogonal, so
/// it reduces to a signed average of the four wheels. Slip that makes the
/// wheels disagree is spread evenly rather than trusting any three of them.
pub fn body_velocity(wheels: &WheelVelocitySet, geometry: &WheelGeometry) -> BodyVelocity {
    let [fl, fr, rl, rr] = wheels.as_array();
    let r = geometry.wheel_radius;

    BodyVelocity {
        linear_x: r * (fl + fr + rl + rr) / 4.0,
        linear_y: r * (-fl + fr + rl - rr) / 4.0,
        angular_z: r * (-fl + fr - rl + rr) / (4.0 * geometry.lever()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> WheelGeometry {
        WheelGeometry::new(1.0, 1.0, 0.1)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_zero_velocity() {
        let wheels = wheel_velocities(BodyVelocity::default(), &geometry());
        assert!(wheels.is_zero());
    }

    #[test]
    fn test_forward_motion() {
        // All four wheels equal and positive: linear_x / radius
        let wheels = wheel_velocities(BodyVelocity::new(1.0, 0.0, 0.0), &geometry());
        for w in wheels.as_array() {
            assert_close(w, 10.0);
        }
    }

    #[test]
    fn test_strafe_motion() {
        let wheels = wheel_velocities(BodyVelocity::new(0.0, 0.5, 0.0), &geometry());
        assert_close(wheels.front_left, -5.0);
        assert_close(wheels.front_right, 5.0);
        assert_close(wheels.rear_left, 5.0);
        assert_close(wheels.rear_right, -5.0);
    }

    #[test]
    fn test_rotation_only() {
        // Left and right sides spin opposite directions
        let wheels = wheel_velocities(BodyVelocity::new(0.0, 0.0, 1.0), &geometry());
        assert_close(wheels.front_left, -20.0);
        assert_close(wheels.rear_left, -20.0);
        assert_close(wheels.front_right, 20.0);
        assert_close(wheels.rear_right, 20.0);
    }

    #[test]
    fn test_diagonal_motion() {
        let wheels = wheel_velocities(BodyVelocity::new(1.0, 1.0, 0.0), &geometry());
        assert_close(wheels.front_left, 0.0);
        assert_close(wheels.front_right, 20.0);
        assert_close(wheels.rear_left, 20.0);
        assert_close(wheels.rear_right, 0.0);
    }

    #[test]
    fn test_forward_inverts_inverse() {
        let geometries = [
            geometry(),
            WheelGeometry::new(0.2, 0.15, 0.05),
            WheelGeometry::new(3.0, 0.4, 1.2),
        ];
        let bodies = [
            BodyVelocity::new(0.3, -0.2, 0.7),
            BodyVelocity::new(-1.5, 2.0, -0.1),
            BodyVelocity::new(0.0, 0.0, 4.0),
        ];
        for g in &geometries {
            for &b in &bodies {
                let back = body_velocity(&wheel_velocities(b, g), g);
                assert_close(back.linear_x, b.linear_x);
                assert_close(back.linear_y, b.linear_y);
                assert_close(back.angular_z, b.angular_z);
            }
        }
    }

    #[test]
    fn test_forward_averages_inconsistent_wheels() {
        // One wheel slipping: the estimate is pulled a quarter of the way
        let g = geometry();
        let mut wheels = wheel_velocities(BodyVelocity::new(1.0, 0.0, 0.0), &g);
        wheels.front_left = 6.0;
        let body = body_velocity(&wheels, &g);
        assert_close(body.linear_x, 0.1 * 36.0 / 4.0);
    }
}
