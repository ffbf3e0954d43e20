use nalgebra::Vector3;

/// Gravity vector in world frame (m/s^2).
pub const GRAVITY: Vector3<f64> = Vector3::new(0.0, 0.0, -9.81);

/// Single IMU measurement, timestamped on the camera clock.
#[derive(Debug, Clone, Copy)]
pub struct ImuSample {
    pub timestamp_ns: u64,
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
}

impl ImuSample {
    /// Sample of a sensor at rest: specific force cancels gravity, no rotation.
    pub fn at_rest(timestamp_ns: u64) -> Self {
        Self {
            timestamp_ns,
            accel: -GRAVITY,
            gyro: Vector3::zeros(),
        }
    }
}
