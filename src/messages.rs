// Define the values passed between the input, chassis and module layers

use serde::{Deserialize, Serialize};

use crate::swerve::math::canonical_angle;

// Shaped chassis motion request -> kinematics, one per chassis cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionRequest {
    pub vx: f64,
    pub vy: f64,
    /// Angular velocity request, positive = counter-clockwise
    pub w: f64,
}

impl MotionRequest {
    pub fn new(vx: f64, vy: f64, w: f64) -> Self {
        Self { vx, vy, w }
    }

    pub fn stop() -> Self {
        Self::default()
    }
}

/// Where a module sits relative to the chassis center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleGeometry {
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl ModuleGeometry {
    pub fn new(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
        }
    }
}

/// Desired wheel azimuth (radians, `[0, 2π)`) and signed linear speed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleTarget {
    angle: f64,
    pub speed: f64,
}

impl ModuleTarget {
    /// The angle is canonicalized on the way in
    pub fn new(angle: f64, speed: f64) -> Self {
        Self {
            angle: canonical_angle(angle),
            speed,
        }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }
}

// What the chassis loop publishes for each module
// Hold is used when the computed target is unusable (e.g. NaN)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSetpoint {
    Drive(ModuleTarget),
    /// keep the current azimuth, zero drive speed
    #[default]
    Hold,
}

/// Velocity commands for the two motors of a differential module, rad/s at the shaft
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorPair {
    pub motor1: f64,
    pub motor2: f64,
}

impl MotorPair {
    pub fn new(motor1: f64, motor2: f64) -> Self {
        Self { motor1, motor2 }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Discretized directional pad
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pov {
    #[default]
    None,
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl Pov {
    /// Heading selected by this direction, radians clockwise from "up"
    pub fn heading(self) -> Option<f64> {
        let eighths = match self {
            Pov::None => return None,
            Pov::Up => 0.0,
            Pov::UpRight => 1.0,
            Pov::Right => 2.0,
            Pov::DownRight => 3.0,
            Pov::Down => 4.0,
            Pov::DownLeft => 5.0,
            Pov::Left => 6.0,
            Pov::UpLeft => 7.0,
        };
        Some(eighths * std::f64::consts::FRAC_PI_4)
    }

    /// Map a hat angle in degrees (-1 = released) to a direction
    pub fn from_degrees(degrees: i32) -> Self {
        if degrees < 0 {
            return Pov::None;
        }
        match ((degrees.rem_euclid(360) + 22) / 45) % 8 {
            0 => Pov::Up,
            1 => Pov::UpRight,
            2 => Pov::Right,
            3 => Pov::DownRight,
            4 => Pov::Down,
            5 => Pov::DownLeft,
            6 => Pov::Left,
            _ => Pov::UpLeft,
        }
    }
}

/// One sample of the driver's controller, axes already sign-adjusted (up = +)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub left_x: f64,
    pub left_y: f64,
    pub left_trigger: f64,
    pub right_trigger: f64,
    pub pov: Pov,
    /// start button went from pressed to released since the last sample
    pub start_released: bool,
}

/// Health status reported by the runtime
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    #[default]
    Ok,
    Degraded,
    Stopped,
}

/// Operator-facing status snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeStatus {
    pub health: RuntimeHealth,
    pub message: Option<String>,
    /// latest gyroscope heading, radians
    pub heading: f64,
    pub robot_centric: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_target_angle_is_canonical() {
        let target = ModuleTarget::new(-PI / 2.0, 1.0);
        assert!((target.angle() - 1.5 * PI).abs() < 1e-12);
        let target = ModuleTarget::new(5.0 * PI, 1.0);
        assert!((target.angle() - PI).abs() < 1e-9);
    }

    #[test]
    fn test_pov_from_degrees() {
        assert_eq!(Pov::from_degrees(-1), Pov::None);
        assert_eq!(Pov::from_degrees(0), Pov::Up);
        assert_eq!(Pov::from_degrees(90), Pov::Right);
        assert_eq!(Pov::from_degrees(315), Pov::UpLeft);
        assert_eq!(Pov::from_degrees(359), Pov::Up);
    }

    #[test]
    fn test_pov_from_degrees_wraps_large_angles() {
        assert_eq!(Pov::from_degrees(450), Pov::Right);
        assert_eq!(Pov::from_degrees(720 + 315), Pov::UpLeft);
        // i32::MAX is 127 degrees past a whole number of turns
        assert_eq!(Pov::from_degrees(i32::MAX), Pov::DownRight);
        assert_eq!(Pov::from_degrees(i32::MAX - 127 - 180), Pov::Down);
    }

    #[test]
    fn test_pov_heading() {
        assert_eq!(Pov::None.heading(), None);
        assert_eq!(Pov::Up.heading(), Some(0.0));
        assert!((Pov::Left.heading().unwrap() - 1.5 * PI).abs() < 1e-12);
    }

    #[test]
    fn test_setpoint_serializes_snake_case() {
        let json = serde_json::to_string(&ModuleSetpoint::Hold).unwrap();
        assert_eq!(json, "\"hold\"");
    }
}
