// Swerve chassis inverse kinematics
// Converts a chassis motion request (vx, vy, w) into an azimuth and speed
// for every independently steered module.

use std::f64::consts::FRAC_PI_2;

use tracing::warn;

use crate::messages::{ModuleGeometry, ModuleSetpoint, ModuleTarget, MotionRequest};

/// Frame in which motion requests are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// relative to the chassis itself, heading ignored
    RobotCentric,
    /// relative to the field, corrected by the gyroscope heading
    FieldCentric,
}

pub struct ChassisKinematics {
    /// half the chassis diagonal
    radius: f64,
    rotate_scale: f64,
    geometries: Vec<ModuleGeometry>,
}

impl ChassisKinematics {
    /// `width`/`height` are the chassis dimensions used for the rotation lever arm
    pub fn new(width: f64, height: f64, geometries: Vec<ModuleGeometry>) -> Self {
        let radius = (width * width + height * height).sqrt() / 2.0;
        Self {
            radius,
            rotate_scale: 1.0 / radius,
            geometries,
        }
    }

    pub fn geometries(&self) -> &[ModuleGeometry] {
        &self.geometries
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Compute the setpoint of every module for this cycle
    ///
    /// # Arguments
    /// * `request` - chassis motion request
    /// * `heading` - gyroscope heading in radians, clockwise positive
    /// * `mode` - robot- or field-centric interpretation of `request`
    ///
    /// # Returns
    /// One setpoint per module, in geometry order. A module whose target
    /// comes out non-finite gets `ModuleSetpoint::Hold`.
    pub fn compute_module_targets(
        &self,
        request: MotionRequest,
        heading: f64,
        mode: FrameMode,
    ) -> Vec<ModuleSetpoint> {
        let effective_heading = match mode {
            FrameMode::RobotCentric => 0.0,
            FrameMode::FieldCentric => heading,
        };
        let tangential_speed = request.w * self.rotate_scale * self.radius;

        self.geometries
            .iter()
            .map(|geometry| {
                // angle between the module, the chassis center and the x axis
                let wheel_angle = geometry.y.atan2(geometry.x) - effective_heading;
                let wx = tangential_speed * (FRAC_PI_2 + wheel_angle).cos();
                let wy = tangential_speed * (FRAC_PI_2 + wheel_angle).sin();

                let vx = request.vx + wx;
                let vy = request.vy + wy;
                let angle = vy.atan2(vx) + effective_heading - FRAC_PI_2;
                let speed = (vx * vx + vy * vy).sqrt();

                if angle.is_finite() && speed.is_finite() {
                    ModuleSetpoint::Drive(ModuleTarget::new(angle, speed))
                } else {
                    warn!(
                        "Module {} target is not finite ({}, {}), holding position",
                        geometry.name, angle, speed
                    );
                    ModuleSetpoint::Hold
                }
            })
            .collect()
    }
}
