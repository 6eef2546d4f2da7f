// Hardware collaborators of the swerve runtime
//
// Provides:
// - Traits for the absolute azimuth encoder, module motor pair, gyroscope,
//   driver input and zero offset persistence
// - Simulated implementations for running without a robot

pub mod sim;

use std::sync::Arc;

use crate::messages::{ControllerState, MotorPair};
use crate::swerve::ZeroOffset;

/// Error types for hardware access
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("Motor write failed on module {module}: {reason}")]
    MotorWrite { module: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to persist zero offsets: {0}")]
pub struct PersistError(pub String);

/// Absolute azimuth encoder of a module
pub trait AbsoluteEncoder: Send + Sync {
    /// Absolute reading in rotations (may be multi-turn)
    fn rotations(&self) -> f64;
}

/// The two motors of a differential swerve module
pub trait ModuleMotors: Send {
    /// Command both motor shaft velocities, rad/s
    fn set_velocities(&mut self, command: MotorPair) -> Result<(), HardwareError>;

    /// Release the motors; no velocity command follows this
    fn disable(&mut self) -> Result<(), HardwareError>;
}

/// Heading source
pub trait Gyro: Send + Sync {
    /// Heading in radians, clockwise positive
    fn heading(&self) -> f64;

    /// Make the current heading read as zero
    fn zero_yaw(&self);
}

/// Driver controller
pub trait InputSource: Send {
    fn poll(&mut self) -> ControllerState;
}

/// Where zero offsets are persisted (the configuration store)
pub trait ZeroStore: Send {
    fn persist(&mut self, offsets: &[ZeroOffset]) -> Result<(), PersistError>;
}

/// Hardware of one module, in the same order as the configured geometries
pub struct ModuleHardware {
    pub encoder: Arc<dyn AbsoluteEncoder>,
    pub motors: Box<dyn ModuleMotors>,
}

/// Everything the runtime needs from the outside world
pub struct Hardware {
    pub modules: Vec<ModuleHardware>,
    pub gyro: Arc<dyn Gyro>,
    pub input: Box<dyn InputSource>,
    pub zero_store: Box<dyn ZeroStore>,
}
