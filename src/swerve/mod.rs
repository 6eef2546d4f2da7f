// Swerve drive core
//
// Provides:
// - Chassis inverse kinematics (motion request -> per-module azimuth/speed)
// - Per-module shortest-rotation steering and differential motor mixing
// - Azimuth zero offset bookkeeping
// - Profiled PID used by the steering servo

pub mod kinematics;
pub mod math;
pub mod module;
pub mod pid;
pub mod zeroing;

pub use kinematics::{ChassisKinematics, FrameMode};
pub use module::{ModuleOutput, ModuleSteeringController, SteeringConfig, SteeringDecision};
pub use zeroing::{ZeroError, ZeroEvent, ZeroOffset, ZeroingCoordinator};
