pub mod config;
pub mod control;
pub mod hardware;
pub mod input;
pub mod messages;
pub mod runtime;
pub mod shared;
pub mod swerve;
