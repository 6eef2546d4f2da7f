// Human-interface input shaping
//
// Provides:
// - Piecewise-linear response curve
// - Dead-band + curve axis shaper

pub mod curve;
pub mod profile;

pub use curve::{CurveError, PiecewiseLinearCurve};
pub use profile::{InputShaper, ShaperFault, DEFAULT_DEADBAND};
