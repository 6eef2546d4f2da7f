// Joystick input shaping: dead-band, rescale, then response curve

use tracing::{info, warn};

use super::curve::{CurveError, PiecewiseLinearCurve};
use crate::swerve::math::{sign, transformation};

/// Dead-band used when nothing is configured
pub const DEFAULT_DEADBAND: f64 = 0.1;

/// Why the shaper is not running its normal pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShaperFault {
    #[error("joystick profile unusable ({0}), using default profile")]
    CurveFallback(CurveError),

    #[error("joystick deadband {0} leaves no usable range, response curve disabled")]
    DegenerateDeadband(f64),
}

/// Maps a raw axis value in `[-1, 1]` to a shaped motion value
///
/// 1. magnitudes at or below the dead-band become 0
/// 2. the remaining range `(D, 1]` is shifted and rescaled onto `(0, 1]`
/// 3. the result is passed through the response curve (clamped to its domain)
/// 4. the original sign is restored
#[derive(Debug, Clone)]
pub struct InputShaper {
    deadband: f64,
    curve: PiecewiseLinearCurve,
    faults: Vec<ShaperFault>,
}

impl InputShaper {
    pub fn new(deadband: f64, curve: PiecewiseLinearCurve) -> Self {
        let mut shaper = Self {
            deadband,
            curve,
            faults: Vec::new(),
        };
        shaper.check_deadband();
        shaper
    }

    /// Build from the configured comma-separated point lists
    ///
    /// Malformed lists never fail: the default curve is substituted and the
    /// fault is kept for the operator status message.
    pub fn from_config(deadband: f64, x_vals: &str, y_vals: &str) -> Self {
        let mut shaper = Self::new(deadband, PiecewiseLinearCurve::default_profile());
        shaper.update_profile(x_vals, y_vals);
        shaper
    }

    /// Rebuild the response curve from new point lists
    pub fn update_profile(&mut self, x_vals: &str, y_vals: &str) {
        self.faults
            .retain(|f| !matches!(f, ShaperFault::CurveFallback(_)));
        match PiecewiseLinearCurve::from_csv(x_vals, y_vals) {
            Ok(curve) => {
                info!(
                    "Joystick profile loaded: x={:?} y={:?}",
                    curve.x_vals(),
                    curve.y_vals()
                );
                self.curve = curve;
            }
            Err(e) => {
                warn!("Unable to load joystick profile values ({}), loading default instead", e);
                self.curve = PiecewiseLinearCurve::default_profile();
                self.faults.push(ShaperFault::CurveFallback(e));
            }
        }
    }

    /// Swap in an already-validated curve
    pub fn set_curve(&mut self, curve: PiecewiseLinearCurve) {
        self.faults
            .retain(|f| !matches!(f, ShaperFault::CurveFallback(_)));
        self.curve = curve;
    }

    fn check_deadband(&mut self) {
        self.faults
            .retain(|f| !matches!(f, ShaperFault::DegenerateDeadband(_)));
        if !(0.0..1.0).contains(&self.deadband) {
            warn!(
                "Joystick deadband {} is degenerate, shaping with deadband only",
                self.deadband
            );
            self.faults
                .push(ShaperFault::DegenerateDeadband(self.deadband));
        }
    }

    fn deadband_only(&self) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f, ShaperFault::DegenerateDeadband(_)))
    }

    /// Shape one raw axis value
    pub fn shape(&self, raw: f64) -> f64 {
        if raw.is_nan() {
            return 0.0;
        }
        let magnitude = apply_deadband(raw.abs(), self.deadband);
        // at rest regardless of what the curve gives for 0
        if magnitude == 0.0 {
            return 0.0;
        }
        let signum = sign(raw);

        if self.deadband_only() {
            return magnitude * signum;
        }

        let rescaled = transformation(
            0.0,
            1.0 - self.deadband,
            0.0,
            1.0,
            magnitude - self.deadband,
        );
        self.curve.apply_clamped(rescaled) * signum
    }

    pub fn deadband(&self) -> f64 {
        self.deadband
    }

    pub fn curve(&self) -> &PiecewiseLinearCurve {
        &self.curve
    }

    /// Current configuration problems, empty when shaping normally
    pub fn faults(&self) -> &[ShaperFault] {
        &self.faults
    }
}

impl Default for InputShaper {
    fn default() -> Self {
        Self::new(DEFAULT_DEADBAND, PiecewiseLinearCurve::default_profile())
    }
}

/// Zero `x` when its magnitude is within `deadband`
pub fn apply_deadband(x: f64, deadband: f64) -> f64 {
    if x.abs() > deadband { x } else { 0.0 }
}

/// Square while keeping the sign
pub fn signed_square(x: f64) -> f64 {
    (x * x).copysign(x)
}

/// Default dead-band followed by a signed square
pub fn clip_and_square(x: f64) -> f64 {
    signed_square(apply_deadband(x, DEFAULT_DEADBAND))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_deadband_is_zero() {
        let shaper = InputShaper::default();
        assert_eq!(shaper.shape(0.05), 0.0);
        assert_eq!(shaper.shape(-0.1), 0.0);
        assert_eq!(shaper.shape(0.0), 0.0);
    }

    #[test]
    fn test_deadband_wins_over_curve_offset() {
        // curve starts above zero: resting stick must still be still
        let shaper = InputShaper::from_config(0.1, "0,1", "0.2,1");
        assert!(shaper.faults().is_empty());
        assert_eq!(shaper.shape(0.05), 0.0);
        assert_eq!(shaper.shape(-0.1), 0.0);
        assert!(shaper.shape(0.11) >= 0.2);
        assert!(shaper.shape(-0.11) <= -0.2);
    }

    #[test]
    fn test_dipping_profile_falls_back() {
        let shaper = InputShaper::from_config(0.1, "0,0.5,1", "0,-0.3,1");
        assert_eq!(shaper.curve(), &PiecewiseLinearCurve::default_profile());
        assert!(matches!(
            shaper.faults(),
            [ShaperFault::CurveFallback(CurveError::NotMonotonic { .. })]
        ));
        assert!(shaper.shape(0.3) > 0.0);
    }

    #[test]
    fn test_worked_example() {
        // 0.55 -> 0.45 past the deadband -> 0.45/0.9 = 0.5 on the curve
        let shaper = InputShaper::default();
        let expected = 0.1 + (0.5 - 0.35) / (0.7 - 0.35) * (0.4 - 0.1);
        assert!((shaper.shape(0.55) - expected).abs() < 1e-9);
        assert!((shaper.shape(0.55) - 0.2286).abs() < 1e-3);
        assert!((shaper.shape(-0.55) + expected).abs() < 1e-9);
    }

    #[test]
    fn test_full_deflection_maps_to_one() {
        let shaper = InputShaper::default();
        assert!((shaper.shape(1.0) - 1.0).abs() < 1e-9);
        assert!((shaper.shape(-1.0) + 1.0).abs() < 1e-9);
        // beyond the nominal range clamps to the curve maximum
        assert!((shaper.shape(1.2) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_profile_falls_back() {
        let shaper = InputShaper::from_config(0.1, "0,0.5,oops", "0,0.5,1");
        assert_eq!(shaper.curve(), &PiecewiseLinearCurve::default_profile());
        assert!(matches!(
            shaper.faults(),
            [ShaperFault::CurveFallback(CurveError::Parse { .. })]
        ));
    }

    #[test]
    fn test_non_ascending_profile_falls_back() {
        let shaper = InputShaper::from_config(0.1, "0,0.7,0.35,1", "0,0.4,0.1,1");
        assert_eq!(shaper.curve(), &PiecewiseLinearCurve::default_profile());
        assert_eq!(shaper.faults().len(), 1);
    }

    #[test]
    fn test_reload_clears_fallback() {
        let mut shaper = InputShaper::from_config(0.1, "bad", "bad");
        assert!(!shaper.faults().is_empty());
        shaper.update_profile("0,1", "0,1");
        assert!(shaper.faults().is_empty());
        // linear curve: 0.55 -> 0.45/0.9
        assert!((shaper.shape(0.55) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_deadband_of_one_is_deadband_only() {
        let shaper = InputShaper::new(1.0, PiecewiseLinearCurve::default_profile());
        assert!(matches!(
            shaper.faults(),
            [ShaperFault::DegenerateDeadband(_)]
        ));
        assert_eq!(shaper.shape(0.7), 0.0);
        assert_eq!(shaper.shape(1.0), 0.0);
        assert!(shaper.shape(1.5).is_finite());
    }

    #[test]
    fn test_nan_input_is_zero() {
        assert_eq!(InputShaper::default().shape(f64::NAN), 0.0);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(apply_deadband(0.05, 0.1), 0.0);
        assert_eq!(apply_deadband(-0.5, 0.1), -0.5);
        assert_eq!(signed_square(-0.5), -0.25);
        assert_eq!(clip_and_square(0.08), 0.0);
        assert!((clip_and_square(-0.6) + 0.36).abs() < 1e-12);
    }
}
