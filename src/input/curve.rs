// Piecewise-linear response curve
//
// Defined by control points (xs[i], ys[i]) with strictly ascending xs and
// non-negative, non-decreasing ys, linearly interpolated between them. Built
// wholesale from configuration and never edited point by point.

use serde::{Deserialize, Serialize};

use crate::swerve::math::transformation;

/// Default curve input points, used whenever configured points are unusable
pub const DEFAULT_X_VALS: [f64; 4] = [0.0, 0.35, 0.7, 1.0];
/// Default curve output points
pub const DEFAULT_Y_VALS: [f64; 4] = [0.0, 0.1, 0.4, 1.0];

/// Errors raised when building or evaluating a curve
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CurveError {
    #[error("curve needs at least 2 points, got {0}")]
    TooFewPoints(usize),

    #[error("curve point lists differ in length: {xs} x values, {ys} y values")]
    LengthMismatch { xs: usize, ys: usize },

    #[error("curve point {index} is not finite")]
    NonFinite { index: usize },

    #[error("curve x values must be strictly ascending (x[{index}] = {value})")]
    NotAscending { index: usize, value: f64 },

    #[error("curve y values must be non-negative and non-decreasing (y[{index}] = {value})")]
    NotMonotonic { index: usize, value: f64 },

    #[error("unable to parse curve value {value:?} at position {index}")]
    Parse { index: usize, value: String },

    #[error("input {input} is outside the curve domain [{min}, {max}]")]
    OutOfDomain { input: f64, min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseLinearCurve {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl PiecewiseLinearCurve {
    /// Build a curve from matching lists of x and y values
    ///
    /// xs must be strictly ascending; ys must be non-negative and
    /// non-decreasing so the shaped output never changes sign.
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self, CurveError> {
        if xs.len() != ys.len() {
            return Err(CurveError::LengthMismatch {
                xs: xs.len(),
                ys: ys.len(),
            });
        }
        if xs.len() < 2 {
            return Err(CurveError::TooFewPoints(xs.len()));
        }
        for (index, (x, y)) in xs.iter().zip(ys).enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Err(CurveError::NonFinite { index });
            }
        }
        for (index, pair) in xs.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(CurveError::NotAscending {
                    index: index + 1,
                    value: pair[1],
                });
            }
        }

        if ys[0] < 0.0 {
            return Err(CurveError::NotMonotonic {
                index: 0,
                value: ys[0],
            });
        }
        for (index, pair) in ys.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(CurveError::NotMonotonic {
                    index: index + 1,
                    value: pair[1],
                });
            }
        }

        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
        })
    }

    /// The compiled-in default response curve
    pub fn default_profile() -> Self {
        Self {
            xs: DEFAULT_X_VALS.to_vec(),
            ys: DEFAULT_Y_VALS.to_vec(),
        }
    }

    /// Parse two comma-separated lists of numbers into a curve
    ///
    /// Only the first `min(len(xs), len(ys))` entries of each list are used;
    /// the longer list is silently truncated.
    pub fn from_csv(xs: &str, ys: &str) -> Result<Self, CurveError> {
        let x_items: Vec<&str> = xs.split(',').collect();
        let y_items: Vec<&str> = ys.split(',').collect();
        let len = x_items.len().min(y_items.len());

        let parse = |items: &[&str]| -> Result<Vec<f64>, CurveError> {
            items[..len]
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    item.trim().parse::<f64>().map_err(|_| CurveError::Parse {
                        index,
                        value: item.to_string(),
                    })
                })
                .collect()
        };

        let x_vals = parse(&x_items)?;
        let y_vals = parse(&y_items)?;
        Self::new(&x_vals, &y_vals)
    }

    /// Evaluate the curve at `x`
    ///
    /// Returns `CurveError::OutOfDomain` when `x` is outside `[xs[0], xs[last]]`
    /// (or NaN). The last x value itself belongs to the final segment.
    pub fn apply(&self, x: f64) -> Result<f64, CurveError> {
        let (min, max) = self.domain();
        if !(min..=max).contains(&x) {
            return Err(CurveError::OutOfDomain { input: x, min, max });
        }

        // Point counts are tiny, a linear scan beats a binary search here
        let last_segment = self.xs.len() - 2;
        let segment = (0..=last_segment)
            .find(|&i| x <= self.xs[i + 1])
            .unwrap_or(last_segment);

        Ok(transformation(
            self.xs[segment],
            self.xs[segment + 1],
            self.ys[segment],
            self.ys[segment + 1],
            x,
        ))
    }

    /// Evaluate the curve, clamping out-of-domain inputs to the nearest boundary output
    pub fn apply_clamped(&self, x: f64) -> f64 {
        match self.apply(x) {
            Ok(y) => y,
            Err(_) if x > self.domain().1 => self.ys[self.ys.len() - 1],
            Err(_) => self.ys[0],
        }
    }

    /// `(xs[0], xs[last])`
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn x_vals(&self) -> &[f64] {
        &self.xs
    }

    pub fn y_vals(&self) -> &[f64] {
        &self.ys
    }
}

impl Default for PiecewiseLinearCurve {
    fn default() -> Self {
        Self::default_profile()
    }
}
