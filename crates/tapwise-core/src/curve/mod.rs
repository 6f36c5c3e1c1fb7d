//! Pointer acceleration curves.
//!
//! An [`AccelerationCurve`] is a cubic Bezier in the unit square mapping
//! normalized input velocity (X) to normalized output velocity (Y). The
//! [`bezier`] module evaluates and inverts it, and [`VelocityMapper`] turns
//! raw pointer deltas into scaled ones.
//!
//! Curves built from presets or through [`AccelerationCurve::custom`] are
//! guaranteed monotonic. [`AccelerationCurve::unchecked`] skips validation
//! and exists for tests and benches only; the math never assumes
//! monotonicity and always clamps its output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::geometry::Point;

pub mod bezier;
mod velocity;

pub use bezier::{accelerate, evaluate, evaluate_x, solve_for_x};
pub use velocity::{VelocityMapper, DEFAULT_MAX_VELOCITY, DEFAULT_MIN_VELOCITY};

/// Errors raised when building a curve from user input.
#[derive(Debug, Error, PartialEq)]
pub enum CurveError {
    /// A control point lies outside the unit square.
    #[error("control point ({x}, {y}) lies outside [0,1]²")]
    OutOfRange { x: f64, y: f64 },

    /// Control point coordinates decrease along the curve.
    #[error("control points must be non-decreasing in both X and Y")]
    NotMonotonic,

    /// The named preset does not exist.
    #[error("unknown curve preset: {0}")]
    UnknownPreset(String),
}

/// Built-in curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurvePreset {
    /// Output equals input.
    Linear,
    /// Gentle ease-in close to the stock macOS feel.
    System,
    /// Slow at low speed for fine positioning.
    Precision,
    /// Fast ramp for large sweeps.
    Gaming,
}

impl CurvePreset {
    pub const ALL: [CurvePreset; 4] = [
        CurvePreset::Linear,
        CurvePreset::System,
        CurvePreset::Precision,
        CurvePreset::Gaming,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CurvePreset::Linear => "linear",
            CurvePreset::System => "system",
            CurvePreset::Precision => "precision",
            CurvePreset::Gaming => "gaming",
        }
    }

    fn inner_points(self) -> ((f64, f64), (f64, f64)) {
        match self {
            CurvePreset::Linear => ((1.0 / 3.0, 1.0 / 3.0), (2.0 / 3.0, 2.0 / 3.0)),
            CurvePreset::System => ((0.3, 0.1), (0.7, 0.6)),
            CurvePreset::Precision => ((0.5, 0.05), (0.9, 0.6)),
            CurvePreset::Gaming => ((0.15, 0.35), (0.6, 0.95)),
        }
    }
}

impl fmt::Display for CurvePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CurvePreset {
    type Err = CurveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurvePreset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CurveError::UnknownPreset(s.to_string()))
    }
}

/// A cubic Bezier acceleration curve with fixed endpoints `(0,0)` and `(1,1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccelerationCurve {
    name: String,
    points: [Point; 4],
}

impl AccelerationCurve {
    pub fn preset(preset: CurvePreset) -> Self {
        let ((x1, y1), (x2, y2)) = preset.inner_points();
        Self::unchecked(preset.name(), (x1, y1), (x2, y2))
    }

    /// Builds a user-defined curve from its two inner control points.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::OutOfRange`] if a point leaves the unit square and
    /// [`CurveError::NotMonotonic`] if X or Y decreases from `p0` to `p3`.
    pub fn custom(name: &str, p1: (f64, f64), p2: (f64, f64)) -> Result<Self, CurveError> {
        let curve = Self::unchecked(name, p1, p2);
        curve.validate()?;
        Ok(curve)
    }

    /// Builds a curve without validating it.
    pub fn unchecked(name: &str, p1: (f64, f64), p2: (f64, f64)) -> Self {
        Self {
            name: name.to_string(),
            points: [
                Point::new(0.0, 0.0),
                Point::new(p1.0, p1.1),
                Point::new(p2.0, p2.1),
                Point::new(1.0, 1.0),
            ],
        }
    }

    /// Checks that all control points lie in the unit square and that both
    /// coordinates are non-decreasing along the control polygon. The second
    /// condition is sufficient for a cubic Bezier to be monotonic.
    pub fn validate(&self) -> Result<(), CurveError> {
        for p in &self.points {
            let in_range = (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y);
            if !in_range {
                return Err(CurveError::OutOfRange { x: p.x, y: p.y });
            }
        }
        let ordered = self
            .points
            .windows(2)
            .all(|pair| pair[0].x <= pair[1].x && pair[0].y <= pair[1].y);
        if ordered {
            Ok(())
        } else {
            Err(CurveError::NotMonotonic)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> [Point; 4] {
        self.points
    }
}

impl Default for AccelerationCurve {
    fn default() -> Self {
        Self::preset(CurvePreset::Linear)
    }
}
