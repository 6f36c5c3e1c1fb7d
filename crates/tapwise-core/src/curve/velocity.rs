//! Raw-delta scaling through an acceleration curve.

use super::{bezier, AccelerationCurve};

/// Below this speed (pixels per event) the curve is bypassed.
pub const DEFAULT_MIN_VELOCITY: f64 = 0.5;

/// Speed (pixels per event) that maps to normalized velocity 1.0.
pub const DEFAULT_MAX_VELOCITY: f64 = 60.0;

/// Applies an [`AccelerationCurve`] to raw pointer deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityMapper {
    curve: AccelerationCurve,
    min_velocity: f64,
    max_velocity: f64,
}

impl VelocityMapper {
    /// Non-positive `max_velocity` is replaced by the default to keep the
    /// normalization well defined.
    pub fn new(curve: AccelerationCurve, min_velocity: f64, max_velocity: f64) -> Self {
        let max_velocity = if max_velocity > 0.0 {
            max_velocity
        } else {
            DEFAULT_MAX_VELOCITY
        };
        Self {
            curve,
            min_velocity: min_velocity.max(0.0),
            max_velocity,
        }
    }

    pub fn curve(&self) -> &AccelerationCurve {
        &self.curve
    }

    pub fn min_velocity(&self) -> f64 {
        self.min_velocity
    }

    pub fn max_velocity(&self) -> f64 {
        self.max_velocity
    }

    /// Multiplier for a movement of speed `raw_velocity`, or `None` when the
    /// movement is too slow to accelerate.
    ///
    /// `multiplier = accelerate(min(raw / max, 1)) * max / raw`.
    pub fn multiplier(&self, raw_velocity: f64) -> Option<f64> {
        if raw_velocity <= 0.0 || raw_velocity < self.min_velocity || !raw_velocity.is_finite() {
            return None;
        }
        let normalized = (raw_velocity / self.max_velocity).min(1.0);
        let output = bezier::accelerate(&self.curve, normalized);
        Some(output * self.max_velocity / raw_velocity)
    }

    /// Scales a `(dx, dy)` delta pair, or `None` to leave it untouched.
    pub fn scale(&self, dx: f64, dy: f64) -> Option<(f64, f64)> {
        let factor = self.multiplier(dx.hypot(dy))?;
        Some((dx * factor, dy * factor))
    }
}

impl Default for VelocityMapper {
    fn default() -> Self {
        Self::new(AccelerationCurve::default(), DEFAULT_MIN_VELOCITY, DEFAULT_MAX_VELOCITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurvePreset;

    #[test]
    fn test_multiplier_none_below_threshold() {
        let mapper = VelocityMapper::new(AccelerationCurve::preset(CurvePreset::Gaming), 1.0, 60.0);
        assert_eq!(mapper.multiplier(0.4), None);
    }

    #[test]
    fn test_multiplier_none_for_zero_velocity_even_without_threshold() {
        let mapper = VelocityMapper::new(AccelerationCurve::default(), 0.0, 60.0);
        assert_eq!(mapper.multiplier(0.0), None);
        assert_eq!(mapper.scale(0.0, 0.0), None);
    }

    #[test]
    fn test_linear_curve_multiplier_is_one() {
        let mapper = VelocityMapper::new(AccelerationCurve::preset(CurvePreset::Linear), 0.5, 60.0);
        let factor = mapper.multiplier(12.0).expect("above threshold");
        assert!((factor - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_precision_curve_slows_medium_movement() {
        // Arrange
        let mapper = VelocityMapper::new(AccelerationCurve::preset(CurvePreset::Precision), 0.5, 60.0);

        // Act
        let (dx, dy) = mapper.scale(6.0, 8.0).expect("above threshold");

        // Assert: speed 10 is well inside the slow part of the curve
        assert!(dx.hypot(dy) < 10.0);
        assert!((dy / dx - 8.0 / 6.0).abs() < 1e-9, "direction must be preserved");
    }

    #[test]
    fn test_velocity_above_max_is_capped() {
        let mapper = VelocityMapper::new(AccelerationCurve::preset(CurvePreset::Gaming), 0.5, 60.0);
        let (dx, dy) = mapper.scale(120.0, 0.0).expect("above threshold");
        assert!((dx - 60.0).abs() < 1e-3);
        assert_eq!(dy, 0.0);
    }

    #[test]
    fn test_non_positive_max_falls_back_to_default() {
        let mapper = VelocityMapper::new(AccelerationCurve::default(), 0.5, 0.0);
        assert_eq!(mapper.max_velocity(), DEFAULT_MAX_VELOCITY);
    }
}
