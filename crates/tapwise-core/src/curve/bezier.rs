//! Cubic Bezier evaluation and inversion.

use tracing::trace;

use super::AccelerationCurve;

/// Newton-Raphson iteration cap for [`solve_for_x`].
pub const MAX_NEWTON_ITERATIONS: usize = 8;

/// Residual below which the solver stops iterating.
pub const SOLVER_TOLERANCE: f64 = 1e-6;

/// Below this slope a Newton step is considered degenerate.
const DERIVATIVE_EPSILON: f64 = 1e-6;

/// Iteration cap for the bisection fallback.
const MAX_BISECTION_ITERATIONS: usize = 32;

#[inline]
fn cubic(a: f64, b: f64, c: f64, d: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    mt * mt * mt * a + 3.0 * mt * mt * t * b + 3.0 * mt * t * t * c + t * t * t * d
}

#[inline]
fn cubic_derivative(a: f64, b: f64, c: f64, d: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * (b - a) + 6.0 * mt * t * (c - b) + 3.0 * t * t * (d - c)
}

/// Y coordinate at parameter `t`, clamped to `[0, 1]`.
pub fn evaluate(curve: &AccelerationCurve, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    let [p0, p1, p2, p3] = curve.points();
    cubic(p0.y, p1.y, p2.y, p3.y, t).clamp(0.0, 1.0)
}

/// X coordinate at parameter `t`.
pub fn evaluate_x(curve: &AccelerationCurve, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    let [p0, p1, p2, p3] = curve.points();
    cubic(p0.x, p1.x, p2.x, p3.x, t)
}

fn derivative_x(curve: &AccelerationCurve, t: f64) -> f64 {
    let [p0, p1, p2, p3] = curve.points();
    cubic_derivative(p0.x, p1.x, p2.x, p3.x, t)
}

/// Finds the parameter `t` whose X coordinate equals `x`.
///
/// Runs at most [`MAX_NEWTON_ITERATIONS`] Newton steps from `t = x`. A flat
/// slope ends Newton early. If the residual is still above
/// [`SOLVER_TOLERANCE`], a bounded bisection refines the estimate and the
/// better of the two candidates is returned. The result is always in `[0, 1]`.
pub fn solve_for_x(curve: &AccelerationCurve, x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    let residual = |t: f64| (evaluate_x(curve, t) - x).abs();

    let mut t = x;
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let err = evaluate_x(curve, t) - x;
        if err.abs() < SOLVER_TOLERANCE {
            return t;
        }
        let slope = derivative_x(curve, t);
        if slope.abs() < DERIVATIVE_EPSILON {
            trace!(curve = %curve.name(), t, "flat slope, leaving Newton early");
            break;
        }
        t = (t - err / slope).clamp(0.0, 1.0);
    }

    if residual(t) < SOLVER_TOLERANCE {
        return t;
    }

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    let mut best = t;
    for _ in 0..MAX_BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let value = evaluate_x(curve, mid);
        if (value - x).abs() < residual(best) {
            best = mid;
        }
        if (value - x).abs() < SOLVER_TOLERANCE {
            break;
        }
        if value < x {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    best
}

/// Maps a normalized velocity through the curve: `evaluate(solve_for_x(v))`.
pub fn accelerate(curve: &AccelerationCurve, normalized_velocity: f64) -> f64 {
    evaluate(curve, solve_for_x(curve, normalized_velocity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurvePreset;

    #[test]
    fn test_evaluate_linear_is_identity() {
        let curve = AccelerationCurve::preset(CurvePreset::Linear);
        for i in 0..=10 {
            let t = f64::from(i) / 10.0;
            assert!((evaluate(&curve, t) - t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_evaluate_clamps_out_of_range_control_points() {
        // An unvalidated curve whose Y overshoots 1 mid-way.
        let curve = AccelerationCurve::unchecked("wild", (0.3, 1.8), (0.6, 1.8));
        assert!(evaluate(&curve, 0.5) <= 1.0);
    }

    #[test]
    fn test_solve_for_x_endpoints() {
        let curve = AccelerationCurve::preset(CurvePreset::Precision);
        assert_eq!(solve_for_x(&curve, 0.0), 0.0);
        assert!((evaluate_x(&curve, solve_for_x(&curve, 1.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_solve_for_x_survives_flat_slope() {
        // x'(t) is zero at both ends when p1.x = 0 and p2.x = 1.
        let curve = AccelerationCurve::unchecked("flat-ends", (0.0, 0.0), (1.0, 1.0));
        for x in [0.001, 0.01, 0.5, 0.99, 0.999] {
            let t = solve_for_x(&curve, x);
            assert!((evaluate_x(&curve, t) - x).abs() < 1e-3, "x = {x}");
        }
    }

    #[test]
    fn test_solve_for_x_clamps_input() {
        let curve = AccelerationCurve::preset(CurvePreset::Linear);
        assert_eq!(solve_for_x(&curve, -0.5), 0.0);
        assert!((solve_for_x(&curve, 1.5) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_accelerate_linear_half_is_half() {
        // Arrange
        let curve = AccelerationCurve::preset(CurvePreset::Linear);

        // Act
        let out = accelerate(&curve, 0.5);

        // Assert
        assert!((out - 0.5).abs() < 1e-3);
    }
}
