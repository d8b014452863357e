//! Point estimate of the robot position from a weighted particle population.

use nalgebra::{Matrix2, Vector2};

use crate::error::Result;
use crate::particle::{check_lengths, usable_total_weight};

/// Weighted mean of the particle positions.
///
/// $$
/// \bar{x} = \frac{\sum_i w_i x_i}{\sum_i w_i}, \quad \bar{y} = \frac{\sum_i w_i y_i}{\sum_i w_i}
/// $$
///
/// Fails with `DegenerateState` when the weights sum to zero rather than returning `NaN`.
///
/// # Example
/// ```rust
/// use mcl::estimate::estimate;
/// use nalgebra::Vector2;
///
/// let positions = [Vector2::new(0.0, 0.0), Vector2::new(10.0, 0.0), Vector2::new(20.0, 0.0)];
/// assert_eq!(estimate(&positions, &[1.0, 0.0, 0.0]).unwrap(), Vector2::new(0.0, 0.0));
/// assert!(estimate(&positions, &[0.0, 0.0, 0.0]).is_err());
/// ```
pub fn estimate(positions: &[Vector2<f64>], weights: &[f64]) -> Result<Vector2<f64>> {
    check_lengths(positions, weights)?;
    let total = usable_total_weight(weights)?;
    let x = positions
        .iter()
        .zip(weights)
        .map(|(p, w)| p.x * w)
        .sum::<f64>()
        / total;
    let y = positions
        .iter()
        .zip(weights)
        .map(|(p, w)| p.y * w)
        .sum::<f64>()
        / total;
    Ok(Vector2::new(x, y))
}

/// Weighted covariance of the particle positions about their weighted mean.
pub fn weighted_covariance(positions: &[Vector2<f64>], weights: &[f64]) -> Result<Matrix2<f64>> {
    let mean = estimate(positions, weights)?;
    let total = usable_total_weight(weights)?;
    let mut cov = Matrix2::<f64>::zeros();
    for (p, w) in positions.iter().zip(weights) {
        let diff = p - mean;
        cov += (w / total) * diff * diff.transpose();
    }
    Ok(cov)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocalizationError;
    use assert_approx_eq::assert_approx_eq;

    fn line() -> Vec<Vector2<f64>> {
        vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(10.0, 0.0),
            Vector2::new(20.0, 0.0),
        ]
    }

    #[test]
    fn test_zero_weight_particles_contribute_nothing() {
        assert_eq!(
            estimate(&line(), &[1.0, 0.0, 0.0]).unwrap(),
            Vector2::new(0.0, 0.0)
        );
    }

    #[test]
    fn test_weighted_mean() {
        let mean = estimate(&line(), &[1.0, 1.0, 2.0]).unwrap();
        assert_approx_eq!(mean.x, 12.5, 1e-12);
        assert_approx_eq!(mean.y, 0.0, 1e-12);
    }

    #[test]
    fn test_mean_is_scale_invariant() {
        let a = estimate(&line(), &[1.0, 2.0, 3.0]).unwrap();
        let b = estimate(&line(), &[0.1, 0.2, 0.3]).unwrap();
        assert_approx_eq!(a.x, b.x, 1e-12);
    }

    #[test]
    fn test_mean_inside_bounding_box() {
        let positions = vec![
            Vector2::new(3.0, 7.0),
            Vector2::new(8.0, 1.0),
            Vector2::new(5.0, 9.0),
            Vector2::new(4.0, 2.0),
        ];
        let mean = estimate(&positions, &[0.3, 5.0, 0.01, 2.0]).unwrap();
        assert!((3.0..=8.0).contains(&mean.x));
        assert!((1.0..=9.0).contains(&mean.y));
    }

    #[test]
    fn test_degenerate_weights() {
        assert!(matches!(
            estimate(&line(), &[0.0, 0.0, 0.0]),
            Err(LocalizationError::DegenerateState(_))
        ));
        assert!(matches!(
            estimate(&[], &[]),
            Err(LocalizationError::DegenerateState(_))
        ));
        assert!(matches!(
            estimate(&line(), &[1.0]),
            Err(LocalizationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_negative_weights_are_rejected() {
        // A negative weight would pull the mean outside the convex hull
        let positions = [Vector2::new(0.0, 0.0), Vector2::new(10.0, 0.0)];
        assert!(matches!(
            estimate(&positions, &[-1.0, 2.0]),
            Err(LocalizationError::InvalidArgument(_))
        ));
        assert!(weighted_covariance(&positions, &[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_weighted_covariance() {
        let cov = weighted_covariance(&line(), &[1.0, 1.0, 1.0]).unwrap();
        // Population variance of {0, 10, 20}
        assert_approx_eq!(cov[(0, 0)], 200.0 / 3.0, 1e-9);
        assert_approx_eq!(cov[(1, 1)], 0.0, 1e-12);
        assert_approx_eq!(cov[(0, 1)], 0.0, 1e-12);

        let single = weighted_covariance(&line(), &[0.0, 4.0, 0.0]).unwrap();
        assert_eq!(single, Matrix2::zeros());
    }
}
