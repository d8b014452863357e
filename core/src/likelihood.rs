//! Gaussian noise and likelihood model
//!
//! A single zero-mean Gaussian serves two purposes in the filter. It perturbs quantities when
//! synthesizing motion and sensor noise, and its probability density scores how well a
//! particle's predicted sensor value explains the observed one.
//!
//! The density is
//!
//! $$
//! p(z \mid \hat{z}) = \frac{1}{\sigma \sqrt{2\pi}} \exp\left( -\frac{(z - \hat{z})^2}{2\sigma^2} \right)
//! $$
//!
//! which is a relative likelihood and may exceed one for small $\sigma$.

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{LocalizationError, Result};

/// `sigma` must be a positive normal float; a subnormal sigma would overflow the peak density.
fn check_sigma(sigma: f64) -> Result<()> {
    if sigma.is_normal() && sigma > 0.0 {
        Ok(())
    } else {
        Err(LocalizationError::InvalidArgument(format!(
            "noise standard deviation must be positive, finite and normal, got {sigma}"
        )))
    }
}

/// Residual between observation and prediction. Identical values (including two infinite
/// distances) match exactly; a residual that is not finite cannot be explained by any noise.
fn residual(observed: f64, predicted: f64) -> Option<f64> {
    if observed == predicted {
        return Some(0.0);
    }
    let r = observed - predicted;
    r.is_finite().then_some(r)
}

/// Gaussian probability density of `observed` given a true value of `predicted`.
///
/// # Arguments
/// * `observed` - The measured value (the cycle's sensor reading).
/// * `predicted` - The value the hypothesis expects to measure.
/// * `sigma` - Standard deviation of the zero-mean measurement noise, must be positive.
///
/// # Example
/// ```rust
/// use mcl::likelihood::gaussian_probability;
///
/// let peak = gaussian_probability(3.0, 3.0, 1.0).unwrap();
/// assert!((peak - 1.0 / (2.0 * std::f64::consts::PI).sqrt()).abs() < 1e-15);
/// assert!(gaussian_probability(3.0, 3.0, 0.0).is_err());
/// ```
pub fn gaussian_probability(observed: f64, predicted: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    let density = match residual(observed, predicted) {
        Some(r) => {
            let exponent = -0.5 * (r / sigma).powi(2);
            (1.0 / (sigma * (2.0 * PI).sqrt())) * exponent.exp()
        }
        None => 0.0,
    };
    Ok(density)
}

/// Natural log of [`gaussian_probability`]. Returns `f64::NEG_INFINITY` where the density is zero.
pub fn gaussian_log_probability(observed: f64, predicted: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    let log_density = match residual(observed, predicted) {
        Some(r) => -0.5 * (r / sigma).powi(2) - sigma.ln() - 0.5 * (2.0 * PI).ln(),
        None => f64::NEG_INFINITY,
    };
    Ok(log_density)
}

/// Zero-mean Gaussian noise source with a validated standard deviation.
///
/// A standard deviation of zero is allowed and produces exactly `0.0` without drawing from the
/// random source, which keeps noise-free runs bit-for-bit deterministic.
#[derive(Clone, Copy, Debug)]
pub struct GaussianNoise {
    normal: Option<Normal<f64>>,
}

impl GaussianNoise {
    pub fn new(std_dev: f64) -> Result<Self> {
        if !(std_dev.is_finite() && std_dev >= 0.0) {
            return Err(LocalizationError::InvalidArgument(format!(
                "noise standard deviation must be non-negative and finite, got {std_dev}"
            )));
        }
        let normal = if std_dev > 0.0 {
            Some(
                Normal::new(0.0, std_dev)
                    .map_err(|e| LocalizationError::InvalidArgument(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(GaussianNoise { normal })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match &self.normal {
            Some(normal) => normal.sample(rng),
            None => 0.0,
        }
    }
}
