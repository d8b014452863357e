//! Range sensor model
//!
//! The filter works with a single scalar range reading per cycle: the distance to the nearest
//! obstacle. There is no ground-truth robot in the simulation, so the reading is synthesized
//! from the population itself. Every particle's nearest-obstacle distance is perturbed with
//! independent Gaussian noise and the median of those perturbed distances becomes the cycle's
//! reading. Particles whose own (noise-free) predicted distance agrees with that median gain
//! weight during [`crate::particle::reweight`].
//!
//! The median is robust to the long tail of particles far from any obstacle, which keeps a
//! handful of outliers from dragging the reading.

use nalgebra::Vector2;
use rand::Rng;

use crate::error::{LocalizationError, Result};
use crate::geometry::{Obstacle, distance_to_nearest_obstacle};
use crate::likelihood::GaussianNoise;

/// Default standard deviation of the range sensor noise.
pub const DEFAULT_SENSOR_NOISE_STD: f64 = 1.0;

/// Noise-free distance from `position` to the nearest obstacle; the value a particle at that
/// position expects the sensor to report. Infinite when there are no obstacles.
pub fn predicted_distance(position: &Vector2<f64>, obstacles: &[Obstacle]) -> f64 {
    distance_to_nearest_obstacle(position, obstacles)
}

/// Median of a non-empty sample; the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Synthesize the cycle's range reading from the population.
///
/// # Arguments
/// * `positions` - Current particle positions, must be non-empty.
/// * `obstacles` - Static obstacle layout.
/// * `sensor_noise_std` - Standard deviation of the per-particle range noise, must be positive.
/// * `rng` - Random source.
///
/// # Returns
/// The median of the noisy nearest-obstacle distances. Infinite when there are no obstacles.
pub fn synthesize_reading<R: Rng + ?Sized>(
    positions: &[Vector2<f64>],
    obstacles: &[Obstacle],
    sensor_noise_std: f64,
    rng: &mut R,
) -> Result<f64> {
    if !(sensor_noise_std.is_normal() && sensor_noise_std > 0.0) {
        return Err(LocalizationError::InvalidArgument(format!(
            "sensor noise standard deviation must be positive, got {sensor_noise_std}"
        )));
    }
    let noise = GaussianNoise::new(sensor_noise_std)?;
    let noisy: Vec<f64> = positions
        .iter()
        .map(|position| predicted_distance(position, obstacles) + noise.sample(rng))
        .collect();
    median(&noisy).ok_or_else(|| {
        LocalizationError::InvalidArgument("cannot synthesize a reading from zero particles".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0]), Some(3.0));
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[f64::INFINITY, f64::INFINITY]), Some(f64::INFINITY));
    }

    #[test]
    fn test_predicted_distance() {
        let obstacles = vec![
            Obstacle::new(0.0, 0.0, 10.0, 10.0).unwrap(),
            Obstacle::new(30.0, 0.0, 40.0, 10.0).unwrap(),
        ];
        assert_eq!(predicted_distance(&Vector2::new(25.0, 5.0), &obstacles), 5.0);
        assert_eq!(predicted_distance(&Vector2::new(5.0, 5.0), &obstacles), 0.0);
        assert!(predicted_distance(&Vector2::new(5.0, 5.0), &[]).is_infinite());
    }

    #[test]
    fn test_reading_is_near_median_distance() {
        let obstacles = vec![Obstacle::new(0.0, 0.0, 10.0, 100.0).unwrap()];
        // Distances 10, 20, 30, 40, 50 -> median 30
        let positions: Vec<_> = (2..=6)
            .map(|i| Vector2::new(10.0 * i as f64, 50.0))
            .collect();
        let mut rng = StdRng::seed_from_u64(42);
        let reading = synthesize_reading(&positions, &obstacles, 0.1, &mut rng).unwrap();
        assert!((reading - 30.0).abs() < 0.5, "reading = {reading}");
    }

    #[test]
    fn test_reading_is_reproducible() {
        let obstacles = vec![Obstacle::new(0.0, 0.0, 10.0, 10.0).unwrap()];
        let positions = vec![Vector2::new(20.0, 20.0), Vector2::new(15.0, 5.0)];
        let a = synthesize_reading(&positions, &obstacles, 1.0, &mut StdRng::seed_from_u64(1));
        let b = synthesize_reading(&positions, &obstacles, 1.0, &mut StdRng::seed_from_u64(1));
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn test_reading_without_obstacles_is_infinite() {
        let positions = vec![Vector2::new(1.0, 1.0); 3];
        let mut rng = StdRng::seed_from_u64(42);
        let reading = synthesize_reading(&positions, &[], 1.0, &mut rng).unwrap();
        assert!(reading.is_infinite());
    }

    #[test]
    fn test_reading_rejects_bad_input() {
        let mut rng = StdRng::seed_from_u64(42);
        let positions = vec![Vector2::new(1.0, 1.0)];
        assert!(matches!(
            synthesize_reading(&positions, &[], 0.0, &mut rng),
            Err(LocalizationError::InvalidArgument(_))
        ));
        assert!(synthesize_reading(&[], &[], 1.0, &mut rng).is_err());
    }
}
