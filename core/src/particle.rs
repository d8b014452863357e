//! Particle population for Monte Carlo Localization
//!
//! The robot's belief about its position is a population of `N` weighted hypotheses
//! ("particles"). Each cycle the whole population is moved by the commanded displacement plus
//! independent Gaussian noise, reweighted against the cycle's sensor reading and resampled with
//! replacement in proportion to the weights (bootstrap / sequential importance resampling).
//!
//! The operations are exposed both as free functions over plain slices, which keeps each step
//! a pure function that returns new collections, and as methods on [`ParticlePopulation`]. All
//! stochastic operations take an explicit random source so runs can be replayed from a seed.
//!
//! Invariants maintained here:
//! - every position lies inside the environment bounds `[0, width] x [0, height]`;
//! - every weight is finite and non-negative;
//! - after resampling every weight is exactly `1.0`.

use std::fmt::{self, Debug};

use nalgebra::Vector2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LocalizationError, Result};
use crate::geometry::{Bounds, Obstacle};
use crate::likelihood::{GaussianNoise, gaussian_probability};
use crate::sensor::predicted_distance;

/// Default standard deviation of the per-particle motion noise.
pub const DEFAULT_MOTION_NOISE_STD: f64 = 0.5;
/// Default scale applied to a movement command.
pub const DEFAULT_MOVE_SPEED: f64 = 1.0;

/// A commanded displacement per cycle, before scaling by the move speed.
///
/// Keyboard-style commands use components in `{-1, 0, 1}`, but any finite value is accepted.
/// The `y` axis grows downward, so [`MoveCommand::UP`] has `dy = -1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveCommand {
    pub dx: f64,
    pub dy: f64,
}

impl MoveCommand {
    pub const STAY: MoveCommand = MoveCommand { dx: 0.0, dy: 0.0 };
    pub const LEFT: MoveCommand = MoveCommand { dx: -1.0, dy: 0.0 };
    pub const RIGHT: MoveCommand = MoveCommand { dx: 1.0, dy: 0.0 };
    pub const UP: MoveCommand = MoveCommand { dx: 0.0, dy: -1.0 };
    pub const DOWN: MoveCommand = MoveCommand { dx: 0.0, dy: 1.0 };

    pub fn new(dx: f64, dy: f64) -> Self {
        MoveCommand { dx, dy }
    }

    /// Displacement applied to every particle for the given speed.
    pub fn displacement(&self, speed: f64) -> Vector2<f64> {
        Vector2::new(self.dx, self.dy) * speed
    }

    /// True for a command that does not move the robot; such a command can never collide.
    pub fn is_stationary(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

/// Resampling scheme used to redraw the population.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ParticleResamplingStrategy {
    /// Independent draws with replacement, index `i` with probability `w_i / sum(w)`.
    #[default]
    Multinomial,
    /// One uniform offset and `N` evenly spaced pointers into the cumulative weights.
    Systematic,
}

impl ParticleResamplingStrategy {
    /// Draw `weights.len()` indices according to the strategy.
    pub fn draw_indices<R: Rng + ?Sized>(&self, weights: &[f64], rng: &mut R) -> Result<Vec<usize>> {
        match self {
            ParticleResamplingStrategy::Multinomial => multinomial_resample(weights, rng),
            ParticleResamplingStrategy::Systematic => systematic_resample(weights, rng),
        }
    }
}

/// Sum of the weights. Negative or non-finite entries are `InvalidArgument`; a sum that is not a
/// finite positive number is `DegenerateState`.
pub(crate) fn usable_total_weight(weights: &[f64]) -> Result<f64> {
    check_weights(weights)?;
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        Ok(total)
    } else {
        Err(LocalizationError::DegenerateState(format!(
            "weights of {} particles sum to {total}",
            weights.len()
        )))
    }
}

pub(crate) fn check_lengths(positions: &[Vector2<f64>], weights: &[f64]) -> Result<()> {
    if positions.len() != weights.len() {
        return Err(LocalizationError::InvalidArgument(format!(
            "{} positions but {} weights",
            positions.len(),
            weights.len()
        )));
    }
    Ok(())
}

fn check_weights(weights: &[f64]) -> Result<()> {
    match weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
        Some(w) => Err(LocalizationError::InvalidArgument(format!(
            "weights must be finite and non-negative, found {w}"
        ))),
        None => Ok(()),
    }
}

fn cumulative_weights(weights: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .scan(0.0, |acc, &w| {
            *acc += w;
            Some(*acc)
        })
        .collect()
}

/// First index whose cumulative weight exceeds `u`. A zero-weight index never satisfies this
/// before its predecessor does, so it can never be returned. Rounding at the top end falls back
/// to the last index carrying weight.
fn select_index(cumulative: &[f64], u: f64, last_positive: usize) -> usize {
    cumulative.partition_point(|&c| c <= u).min(last_positive)
}

fn last_positive_index(weights: &[f64]) -> usize {
    weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
}

/// Multinomial ("roulette wheel") resampling by inverse-CDF lookup.
///
/// Builds the cumulative weight array once and binary-searches it for each of the `N`
/// independent uniform draws, `O(N log N)` overall.
pub fn multinomial_resample<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<Vec<usize>> {
    let total = usable_total_weight(weights)?;
    let cumulative = cumulative_weights(weights);
    let last = last_positive_index(weights);
    Ok((0..weights.len())
        .map(|_| select_index(&cumulative, rng.random::<f64>() * total, last))
        .collect())
}

/// Systematic resampling: a single uniform offset in `[0, total / N)` followed by `N` pointers
/// spaced `total / N` apart. Lower variance than multinomial resampling.
pub fn systematic_resample<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<Vec<usize>> {
    let total = usable_total_weight(weights)?;
    let n = weights.len();
    let step = total / n as f64;
    let offset = rng.random::<f64>() * step;
    let cumulative = cumulative_weights(weights);
    let last = last_positive_index(weights);
    Ok((0..n)
        .map(|j| select_index(&cumulative, offset + j as f64 * step, last))
        .collect())
}

/// Draw `particle_count` positions uniformly from the bounds, all with weight `1.0`.
///
/// # Arguments
/// * `particle_count` - Number of particles, must be positive.
/// * `bounds` - Environment bounding rectangle.
/// * `rng` - Random source.
///
/// # Example
/// ```rust
/// use mcl::geometry::Bounds;
/// use mcl::particle::initialize;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let bounds = Bounds::new(400.0, 300.0).unwrap();
/// let population = initialize(100, &bounds, &mut rng).unwrap();
/// assert_eq!(population.len(), 100);
/// assert!(population.positions().iter().all(|p| bounds.contains(p)));
/// assert!(population.weights().iter().all(|&w| w == 1.0));
/// ```
pub fn initialize<R: Rng + ?Sized>(
    particle_count: usize,
    bounds: &Bounds,
    rng: &mut R,
) -> Result<ParticlePopulation> {
    if particle_count == 0 {
        return Err(LocalizationError::InvalidArgument(
            "particle count must be positive".to_string(),
        ));
    }
    bounds.validate()?;
    let positions = (0..particle_count)
        .map(|_| {
            Vector2::new(
                rng.random_range(0.0..=bounds.width),
                rng.random_range(0.0..=bounds.height),
            )
        })
        .collect();
    Ok(ParticlePopulation {
        positions,
        weights: vec![1.0; particle_count],
    })
}

/// Move every particle by `command * speed` plus independent 2D Gaussian noise, then clip the
/// result into the bounds.
///
/// All particles share the commanded displacement (there is one physical robot) but each
/// accumulates its own noise. With `noise_std == 0` the update is deterministic.
pub fn move_particles<R: Rng + ?Sized>(
    positions: &[Vector2<f64>],
    command: &MoveCommand,
    bounds: &Bounds,
    noise_std: f64,
    speed: f64,
    rng: &mut R,
) -> Result<Vec<Vector2<f64>>> {
    if !(command.dx.is_finite() && command.dy.is_finite() && speed.is_finite()) {
        return Err(LocalizationError::InvalidArgument(format!(
            "movement command ({}, {}) and speed {speed} must be finite",
            command.dx, command.dy
        )));
    }
    let noise = GaussianNoise::new(noise_std)?;
    let displacement = command.displacement(speed);
    Ok(positions
        .iter()
        .map(|position| {
            let jitter = Vector2::new(noise.sample(rng), noise.sample(rng));
            bounds.clamp(&(position + displacement + jitter))
        })
        .collect())
}

/// Multiply each weight by the likelihood of `reading` given that particle's predicted
/// distance to the nearest obstacle. Returns a new weight vector.
///
/// If every likelihood underflows the result is all zeros; it is up to the caller to detect
/// that before estimating or resampling.
pub fn reweight(
    positions: &[Vector2<f64>],
    weights: &[f64],
    reading: f64,
    sensor_noise_std: f64,
    obstacles: &[Obstacle],
) -> Result<Vec<f64>> {
    check_lengths(positions, weights)?;
    check_weights(weights)?;
    positions
        .iter()
        .zip(weights)
        .map(|(position, weight)| {
            let predicted = predicted_distance(position, obstacles);
            let likelihood = gaussian_probability(reading, predicted, sensor_noise_std)?;
            Ok(weight * likelihood)
        })
        .collect()
}

/// Redraw the population with replacement in proportion to the weights and reset every weight
/// to `1.0`. Fails with `DegenerateState` when the weights sum to zero.
pub fn resample<R: Rng + ?Sized>(
    positions: &[Vector2<f64>],
    weights: &[f64],
    strategy: ParticleResamplingStrategy,
    rng: &mut R,
) -> Result<(Vec<Vector2<f64>>, Vec<f64>)> {
    check_lengths(positions, weights)?;
    let indices = strategy.draw_indices(weights, rng)?;
    let new_positions = indices.iter().map(|&i| positions[i]).collect();
    Ok((new_positions, vec![1.0; positions.len()]))
}

/// A fixed-size population of positions with a parallel weight vector.
#[derive(Clone, PartialEq)]
pub struct ParticlePopulation {
    positions: Vec<Vector2<f64>>,
    weights: Vec<f64>,
}

impl ParticlePopulation {
    /// Build a population from existing positions and weights.
    pub fn new(positions: Vec<Vector2<f64>>, weights: Vec<f64>) -> Result<Self> {
        if positions.is_empty() {
            return Err(LocalizationError::InvalidArgument(
                "particle count must be positive".to_string(),
            ));
        }
        check_lengths(&positions, &weights)?;
        check_weights(&weights)?;
        Ok(ParticlePopulation { positions, weights })
    }

    /// Build a population with uniform weights of `1.0`.
    pub fn with_uniform_weights(positions: Vec<Vector2<f64>>) -> Result<Self> {
        let n = positions.len();
        Self::new(positions, vec![1.0; n])
    }

    pub fn positions(&self) -> &[Vector2<f64>] {
        &self.positions
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Vector2<f64>>, Vec<f64>) {
        (self.positions, self.weights)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Replace the weights, keeping the positions.
    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<()> {
        check_lengths(&self.positions, &weights)?;
        check_weights(&weights)?;
        self.weights = weights;
        Ok(())
    }

    /// Reset every weight to `1.0`.
    pub fn reset_weights(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = 1.0);
    }

    /// Weights scaled to sum to one, or uniform `1/N` when the population is degenerate.
    pub fn normalized_weights(&self) -> Vec<f64> {
        match usable_total_weight(&self.weights) {
            Ok(total) => self.weights.iter().map(|w| w / total).collect(),
            Err(_) => vec![1.0 / self.len() as f64; self.len()],
        }
    }

    /// Effective sample size `(sum w)^2 / sum w^2`; `N` for uniform weights, `0` if degenerate.
    ///
    /// Evaluated on normalized weights so very large likelihoods do not overflow the squares.
    pub fn effective_sample_size(&self) -> f64 {
        match usable_total_weight(&self.weights) {
            Ok(total) => {
                let sum_of_squares: f64 = self.weights.iter().map(|w| (w / total).powi(2)).sum();
                1.0 / sum_of_squares
            }
            Err(_) => 0.0,
        }
    }

    /// Apply [`move_particles`] in place.
    pub fn apply_motion<R: Rng + ?Sized>(
        &mut self,
        command: &MoveCommand,
        bounds: &Bounds,
        noise_std: f64,
        speed: f64,
        rng: &mut R,
    ) -> Result<()> {
        self.positions = move_particles(&self.positions, command, bounds, noise_std, speed, rng)?;
        Ok(())
    }

    /// Apply [`reweight`] in place.
    pub fn apply_reading(
        &mut self,
        reading: f64,
        sensor_noise_std: f64,
        obstacles: &[Obstacle],
    ) -> Result<()> {
        let weights = reweight(
            &self.positions,
            &self.weights,
            reading,
            sensor_noise_std,
            obstacles,
        )?;
        self.set_weights(weights)
    }

    /// Apply [`resample`] in place. On failure the population is left untouched.
    pub fn resample<R: Rng + ?Sized>(
        &mut self,
        strategy: ParticleResamplingStrategy,
        rng: &mut R,
    ) -> Result<()> {
        let (positions, weights) = resample(&self.positions, &self.weights, strategy, rng)?;
        self.positions = positions;
        self.weights = weights;
        Ok(())
    }
}

impl Debug for ParticlePopulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self.weights.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_weight = self.weights.iter().cloned().fold(0.0, f64::max);
        let mean = crate::estimate::estimate(&self.positions, &self.weights).ok();
        let mut s = f.debug_struct("ParticlePopulation");
        s.field("num_particles", &self.len())
            .field("total_weight", &self.total_weight())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            );
        match mean {
            Some(mean) => s.field(
                "mean_position",
                &format_args!("({:.3}, {:.3})", mean.x, mean.y),
            ),
            None => s.field("mean_position", &"degenerate"),
        };
        s.finish()
    }
}
