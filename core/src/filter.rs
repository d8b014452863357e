//! Monte Carlo Localization filter
//!
//! [`MonteCarloLocalizer`] owns the particle population, the static environment, the filter
//! configuration and a seeded random source, and runs one motion/measurement/resample cycle per
//! call to [`MonteCarloLocalizer::step`]:
//!
//! 1. move every particle by the accepted command plus motion noise;
//! 2. synthesize the cycle's range reading from the population;
//! 3. reweight every particle by the likelihood of that reading;
//! 4. guard against a degenerate (all-zero) weight vector;
//! 5. reduce the population to its weighted mean;
//! 6. resample with replacement and reset the weights to uniform.
//!
//! The filter is strictly sequential. Degeneracy is the only runtime condition it recovers from:
//! the weights are reset to uniform, a warning is logged and a counter is incremented.
//!
//! # Example
//!
//! ```rust
//! use mcl::config::FilterConfig;
//! use mcl::filter::MonteCarloLocalizer;
//! use mcl::geometry::Environment;
//! use mcl::particle::MoveCommand;
//!
//! let config = FilterConfig { num_particles: 200, ..FilterConfig::default() };
//! let mut localizer = MonteCarloLocalizer::new(Environment::default_layout(), config).unwrap();
//! let report = localizer.step(&MoveCommand::RIGHT).unwrap();
//! assert!(Environment::default_layout().bounds.contains(&report.estimate));
//! ```

use log::{Level, debug, log_enabled, warn};
use nalgebra::{Matrix2, Vector2};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::FilterConfig;
use crate::error::{LocalizationError, Result};
use crate::estimate::{estimate, weighted_covariance};
use crate::geometry::Environment;
use crate::likelihood::gaussian_log_probability;
use crate::particle::{MoveCommand, ParticlePopulation, initialize};
use crate::sensor::{predicted_distance, synthesize_reading};

/// Summary of one filter cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleReport {
    /// The synthesized range reading for this cycle
    pub reading: f64,
    /// Weighted mean position before resampling
    pub estimate: Vector2<f64>,
    /// Effective sample size of the reweighted population, before resampling
    pub effective_sample_size: f64,
    /// Whether the reweighted population had collapsed and was reset to uniform weights
    pub degenerate: bool,
}

pub struct MonteCarloLocalizer {
    population: ParticlePopulation,
    environment: Environment,
    config: FilterConfig,
    rng: StdRng,
    last_estimate: Vector2<f64>,
    cycles: usize,
    degeneracy_count: usize,
}

impl MonteCarloLocalizer {
    /// Create a new localizer with a uniformly initialized population.
    ///
    /// # Errors
    /// `InvalidArgument` if the configuration or environment is invalid.
    pub fn new(environment: Environment, config: FilterConfig) -> Result<Self> {
        config.validate()?;
        environment.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let population = initialize(config.num_particles, &environment.bounds, &mut rng)?;
        Self::from_population(population, environment, config, rng)
    }

    /// Create a localizer around an existing population, e.g. a known starting region.
    ///
    /// # Errors
    /// `InvalidArgument` if the configuration or environment is invalid, if the population size
    /// differs from `config.num_particles`, or if any particle lies outside the bounds.
    pub fn with_population(
        population: ParticlePopulation,
        environment: Environment,
        config: FilterConfig,
    ) -> Result<Self> {
        config.validate()?;
        environment.validate()?;
        if population.len() != config.num_particles {
            return Err(LocalizationError::InvalidArgument(format!(
                "population has {} particles but num_particles is {}",
                population.len(),
                config.num_particles
            )));
        }
        if let Some(p) = population
            .positions()
            .iter()
            .find(|p| !environment.bounds.contains(p))
        {
            return Err(LocalizationError::InvalidArgument(format!(
                "particle ({}, {}) lies outside the {} x {} bounds",
                p.x, p.y, environment.bounds.width, environment.bounds.height
            )));
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Self::from_population(population, environment, config, rng)
    }

    fn from_population(
        population: ParticlePopulation,
        environment: Environment,
        config: FilterConfig,
        rng: StdRng,
    ) -> Result<Self> {
        let last_estimate = estimate(population.positions(), &population.normalized_weights())?;
        Ok(MonteCarloLocalizer {
            population,
            environment,
            config,
            rng,
            last_estimate,
            cycles: 0,
            degeneracy_count: 0,
        })
    }

    /// Run one full motion/measurement/resample cycle with an already collision-checked command.
    ///
    /// # Errors
    /// Only `InvalidArgument`; degenerate weights are recovered from internally.
    pub fn step(&mut self, command: &MoveCommand) -> Result<CycleReport> {
        self.population.apply_motion(
            command,
            &self.environment.bounds,
            self.config.motion_noise_std,
            self.config.move_speed,
            &mut self.rng,
        )?;

        let reading = synthesize_reading(
            self.population.positions(),
            &self.environment.obstacles,
            self.config.sensor_noise_std,
            &mut self.rng,
        )?;

        self.population.apply_reading(
            reading,
            self.config.sensor_noise_std,
            &self.environment.obstacles,
        )?;

        if log_enabled!(Level::Debug) {
            debug!(
                "Cycle {}: reading {:.3}, peak log-likelihood {:.3}",
                self.cycles,
                reading,
                self.peak_log_likelihood(reading)?
            );
        }

        let (mean, degenerate) =
            match estimate(self.population.positions(), self.population.weights()) {
                Ok(mean) => (mean, false),
                Err(e) if e.is_recoverable() => {
                    self.degeneracy_count += 1;
                    warn!(
                        "Cycle {}: {e} (reading {:.3}, sensor std {}); resetting to uniform",
                        self.cycles, reading, self.config.sensor_noise_std
                    );
                    self.population.reset_weights();
                    let mean = estimate(self.population.positions(), self.population.weights())?;
                    (mean, true)
                }
                Err(e) => return Err(e),
            };
        let effective_sample_size = self.population.effective_sample_size();

        self.population
            .resample(self.config.resampling_strategy, &mut self.rng)?;

        self.last_estimate = mean;
        self.cycles += 1;
        debug!(
            "Cycle {}: command ({}, {}), estimate ({:.2}, {:.2}), N_eff {:.1}",
            self.cycles, command.dx, command.dy, mean.x, mean.y, effective_sample_size
        );
        Ok(CycleReport {
            reading,
            estimate: mean,
            effective_sample_size,
            degenerate,
        })
    }

    /// Largest per-particle log-likelihood of `reading`; `-inf` when no particle can explain it.
    pub fn peak_log_likelihood(&self, reading: f64) -> Result<f64> {
        self.population
            .positions()
            .iter()
            .try_fold(f64::NEG_INFINITY, |peak, position| {
                let predicted = predicted_distance(position, &self.environment.obstacles);
                let log_p =
                    gaussian_log_probability(reading, predicted, self.config.sensor_noise_std)?;
                Ok(peak.max(log_p))
            })
    }

    /// Most recent position estimate; the drive loop uses it for collision checks.
    pub fn last_estimate(&self) -> Vector2<f64> {
        self.last_estimate
    }

    /// Spread of the current population about its mean.
    pub fn covariance(&self) -> Result<Matrix2<f64>> {
        weighted_covariance(self.population.positions(), self.population.weights())
    }

    pub fn population(&self) -> &ParticlePopulation {
        &self.population
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Number of cycles in which the weights collapsed and were reset.
    pub fn degeneracy_count(&self) -> usize {
        self.degeneracy_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Bounds, Obstacle};
    use assert_approx_eq::assert_approx_eq;

    fn small_config() -> FilterConfig {
        FilterConfig {
            num_particles: 300,
            ..FilterConfig::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = FilterConfig {
            num_particles: 0,
            ..FilterConfig::default()
        };
        assert!(matches!(
            MonteCarloLocalizer::new(Environment::default_layout(), config),
            Err(LocalizationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_step_keeps_invariants() {
        let environment = Environment::default_layout();
        let mut localizer = MonteCarloLocalizer::new(environment.clone(), small_config()).unwrap();
        for command in [MoveCommand::RIGHT, MoveCommand::DOWN, MoveCommand::STAY] {
            let report = localizer.step(&command).unwrap();
            assert!(report.reading.is_finite());
            assert!(environment.bounds.contains(&report.estimate));
            assert!(report.effective_sample_size > 0.0);
            assert!(report.effective_sample_size <= 300.0 + 1e-9);
            let population = localizer.population();
            assert_eq!(population.len(), 300);
            assert!(population.weights().iter().all(|&w| w == 1.0));
            assert!(population
                .positions()
                .iter()
                .all(|p| environment.bounds.contains(p)));
        }
        assert_eq!(localizer.cycles(), 3);
    }

    #[test]
    fn test_with_population_rejects_size_mismatch() {
        let population =
            ParticlePopulation::with_uniform_weights(vec![Vector2::new(10.0, 10.0); 3]).unwrap();
        let result = MonteCarloLocalizer::with_population(
            population,
            Environment::default_layout(),
            FilterConfig::default(),
        );
        assert!(matches!(result, Err(LocalizationError::InvalidArgument(_))));
    }

    #[test]
    fn test_with_population_rejects_out_of_bounds_particles() {
        let population = ParticlePopulation::with_uniform_weights(vec![
            Vector2::new(1000.0, -50.0),
            Vector2::new(20.0, 20.0),
            Vector2::new(30.0, 30.0),
        ])
        .unwrap();
        let config = FilterConfig {
            num_particles: 3,
            ..FilterConfig::default()
        };
        let result =
            MonteCarloLocalizer::with_population(population, Environment::default_layout(), config);
        assert!(matches!(result, Err(LocalizationError::InvalidArgument(_))));
    }

    #[test]
    fn test_peak_log_likelihood() {
        let environment =
            Environment::new(Bounds::default(), vec![Obstacle::new(0.0, 0.0, 10.0, 10.0).unwrap()])
                .unwrap();
        // Nearest-obstacle distances 5 and 20
        let population = ParticlePopulation::with_uniform_weights(vec![
            Vector2::new(15.0, 5.0),
            Vector2::new(30.0, 5.0),
        ])
        .unwrap();
        let config = FilterConfig {
            num_particles: 2,
            ..FilterConfig::default()
        };
        let localizer =
            MonteCarloLocalizer::with_population(population, environment, config).unwrap();
        let peak = -0.5 * (2.0 * std::f64::consts::PI).ln();
        assert_approx_eq!(localizer.peak_log_likelihood(5.0).unwrap(), peak, 1e-12);
        assert_approx_eq!(localizer.peak_log_likelihood(6.0).unwrap(), peak - 0.5, 1e-12);
        assert_eq!(
            localizer.peak_log_likelihood(f64::INFINITY).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let run = || {
            let mut localizer =
                MonteCarloLocalizer::new(Environment::default_layout(), small_config()).unwrap();
            (0..5)
                .map(|_| localizer.step(&MoveCommand::LEFT).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_degenerate_weights_are_recovered() {
        // Tiny sensor noise relative to the spread of distances makes every density underflow
        // unless some particle matches the median reading to within a few micro-units.
        let environment =
            Environment::new(Bounds::default(), vec![Obstacle::new(0.0, 0.0, 1.0, 1.0).unwrap()])
                .unwrap();
        let population = ParticlePopulation::with_uniform_weights(vec![
            Vector2::new(100.0, 100.0),
            Vector2::new(300.0, 300.0),
        ])
        .unwrap();
        let config = FilterConfig {
            num_particles: 2,
            motion_noise_std: 0.0,
            sensor_noise_std: 1e-3,
            ..FilterConfig::default()
        };
        let mut localizer =
            MonteCarloLocalizer::with_population(population, environment, config).unwrap();
        let report = localizer.step(&MoveCommand::STAY).unwrap();
        assert!(report.degenerate);
        assert_eq!(localizer.degeneracy_count(), 1);
        // Uniform fallback puts the estimate at the midpoint
        assert!((report.estimate.x - 200.0).abs() < 1e-9);
        assert!((report.estimate.y - 200.0).abs() < 1e-9);
        assert_eq!(localizer.last_estimate(), report.estimate);
    }

    #[test]
    fn test_population_concentrates_on_matching_distances() {
        let environment = Environment::default_layout();
        let obstacles = environment.obstacles.clone();
        let mut localizer = MonteCarloLocalizer::new(environment, small_config()).unwrap();
        let fraction_near = |population: &ParticlePopulation, reading: f64| {
            let near = population
                .positions()
                .iter()
                .filter(|p| (predicted_distance(p, &obstacles) - reading).abs() < 3.0)
                .count();
            near as f64 / population.len() as f64
        };

        let initial = localizer.population().clone();
        let first = localizer.step(&MoveCommand::STAY).unwrap();
        let before = fraction_near(&initial, first.reading);

        let mut last = first;
        for _ in 0..10 {
            last = localizer.step(&MoveCommand::STAY).unwrap();
        }
        let after = fraction_near(localizer.population(), last.reading);
        assert!(after > 0.8, "after = {after}");
        assert!(after > before, "before = {before}, after = {after}");
    }
}
