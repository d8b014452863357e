//! Monte Carlo Localization toolbox for a robot in a bounded 2D environment
//!
//! This crate provides a bootstrap (sequential importance resampling, SIR) particle filter that
//! estimates the position of a robot moving in a rectangular environment containing axis-aligned
//! rectangular obstacles. The robot's belief is represented by a weighted population of candidate
//! positions ("particles") rather than a single point estimate. The crate does not interface with
//! real sensors, render anything, or read keyboard input. It is designed to be driven by an
//! external loop that supplies one collision-checked movement command per cycle.
//!
//! Primarily built off of three crate dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the 2D vector and matrix types.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provide the seedable random source and the Gaussian noise.
//!
//! All randomness flows through an explicitly passed random source, so every run can be replayed
//! from its seed.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [geometry]: Environment bounds, rectangular obstacles, distance queries and collision detection.
//! - [likelihood]: The Gaussian noise source and probability density used to score particles.
//! - [particle]: The particle population and its initialization, motion, reweighting and resampling.
//! - [sensor]: Synthesis of the cycle's range reading and the per-particle predicted distance.
//! - [estimate]: Reduction of the weighted population to a single position estimate.
//! - [filter]: The [`filter::MonteCarloLocalizer`] that runs one full cycle per call.
//! - [config]: Serializable filter and simulation configuration.
//! - [sim]: A headless drive loop and CSV output of the per-cycle results.
//! - [error]: The crate's error type.
//!
//! ## The localization cycle
//!
//! Each cycle runs the following steps in a fixed order.
//!
//! ### Motion update
//!
//! Every particle moves by the same commanded displacement $u$ scaled by the move speed $s$ and an
//! independent Gaussian perturbation, and is then clipped into the environment bounds:
//!
//! $$
//! x_i(+) = \mathrm{clip}\left( x_i(-) + s\,u + \epsilon_i \right), \quad \epsilon_i \sim \mathcal{N}(0, \sigma_{motion}^2 I)
//! $$
//!
//! ### Sensor synthesis
//!
//! The reading $z$ is the median over particles of the noisy distance to the nearest obstacle,
//! $d(x_i) + \eta_i$ with $\eta_i \sim \mathcal{N}(0, \sigma_{sensor}^2)$.
//!
//! ### Reweighting
//!
//! Each weight is multiplied by the Gaussian likelihood of the reading given that particle's
//! noise-free predicted distance:
//!
//! $$
//! w_i(+) = w_i(-) \cdot \frac{1}{\sigma_{sensor}\sqrt{2\pi}} \exp\left( -\frac{(z - d(x_i))^2}{2\sigma_{sensor}^2} \right)
//! $$
//!
//! ### Estimate and resampling
//!
//! The estimate is the weighted mean of the positions. The population is then redrawn with
//! replacement, index $i$ with probability $w_i / \sum_j w_j$, and every weight is reset to one.
//! A weight vector that sums to zero is reported as [`error::LocalizationError::DegenerateState`]
//! rather than divided through.
pub mod config;
pub mod error;
pub mod estimate;
pub mod filter;
pub mod geometry;
pub mod likelihood;
pub mod particle;
pub mod sensor;
pub mod sim;

pub use error::{LocalizationError, Result};
pub use estimate::estimate;
pub use filter::{CycleReport, MonteCarloLocalizer};
pub use geometry::{Bounds, Environment, Obstacle, calculate_distance_to_obstacle};
pub use likelihood::gaussian_probability;
pub use particle::{
    MoveCommand, ParticlePopulation, ParticleResamplingStrategy, initialize, move_particles,
    resample, reweight,
};
pub use sensor::synthesize_reading;
