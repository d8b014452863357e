//! Headless drive loop for running the localizer without a display.
//!
//! This module provides:
//! - `CommandSource` which yields one movement command per cycle, either from a script or as a
//!   seeded random walk over the unit commands
//! - `run_simulation` which gates every command through collision detection against the last
//!   position estimate and steps the filter
//! - `CycleRecord` / `SimulationResult` for CSV export and import of the per-cycle output

use std::io;
use std::path::Path;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::filter::{CycleReport, MonteCarloLocalizer};
use crate::geometry::detect_collision;
use crate::particle::MoveCommand;

const UNIT_COMMANDS: [MoveCommand; 5] = [
    MoveCommand::STAY,
    MoveCommand::LEFT,
    MoveCommand::RIGHT,
    MoveCommand::UP,
    MoveCommand::DOWN,
];

/// Supplies the drive loop with one movement command per cycle.
pub enum CommandSource {
    /// Replay a fixed list of commands, wrapping around at the end.
    Scripted { commands: Vec<MoveCommand>, next: usize },
    /// Draw a unit command at random and hold it for `hold` cycles.
    RandomWalk {
        rng: StdRng,
        hold: usize,
        remaining: usize,
        current: MoveCommand,
    },
}

impl CommandSource {
    pub fn scripted(commands: Vec<MoveCommand>) -> Self {
        CommandSource::Scripted { commands, next: 0 }
    }

    pub fn random_walk(seed: u64, hold: usize) -> Self {
        CommandSource::RandomWalk {
            rng: StdRng::seed_from_u64(seed),
            hold: hold.max(1),
            remaining: 0,
            current: MoveCommand::STAY,
        }
    }

    /// Build the source a configuration describes. The random walk uses its own stream so the
    /// filter's noise draws do not depend on how commands are generated.
    pub fn from_config(config: &SimulationConfig) -> Self {
        if config.commands.is_empty() {
            Self::random_walk(config.filter.seed.wrapping_add(1), config.command_hold)
        } else {
            Self::scripted(config.commands.clone())
        }
    }

    pub fn next_command(&mut self) -> MoveCommand {
        match self {
            CommandSource::Scripted { commands, next } => {
                if commands.is_empty() {
                    return MoveCommand::STAY;
                }
                let command = commands[*next % commands.len()];
                *next += 1;
                command
            }
            CommandSource::RandomWalk {
                rng,
                hold,
                remaining,
                current,
            } => {
                if *remaining == 0 {
                    *current = UNIT_COMMANDS[rng.random_range(0..UNIT_COMMANDS.len())];
                    *remaining = *hold;
                }
                *remaining -= 1;
                *current
            }
        }
    }
}

/// One row of simulation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub step: usize,
    /// Requested command, before collision gating
    pub command_x: f64,
    pub command_y: f64,
    /// Whether the command passed the collision check and was applied
    pub accepted: bool,
    pub reading: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub effective_sample_size: f64,
    pub degenerate: bool,
}

impl CycleRecord {
    pub fn new(step: usize, command: &MoveCommand, accepted: bool, report: &CycleReport) -> Self {
        CycleRecord {
            step,
            command_x: command.dx,
            command_y: command.dy,
            accepted,
            reading: report.reading,
            estimate_x: report.estimate.x,
            estimate_y: report.estimate.y,
            effective_sample_size: report.effective_sample_size,
            degenerate: report.degenerate,
        }
    }
}

/// Output of a drive-loop run.
#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    pub records: Vec<CycleRecord>,
    /// Number of cycles whose weights collapsed and were reset to uniform
    pub degeneracy_count: usize,
    /// Number of commands rejected by the collision check
    pub rejected_commands: usize,
}

impl SimulationResult {
    /// Writes the per-cycle records to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads per-cycle records previously written by [`SimulationResult::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: CycleRecord = result?;
            records.push(record);
        }
        let degeneracy_count = records.iter().filter(|r| r.degenerate).count();
        let rejected_commands = records.iter().filter(|r| !r.accepted).count();
        Ok(SimulationResult {
            records,
            degeneracy_count,
            rejected_commands,
        })
    }

    pub fn final_estimate(&self) -> Option<(f64, f64)> {
        self.records.last().map(|r| (r.estimate_x, r.estimate_y))
    }
}

/// Run the drive loop with a prepared localizer and command source for `steps` cycles.
///
/// Each requested command is checked against the last estimate; a command that would move the
/// estimate into an obstacle is replaced by [`MoveCommand::STAY`].
pub fn drive(
    localizer: &mut MonteCarloLocalizer,
    commands: &mut CommandSource,
    steps: usize,
) -> Result<SimulationResult> {
    let mut result = SimulationResult::default();
    for step in 0..steps {
        let requested = commands.next_command();
        let displacement = requested.displacement(localizer.config().move_speed);
        let accepted = requested.is_stationary()
            || !detect_collision(
                &localizer.last_estimate(),
                &displacement,
                localizer.environment(),
            );
        if !accepted {
            debug!(
                "Step {step}: command ({}, {}) rejected by collision check",
                requested.dx, requested.dy
            );
            result.rejected_commands += 1;
        }
        let applied = if accepted {
            requested
        } else {
            MoveCommand::STAY
        };
        let report = localizer.step(&applied)?;
        result
            .records
            .push(CycleRecord::new(step, &requested, accepted, &report));
    }
    result.degeneracy_count = localizer.degeneracy_count();
    Ok(result)
}

/// Build a localizer from the configuration and run the drive loop.
///
/// # Errors
/// `InvalidArgument` if the configuration is invalid; nothing is run in that case.
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationResult> {
    config.validate()?;
    info!(
        "Starting simulation: {} particles, {} obstacles, {} steps",
        config.filter.num_particles,
        config.environment.obstacles.len(),
        config.steps
    );
    let mut localizer =
        MonteCarloLocalizer::new(config.environment.clone(), config.filter.clone())?;
    let mut commands = CommandSource::from_config(config);
    let result = drive(&mut localizer, &mut commands, config.steps)?;
    match result.final_estimate() {
        Some((x, y)) => info!(
            "Simulation finished: final estimate ({x:.2}, {y:.2}), {} degenerate cycles, {} rejected commands",
            result.degeneracy_count, result.rejected_commands
        ),
        None => info!("Simulation finished without running any cycles"),
    }
    let spread = localizer.covariance()?;
    debug!(
        "Final population {:?}, std ({:.2}, {:.2})",
        localizer.population(),
        spread[(0, 0)].sqrt(),
        spread[(1, 1)].sqrt()
    );
    Ok(result)
}
