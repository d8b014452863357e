//! MCL SIM: a headless drive loop for the Monte Carlo Localization toolbox.
//!
//! The simulator replaces the interactive display of a robot demo with a scripted or random-walk
//! command stream. Each cycle the requested command is gated by collision detection against the
//! current position estimate and then handed to the particle filter. The per-cycle readings,
//! estimates and effective sample sizes are written to CSV.
//!
//! You can run simulations either by:
//!   1. Loading all parameters from a configuration file (TOML/JSON/YAML)
//!   2. Specifying parameters via command-line flags

mod common;

use clap::{Args, Parser, Subcommand};
use common::{init_logger, prepare_output_file};
use log::{error, info, warn};
use std::error::Error;
use std::path::{Path, PathBuf};

use mcl::ParticleResamplingStrategy;
use mcl::config::SimulationConfig;
use mcl::sim::{SimulationResult, run_simulation};

const LONG_ABOUT: &str = "MCL SIM: a headless drive loop for the Monte Carlo Localization toolbox.

The robot moves in a bounded 2D environment with rectangular obstacles. Its position is
estimated by a bootstrap particle filter: particles are moved with noise, scored against a
simulated range reading, averaged into an estimate and resampled every cycle.

You can run simulations either by:
  1. Loading all parameters from a configuration file (TOML/JSON/YAML)
  2. Specifying parameters via command-line flags

Use the `config` subcommand to write a default configuration file to start from.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A headless drive loop for Monte Carlo Localization.", long_about = LONG_ABOUT)]
struct Cli {
    /// Run simulation from a configuration file (TOML/JSON/YAML)
    /// This option overrides any subcommand arguments
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command to execute (ignored if --config is provided)
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (off, error, warn, info, debug, trace); overrides the configuration file.
    /// Defaults to the file's level, or info without a file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file path (if not specified, logs to stderr); overrides the configuration file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Logging settings: explicit flags first, then the configuration file, then defaults.
    fn log_settings(&self, config: Option<&SimulationConfig>) -> (String, Option<PathBuf>) {
        let level = self
            .log_level
            .clone()
            .or_else(|| config.map(|c| c.logging.level.clone()))
            .unwrap_or_else(|| "info".to_string());
        let file = self
            .log_file
            .clone()
            .or_else(|| config.and_then(|c| c.logging.file.as_ref().map(PathBuf::from)));
        (level, file)
    }
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run the localization drive loop",
        long_about = "Run the particle filter for a number of cycles in the reference 400 x 400 environment. Commands are drawn as a seeded random walk over the unit moves (left, right, up, down, stay)."
    )]
    Run(RunArgs),
    #[command(
        name = "config",
        about = "Write a default configuration file",
        long_about = "Write a configuration file with every parameter at its default value. The format is chosen by the file extension (.toml, .json, .yaml)."
    )]
    CreateConfig(CreateConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Number of cycles to run
    #[arg(long, default_value_t = 200)]
    steps: usize,
    /// Number of particles
    #[arg(long, default_value_t = 500)]
    particles: usize,
    /// Seed for the filter and the command stream
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Standard deviation of the motion noise
    #[arg(long, default_value_t = 0.5)]
    motion_noise: f64,
    /// Standard deviation of the range sensor noise
    #[arg(long, default_value_t = 1.0)]
    sensor_noise: f64,
    /// Scale applied to each unit movement command
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Resampling scheme
    #[arg(long, value_enum, default_value_t = ParticleResamplingStrategy::Multinomial)]
    resampling: ParticleResamplingStrategy,
    /// Cycles a random-walk command is held before a new one is drawn
    #[arg(long, default_value_t = 10)]
    hold: usize,
    /// Output CSV file for the per-cycle results
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn to_config(&self) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.steps = self.steps;
        config.command_hold = self.hold;
        config.output = self.output.as_ref().map(|p| p.display().to_string());
        config.filter.num_particles = self.particles;
        config.filter.seed = self.seed;
        config.filter.motion_noise_std = self.motion_noise;
        config.filter.sensor_noise_std = self.sensor_noise;
        config.filter.move_speed = self.speed;
        config.filter.resampling_strategy = self.resampling;
        config
    }
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output path for the configuration file
    #[arg(short, long, default_value = "mcl_config.toml")]
    output: PathBuf,
}

fn write_results(result: &SimulationResult, output: &Path) -> Result<(), Box<dyn Error>> {
    prepare_output_file(output)?;
    result.to_csv(output)?;
    info!(
        "Wrote {} cycle records to {}",
        result.records.len(),
        output.display()
    );
    Ok(())
}

fn run(config: &SimulationConfig) -> Result<(), Box<dyn Error>> {
    let result = match run_simulation(config) {
        Ok(result) => result,
        Err(e) => {
            error!("Error running simulation: {}", e);
            return Err(e.into());
        }
    };
    if result.degeneracy_count > 0 {
        warn!(
            "{} of {} cycles had degenerate weights and were reset to uniform",
            result.degeneracy_count,
            result.records.len()
        );
    }
    match &config.output {
        Some(output) => write_results(&result, Path::new(output))?,
        None => {
            if let Some((x, y)) = result.final_estimate() {
                println!("Final estimate: ({x:.2}, {y:.2})");
            }
        }
    }
    Ok(())
}

fn create_config_file(args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    prepare_output_file(&args.output)?;
    SimulationConfig::default().to_file(&args.output)?;
    println!("Wrote default configuration to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // A configuration file replaces the subcommand entirely
    if let Some(ref config_path) = cli.config {
        let config = SimulationConfig::from_file(config_path)?;
        let (level, file) = cli.log_settings(Some(&config));
        init_logger(&level, file.as_ref())?;
        info!("Loaded configuration from {}", config_path.display());
        return run(&config);
    }

    let (level, file) = cli.log_settings(None);
    init_logger(&level, file.as_ref())?;

    match cli.command {
        Some(Command::Run(args)) => {
            info!(
                "Running localization with {} particles for {} steps",
                args.particles, args.steps
            );
            run(&args.to_config())
        }
        Some(Command::CreateConfig(args)) => create_config_file(&args),
        None => {
            eprintln!("Error: No command provided. Use -h or --help for usage information.");
            std::process::exit(1);
        }
    }
}
