//! PFSIM: run the landmark particle filter over recorded data.
//!
//! A run needs a landmark map, a control log, and a directory of per-timestep observation files. With a
//! ground-truth log the filter is initialized from the first true pose and per-step errors are reported.
//!
//! Filter parameters come from a configuration file (TOML/JSON/YAML, see `pfsim create-config`) or the built-in
//! defaults; `--particles` and `--seed` override the corresponding configuration values.
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use landmark_pf::config::{LoggingConfig, SimulationConfig};
use landmark_pf::map::Map;
use landmark_pf::sim::{
    StepResult, read_controls, read_ground_truth, read_observation_dir, run_simulation, write_results,
};

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Landmark-based particle filter localization over recorded data.")]
struct Cli {
    /// Simulation configuration file (TOML/JSON/YAML); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace); overrides `logging.level` in the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file path; overrides `logging.file` in the configuration (stderr when neither is set)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run the particle filter over a recorded sequence",
        long_about = "Run the particle filter over a recorded sequence. Each observation file in the observation directory is one timestep; control i drives the prediction into timestep i + 1."
    )]
    Run(RunArgs),
    #[command(name = "create-config", about = "Write a configuration file with default values")]
    CreateConfig(CreateConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Landmark map file (`x y id` per line)
    #[arg(short, long)]
    map: PathBuf,

    /// Control log (`velocity yaw_rate` per line)
    #[arg(long)]
    control: PathBuf,

    /// Directory of observation files (`x y` per line), processed in file-name order
    #[arg(long)]
    observations: PathBuf,

    /// Ground-truth log (`x y theta` per line)
    #[arg(short, long)]
    ground_truth: Option<PathBuf>,

    /// Output CSV file for the per-step results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of particles (overrides the configuration)
    #[arg(short, long)]
    particles: Option<usize>,

    /// Random seed (overrides the configuration)
    #[arg(short, long)]
    seed: Option<u64>,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Destination path; the extension selects the format (.toml, .json, .yaml, .yml)
    #[arg(short, long)]
    output: PathBuf,
}

/// Installs the global logger: timestamped lines on stderr, or appended to `logging.file` when one is set.
fn init_logger(logging: &LoggingConfig) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(logging.level_filter()).format(|buf, record| {
        writeln!(
            buf,
            "{} [{:<5}] {}: {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = &logging.file {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("installing logger")
}

/// Applies the command line logging flags on top of the configuration's `[logging]` section.
fn resolve_logging(cli: &Cli, config: &SimulationConfig) -> LoggingConfig {
    let mut logging = config.logging.clone();
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(file) = &cli.log_file {
        logging.file = Some(file.clone());
    }
    logging
}

fn load_config(path: Option<&PathBuf>) -> Result<SimulationConfig> {
    match path {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(SimulationConfig::default()),
    }
}

fn run(args: &RunArgs, mut config: SimulationConfig) -> Result<()> {
    if let Some(particles) = args.particles {
        config.filter.num_particles = particles;
    }
    if let Some(seed) = args.seed {
        config.filter.seed = Some(seed);
    }

    // The data readers return boxed errors that are not `Send`, so they are flattened into messages here.
    let map = Map::from_file(&args.map)
        .map_err(|e| anyhow!("reading map {}: {e}", args.map.display()))?;
    let controls = read_controls(&args.control)
        .map_err(|e| anyhow!("reading controls {}: {e}", args.control.display()))?;
    let observations = read_observation_dir(&args.observations)
        .map_err(|e| anyhow!("reading observations {}: {e}", args.observations.display()))?;
    let ground_truth = match &args.ground_truth {
        Some(path) => Some(
            read_ground_truth(path)
                .map_err(|e| anyhow!("reading ground truth {}: {e}", path.display()))?,
        ),
        None => None,
    };
    info!(
        "Loaded {} landmarks, {} controls, {} observation steps",
        map.len(),
        controls.len(),
        observations.len()
    );
    if ground_truth.is_none() {
        warn!(
            "No ground truth given, initializing at {}",
            config.initial_pose
        );
    }

    let results = run_simulation(
        &config,
        &map,
        &controls,
        &observations,
        ground_truth.as_deref(),
    )
    .context("running particle filter")?;
    report(&results);

    if let Some(output) = &args.output {
        write_results(output, &results)
            .with_context(|| format!("writing results to {}", output.display()))?;
        info!("Results written to {}", output.display());
    }
    Ok(())
}

fn report(results: &[StepResult]) {
    let Some(last) = results.last() else {
        warn!("No timesteps to process");
        return;
    };
    info!(
        "Final estimate after {} steps: x = {:.4}, y = {:.4}, theta = {:.4}",
        results.len(),
        last.x,
        last.y,
        last.theta
    );
    let errors: Vec<(f64, f64, f64)> = results
        .iter()
        .filter_map(|r| Some((r.error_x?, r.error_y?, r.error_theta?)))
        .collect();
    if !errors.is_empty() {
        let n = errors.len() as f64;
        let (ex, ey, et) = errors
            .iter()
            .fold((0.0, 0.0, 0.0), |acc, e| (acc.0 + e.0, acc.1 + e.1, acc.2 + e.2));
        info!(
            "Mean absolute error: x = {:.4}, y = {:.4}, theta = {:.4}",
            ex / n,
            ey / n,
            et / n
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let logging = resolve_logging(&cli, &config);
    init_logger(&logging)?;
    if logging.level.parse::<log::LevelFilter>().is_err() {
        warn!("Unknown log level '{}', using info", logging.level);
    }

    match &cli.command {
        Command::Run(args) => run(args, config),
        Command::CreateConfig(args) => {
            config
                .to_file(&args.output)
                .with_context(|| format!("writing configuration to {}", args.output.display()))?;
            info!("Configuration written to {}", args.output.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn logging_comes_from_config_without_flags() {
        let cli = parse(&["pfsim", "create-config", "--output", "out.toml"]);
        let mut config = SimulationConfig::default();
        config.logging.level = "debug".to_string();
        config.logging.file = Some(PathBuf::from("logs/run.log"));
        let logging = resolve_logging(&cli, &config);
        assert_eq!(logging.level_filter(), log::LevelFilter::Debug);
        assert_eq!(logging.file, Some(PathBuf::from("logs/run.log")));
    }

    #[test]
    fn logging_flags_override_config() {
        let cli = parse(&[
            "pfsim",
            "--log-level",
            "warn",
            "--log-file",
            "cli.log",
            "create-config",
            "--output",
            "out.toml",
        ]);
        let mut config = SimulationConfig::default();
        config.logging.level = "trace".to_string();
        config.logging.file = Some(PathBuf::from("config.log"));
        let logging = resolve_logging(&cli, &config);
        assert_eq!(logging.level, "warn");
        assert_eq!(logging.file, Some(PathBuf::from("cli.log")));
    }
}
