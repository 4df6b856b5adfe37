//! Filter and simulation configuration.
//!
//! Both configuration structs can be written to and read from JSON, YAML, or TOML; [FilterConfig::to_file] and
//! [FilterConfig::from_file] (and their [SimulationConfig] counterparts) pick the format from the file extension.
//!
//! ```toml
//! delta_t = 0.1
//! sensor_range = 50.0
//!
//! [initial_pose]
//! x = 0.0
//! y = 0.0
//! theta = 0.0
//!
//! [init_std]
//! x = 0.3
//! y = 0.3
//! theta = 0.01
//!
//! [motion_std]
//! x = 0.3
//! y = 0.3
//! theta = 0.01
//!
//! [landmark_std]
//! x = 0.3
//! y = 0.3
//!
//! [filter]
//! num_particles = 100
//! seed = 42
//! yaw_rate_threshold = 0.01
//! resampling_strategy = "wheel"
//! wheel_step = "doubled"
//! unmatched_policy = "skip"
//! averaging_strategy = "highest_weight"
//!
//! [logging]
//! level = "info"
//! ```
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::measurements::UnmatchedObservationPolicy;
use crate::motion::DEFAULT_YAW_RATE_THRESHOLD;
use crate::particle::ParticleAveragingStrategy;
use crate::resampling::{ParticleResamplingStrategy, WheelStep};
use crate::{LandmarkStdDev, Pose, PoseStdDev};

/// Default random seed for reproducible runs
fn default_seed() -> Option<u64> {
    Some(42)
}

/// Settings owned by a [`crate::filter::ParticleFilter`] for its whole lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of particles, fixed for the filter's lifetime
    pub num_particles: usize,
    /// Seed for the filter's random number generator. `None` draws a fresh seed from the OS.
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,
    /// Yaw rate magnitude (rad/s) below which motion is integrated as a straight line
    pub yaw_rate_threshold: f64,
    pub resampling_strategy: ParticleResamplingStrategy,
    /// Step distribution for [`ParticleResamplingStrategy::Wheel`]
    pub wheel_step: WheelStep,
    /// Treatment of observations with no landmark in range
    pub unmatched_policy: UnmatchedObservationPolicy,
    pub averaging_strategy: ParticleAveragingStrategy,
}
impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 100,
            seed: default_seed(),
            yaw_rate_threshold: DEFAULT_YAW_RATE_THRESHOLD,
            resampling_strategy: ParticleResamplingStrategy::default(),
            wheel_step: WheelStep::default(),
            unmatched_policy: UnmatchedObservationPolicy::default(),
            averaging_strategy: ParticleAveragingStrategy::default(),
        }
    }
}

/// Log output of the `pfsim` tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of off, error, warn, info, debug, trace
    pub level: String,
    /// Append to this file instead of writing to stderr
    pub file: Option<PathBuf>,
}
impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}
impl LoggingConfig {
    /// The configured level, or `Info` when the level string is not recognized.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// Per-step parameters for a simulated run, plus the filter configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time between control inputs (s)
    pub delta_t: f64,
    /// Half-width of the square sensor footprint (m)
    pub sensor_range: f64,
    /// Starting pose when a run has no ground truth to initialize from
    pub initial_pose: Pose,
    /// Spread of the initial particle cloud around the first pose
    pub init_std: PoseStdDev,
    /// Process noise added on every prediction
    pub motion_std: PoseStdDev,
    /// Observation noise of the landmark sensor
    pub landmark_std: LandmarkStdDev,
    pub filter: FilterConfig,
    pub logging: LoggingConfig,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            delta_t: 0.1,
            sensor_range: 50.0,
            initial_pose: Pose::default(),
            init_std: PoseStdDev::new(0.3, 0.3, 0.01),
            motion_std: PoseStdDev::new(0.3, 0.3, 0.01),
            landmark_std: LandmarkStdDev::new(0.3, 0.3),
            filter: FilterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

macro_rules! impl_config_io {
    ($t:ty) => {
        impl $t {
            /// Write the configuration to a JSON file (pretty-printed).
            pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
                write_json(self, path)
            }
            /// Read the configuration from a JSON file.
            pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
                read_json(path)
            }
            /// Write the configuration as YAML.
            pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
                write_yaml(self, path)
            }
            /// Read the configuration from YAML.
            pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
                read_yaml(path)
            }
            /// Write the configuration as TOML.
            pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
                write_toml(self, path)
            }
            /// Read the configuration from TOML.
            pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
                read_toml(path)
            }
            /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
            pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
                let p = path.as_ref();
                match extension(p).as_deref() {
                    Some("json") => self.to_json(p),
                    Some("yaml") | Some("yml") => self.to_yaml(p),
                    Some("toml") => self.to_toml(p),
                    _ => Err(unsupported_extension()),
                }
            }
            /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
            pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
                let p = path.as_ref();
                match extension(p).as_deref() {
                    Some("json") => Self::from_json(p),
                    Some("yaml") | Some("yml") => Self::from_yaml(p),
                    Some("toml") => Self::from_toml(p),
                    _ => Err(unsupported_extension()),
                }
            }
        }
    };
}
impl_config_io!(FilterConfig);
impl_config_io!(SimulationConfig);

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported_extension() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "unsupported file extension")
}

fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> io::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value).map_err(io::Error::other)
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let file = File::open(path)?;
    serde_json::from_reader(file).map_err(io::Error::other)
}

fn write_yaml<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> io::Result<()> {
    let mut file = File::create(path)?;
    let s = serde_yaml::to_string(value).map_err(io::Error::other)?;
    file.write_all(s.as_bytes())
}

fn read_yaml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let file = File::open(path)?;
    serde_yaml::from_reader(file).map_err(io::Error::other)
}

fn write_toml<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> io::Result<()> {
    let mut file = File::create(path)?;
    let s = toml::to_string(value).map_err(io::Error::other)?;
    file.write_all(s.as_bytes())
}

fn read_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let mut s = String::new();
    let mut file = File::open(path)?;
    file.read_to_string(&mut s)?;
    toml::from_str(&s).map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_cfg() -> SimulationConfig {
        SimulationConfig {
            delta_t: 0.05,
            sensor_range: 30.0,
            landmark_std: LandmarkStdDev::new(0.2, 0.4),
            filter: FilterConfig {
                num_particles: 250,
                seed: Some(7),
                resampling_strategy: ParticleResamplingStrategy::Systematic,
                wheel_step: WheelStep::Canonical,
                unmatched_policy: UnmatchedObservationPolicy::ZeroWeight,
                averaging_strategy: ParticleAveragingStrategy::WeightedAverage,
                ..FilterConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                file: Some(PathBuf::from("logs/pfsim.log")),
            },
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn json_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("json");
        cfg.to_json(&path).unwrap();
        let loaded = SimulationConfig::from_json(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn yaml_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("yaml");
        cfg.to_yaml(&path).unwrap();
        let loaded = SimulationConfig::from_yaml(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("toml");
        cfg.to_file(&path).unwrap();
        let loaded = SimulationConfig::from_file(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn filter_config_yml_roundtrip() {
        let cfg = sample_cfg().filter;
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("yml");
        cfg.to_file(&path).unwrap();
        let loaded = FilterConfig::from_file(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("toml");
        std::fs::write(&path, "sensor_range = 25.0\n\n[filter]\nnum_particles = 10\n").unwrap();
        let loaded = SimulationConfig::from_file(&path).unwrap();
        assert_eq!(loaded.sensor_range, 25.0);
        assert_eq!(loaded.delta_t, 0.1);
        assert_eq!(loaded.filter.num_particles, 10);
        assert_eq!(loaded.filter.seed, Some(42));
        assert_eq!(loaded.filter.resampling_strategy, ParticleResamplingStrategy::Wheel);
        assert_eq!(loaded.filter.wheel_step, WheelStep::Doubled);
    }

    #[test]
    fn logging_level_filter() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
        logging.level = "TRACE".to_string();
        assert_eq!(logging.level_filter(), log::LevelFilter::Trace);
        logging.level = "loud".to_string();
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn partial_toml_logging_section() {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("toml");
        std::fs::write(&path, "[logging]\nfile = \"run.log\"\n").unwrap();
        let loaded = SimulationConfig::from_file(&path).unwrap();
        assert_eq!(loaded.logging.level, "info");
        assert_eq!(loaded.logging.file, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn unsupported_extension_error() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("txt");
        let result = cfg.to_file(&path);
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::InvalidInput);
        let result = SimulationConfig::from_file(&path);
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn default_values() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.filter.num_particles, 100);
        assert_eq!(cfg.filter.yaw_rate_threshold, 0.01);
        assert_eq!(cfg.filter.unmatched_policy, UnmatchedObservationPolicy::Skip);
        assert_eq!(cfg.filter.averaging_strategy, ParticleAveragingStrategy::HighestWeight);
        assert_eq!(cfg.sensor_range, 50.0);
    }
}
