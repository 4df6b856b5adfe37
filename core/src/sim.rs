//! Data loading and a simulation loop for the particle filter.
//!
//! This module provides:
//! - Readers for the whitespace-delimited map, control, ground-truth, and observation logs
//! - `run_simulation`, which drives a [`ParticleFilter`] over a recorded run
//! - `StepResult` for storing per-step estimates, errors, and diagnostics, with CSV export
//!
//! Data files carry no header row. Columns are separated by any run of spaces or tabs and blank lines are ignored.
//! Observations are stored one file per timestep in a single directory; files are processed in file-name order, so
//! zero-padded names (`observations_000001.txt`) keep them in time order.
use std::error::Error;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::FilterError;
use crate::filter::ParticleFilter;
use crate::map::Map;
use crate::measurements::LandmarkObservation;
use crate::{ControlInput, Pose, wrap_to_pi};

/// Open a whitespace-delimited text file as a headerless CSV reader.
///
/// Each non-blank line becomes one record with its whitespace-separated tokens as fields, so rows can be
/// deserialized positionally into a struct.
pub fn whitespace_reader<P: AsRef<Path>>(path: P) -> Result<csv::Reader<Cursor<Vec<u8>>>, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let mut normalized = String::with_capacity(contents.len());
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        normalized.push_str(&fields.join("\t"));
        normalized.push('\n');
    }
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_reader(Cursor::new(normalized.into_bytes())))
}

/// One `velocity yaw_rate` row of a control log.
#[derive(Debug, Deserialize)]
struct ControlRecord {
    velocity: f64,
    yaw_rate: f64,
}

/// One `x y theta` row of a ground-truth log.
#[derive(Debug, Deserialize)]
struct GroundTruthRecord {
    x: f64,
    y: f64,
    theta: f64,
}

/// One `x y` row of an observation file, in the vehicle frame.
#[derive(Debug, Deserialize)]
struct ObservationRecord {
    x: f64,
    y: f64,
}

/// Reads a control log with one `velocity yaw_rate` row per timestep.
///
/// # Arguments
/// * `path` - Path to the control log.
///
/// # Returns
/// * `Ok(Vec<ControlInput>)` if successful.
/// * `Err` if the file cannot be read or a row cannot be parsed.
pub fn read_controls<P: AsRef<Path>>(path: P) -> Result<Vec<ControlInput>, Box<dyn Error>> {
    let mut rdr = whitespace_reader(path)?;
    let mut controls = Vec::new();
    for result in rdr.deserialize() {
        let record: ControlRecord = result?;
        controls.push(ControlInput::new(record.velocity, record.yaw_rate));
    }
    Ok(controls)
}

/// Reads a ground-truth log with one `x y theta` row per timestep.
pub fn read_ground_truth<P: AsRef<Path>>(path: P) -> Result<Vec<Pose>, Box<dyn Error>> {
    let mut rdr = whitespace_reader(path)?;
    let mut poses = Vec::new();
    for result in rdr.deserialize() {
        let record: GroundTruthRecord = result?;
        poses.push(Pose::new(record.x, record.y, record.theta));
    }
    Ok(poses)
}

/// Reads the vehicle-frame observations of a single timestep, one `x y` row per observation.
///
/// Observation ids are the row indices within the file.
pub fn read_observations<P: AsRef<Path>>(path: P) -> Result<Vec<LandmarkObservation>, Box<dyn Error>> {
    let mut rdr = whitespace_reader(path)?;
    let mut observations = Vec::new();
    for (id, result) in rdr.deserialize().enumerate() {
        let record: ObservationRecord = result?;
        observations.push(LandmarkObservation::new(id as u32, record.x, record.y));
    }
    Ok(observations)
}

/// Reads every observation file in `dir`, ordered by file name. Subdirectories are skipped.
pub fn read_observation_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Vec<LandmarkObservation>>, Box<dyn Error>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    let mut steps = Vec::with_capacity(paths.len());
    for path in paths {
        let observations = read_observations(&path)?;
        if observations.is_empty() {
            warn!("Observation file {} is empty", path.display());
        }
        steps.push(observations);
    }
    Ok(steps)
}

/// Absolute per-axis error between an estimate and the true pose, with the heading error wrapped to $(-\pi, \pi]$
/// before taking its magnitude.
pub fn pose_error(estimate: &Pose, truth: &Pose) -> Pose {
    Pose::new(
        (estimate.x - truth.x).abs(),
        (estimate.y - truth.y).abs(),
        wrap_to_pi(estimate.theta - truth.theta).abs(),
    )
}

/// Filter output for one timestep, recorded after the weight update and before resampling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    /// Pose estimate under the configured averaging strategy
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    /// Weight of the heaviest particle
    pub best_weight: f64,
    /// Effective sample size of the weighted particle set
    pub effective_particles: f64,
    /// Absolute errors against ground truth, when it is available
    pub error_x: Option<f64>,
    pub error_y: Option<f64>,
    pub error_theta: Option<f64>,
    /// Landmark ids matched by the heaviest particle, space separated
    pub associations: String,
    pub sense_x: String,
    pub sense_y: String,
}

/// Run the filter over a recorded sequence.
///
/// The number of timesteps is the number of observation sets. At step 0 the filter is initialized around the first
/// ground-truth pose (or `config.initial_pose` when no ground truth is given) with `config.init_std`. Every later
/// step `k` first predicts with control `k - 1`. Each step then updates the weights with observation set `k`,
/// records a [StepResult], and resamples.
///
/// # Arguments
/// * `config` - Simulation parameters and the filter configuration.
/// * `map` - Landmark map.
/// * `controls` - Control inputs; at least one fewer than the observation sets.
/// * `observations` - Vehicle-frame observations, one set per timestep.
/// * `ground_truth` - Optional true poses, at least one per timestep.
pub fn run_simulation(
    config: &SimulationConfig,
    map: &Map,
    controls: &[ControlInput],
    observations: &[Vec<LandmarkObservation>],
    ground_truth: Option<&[Pose]>,
) -> Result<Vec<StepResult>, FilterError> {
    let steps = observations.len();
    if steps == 0 {
        return Ok(Vec::new());
    }
    if controls.len() + 1 < steps {
        return Err(FilterError::invalid(
            "controls",
            format!("{} control inputs for {steps} timesteps", controls.len()),
        ));
    }
    if let Some(truth) = ground_truth
        && truth.len() < steps
    {
        return Err(FilterError::invalid(
            "ground_truth",
            format!("{} poses for {steps} timesteps", truth.len()),
        ));
    }
    let start = ground_truth.map_or(config.initial_pose, |truth| truth[0]);
    let mut pf = ParticleFilter::new(config.filter.clone());
    info!(
        "Running {steps} steps with {} particles over {} landmarks",
        config.filter.num_particles,
        map.len()
    );
    let mut results = Vec::with_capacity(steps);
    for (step, step_observations) in observations.iter().enumerate() {
        if step == 0 {
            pf.init(start.x, start.y, start.theta, config.init_std)?;
        } else {
            pf.predict(config.delta_t, config.motion_std, controls[step - 1])?;
        }
        pf.update_weights(
            config.sensor_range,
            config.landmark_std,
            step_observations,
            map,
        )?;
        let estimate = pf.estimate()?;
        let best = match pf.best_particle() {
            Ok(best) => Some(best),
            Err(FilterError::DegenerateWeights) => None,
            Err(e) => return Err(e),
        };
        let error = ground_truth.map(|truth| pose_error(&estimate, &truth[step]));
        results.push(StepResult {
            step,
            x: estimate.x,
            y: estimate.y,
            theta: estimate.theta,
            best_weight: best.map_or(f64::NAN, |b| b.weight),
            effective_particles: pf.effective_sample_size(),
            error_x: error.map(|e| e.x),
            error_y: error.map(|e| e.y),
            error_theta: error.map(|e| e.theta),
            associations: best.map(|b| b.associations_string(" ")).unwrap_or_default(),
            sense_x: best.map(|b| b.sense_x_string(" ")).unwrap_or_default(),
            sense_y: best.map(|b| b.sense_y_string(" ")).unwrap_or_default(),
        });
        pf.resample()?;
        debug!("Step {step}: estimate {estimate}");
    }
    Ok(results)
}

/// Writes step results to a CSV file with a header row.
pub fn write_results<P: AsRef<Path>>(path: P, results: &[StepResult]) -> io::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads step results previously written by [write_results].
pub fn read_results<P: AsRef<Path>>(path: P) -> Result<Vec<StepResult>, Box<dyn Error>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut results = Vec::new();
    for result in rdr.deserialize() {
        let record: StepResult = result?;
        results.push(record);
    }
    Ok(results)
}
