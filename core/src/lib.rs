//! Landmark-based Monte Carlo localization for a planar vehicle
//!
//! This crate estimates the pose of a vehicle moving on a plane, $(x, y, \theta)$, from noisy motion commands
//! and range-limited observations of point landmarks whose positions are known ahead of time. The estimator is a
//! sequential importance resampling (SIR) particle filter: a fixed number of weighted pose hypotheses are pushed
//! through a kinematic motion model, scored against the landmark observations with a Gaussian likelihood, and
//! resampled in proportion to their weights.
//!
//! The crate is built on three dependencies that carry the numerical work:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): 2-D rigid transforms for moving observations between the
//!   vehicle frame and the map frame, and the pose covariance.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): the seedable
//!   generator owned by the filter and the Gaussian/uniform draws for initialization, process noise and resampling.
//!
//! Everything else (configuration files, data logs, the `pfsim` command line tool) is auxiliary I/O around the filter.
//!
//! ## Crate overview
//!
//! - [error]: The [`error::FilterError`] type returned by the filter operations.
//! - [config]: Serializable filter and simulation configuration.
//! - [map]: The static landmark map.
//! - [measurements]: Landmark observations, vehicle/map frame transforms, and the observation likelihood model.
//! - [association]: Nearest-neighbor data association between observations and predicted landmarks.
//! - [motion]: The kinematic motion model with process noise.
//! - [particle]: Particles, their diagnostics, and the state averaging strategies.
//! - [resampling]: Weight-proportional resampling strategies, including the resampling wheel.
//! - [filter]: The [`filter::ParticleFilter`] that ties the above into the predict/update/resample cycle.
//! - [sim]: Readers for map/control/observation logs and a simulation loop that drives the filter.
//!
//! ## Coordinate conventions
//!
//! Poses and landmarks are expressed in a right-handed map frame. The heading $\theta$ is measured counter-clockwise
//! from the map $x$ axis. Observations arrive in the vehicle frame, with $x$ pointing forward along the heading and
//! $y$ to the left. A vehicle-frame point $(x_v, y_v)$ observed from pose $(p_x, p_y, \theta)$ maps to
//!
//! $$
//! \begin{bmatrix} x_m \\\\ y_m \end{bmatrix} =
//! \begin{bmatrix} \cos\theta & -\sin\theta \\\\ \sin\theta & \cos\theta \end{bmatrix}
//! \begin{bmatrix} x_v \\\\ y_v \end{bmatrix} + \begin{bmatrix} p_x \\\\ p_y \end{bmatrix}
//! $$
//!
//! ## Filter cycle
//!
//! The filter is driven externally, once per timestep:
//!
//! 1. [`filter::ParticleFilter::init`] seeds the particle set once from a Gaussian around an initial pose estimate.
//! 2. [`filter::ParticleFilter::predict`] moves every particle with the motion command and adds process noise.
//! 3. [`filter::ParticleFilter::update_weights`] scores every particle against the current observations.
//! 4. [`filter::ParticleFilter::resample`] draws the next generation in proportion to the weights.
//!
//! ```rust
//! use landmark_pf::config::FilterConfig;
//! use landmark_pf::filter::ParticleFilter;
//! use landmark_pf::map::{Map, MapLandmark};
//! use landmark_pf::measurements::LandmarkObservation;
//! use landmark_pf::{ControlInput, LandmarkStdDev, PoseStdDev};
//!
//! let map = Map::new(vec![MapLandmark::new(1, 5.0, 0.0)]);
//! let mut pf = ParticleFilter::new_with_seed(FilterConfig::default(), 7);
//! pf.init(0.0, 0.0, 0.0, PoseStdDev::new(0.3, 0.3, 0.01)).unwrap();
//! pf.predict(0.1, PoseStdDev::new(0.3, 0.3, 0.01), ControlInput::new(1.0, 0.0)).unwrap();
//! let observations = vec![LandmarkObservation::new(0, 4.9, 0.0)];
//! pf.update_weights(50.0, LandmarkStdDev::new(0.3, 0.3), &observations, &map).unwrap();
//! pf.resample().unwrap();
//! let estimate = pf.estimate().unwrap();
//! assert!(estimate.x.is_finite());
//! ```
pub mod association;
pub mod config;
pub mod error;
pub mod filter;
pub mod map;
pub mod measurements;
pub mod motion;
pub mod particle;
pub mod resampling;
pub mod sim;

use std::fmt::{self, Display};

use nalgebra::{Isometry2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Planar vehicle pose in the map frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position along the map x axis (m)
    pub x: f64,
    /// Position along the map y axis (m)
    pub y: f64,
    /// Heading, counter-clockwise from the map x axis (rad)
    pub theta: f64,
}
impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }
    /// Rigid transform taking vehicle-frame points into the map frame.
    pub fn isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.theta)
    }
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ x: {:.4}, y: {:.4}, theta: {:.4} }}",
            self.x, self.y, self.theta
        )
    }
}

/// Motion command applied over one timestep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    /// Forward speed (m/s)
    pub velocity: f64,
    /// Turn rate (rad/s)
    pub yaw_rate: f64,
}
impl ControlInput {
    pub fn new(velocity: f64, yaw_rate: f64) -> Self {
        ControlInput { velocity, yaw_rate }
    }
}

/// Standard deviations of a pose: used both for the initial spread and for process noise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseStdDev {
    /// Standard deviation along x (m)
    pub x: f64,
    /// Standard deviation along y (m)
    pub y: f64,
    /// Standard deviation of the heading (rad)
    pub theta: f64,
}
impl PoseStdDev {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        PoseStdDev { x, y, theta }
    }
    /// Checks that every component is finite and non-negative. A zero component collapses that
    /// dimension onto its mean.
    pub fn validate(&self, name: &'static str) -> Result<(), FilterError> {
        for value in [self.x, self.y, self.theta] {
            if !value.is_finite() || value < 0.0 {
                return Err(FilterError::invalid(
                    name,
                    format!("standard deviations must be finite and non-negative, got {self:?}"),
                ));
            }
        }
        Ok(())
    }
}

/// Standard deviations of a landmark observation in the map frame.
///
/// The observation noise is modeled as an axis-aligned Gaussian, so there is no cross term.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkStdDev {
    /// Standard deviation along x (m)
    pub x: f64,
    /// Standard deviation along y (m)
    pub y: f64,
}
impl LandmarkStdDev {
    pub fn new(x: f64, y: f64) -> Self {
        LandmarkStdDev { x, y }
    }
}

/// Wrap an angle to the range $(-\pi, \pi]$ radians.
///
/// Non-finite input is returned unchanged.
///
/// # Example
/// ```rust
/// use landmark_pf::wrap_to_pi;
/// let wrapped = wrap_to_pi(3.0 * std::f64::consts::PI);
/// assert!((wrapped - std::f64::consts::PI).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    let two_pi = 2.0 * std::f64::consts::PI;
    let wrapped = (angle + std::f64::consts::PI).rem_euclid(two_pi) - std::f64::consts::PI;
    if wrapped <= -std::f64::consts::PI {
        wrapped + two_pi
    } else {
        wrapped
    }
}
