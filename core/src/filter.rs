//! Particle filter for landmark-based localization.
//!
//! [ParticleFilter] owns the particle set, its configuration, and the random number generator used for every draw.
//! The external control loop calls [ParticleFilter::init] once and then, on every timestep,
//! [ParticleFilter::predict], [ParticleFilter::update_weights] and [ParticleFilter::resample]. Every operation
//! other than `init` returns [FilterError::NotInitialized] until `init` has succeeded.
//!
//! The generator is a [`StdRng`] seeded from [`FilterConfig::seed`], so two filters built with the same
//! configuration and fed the same inputs produce identical particle sets.
use std::fmt::{self, Debug};

use log::{debug, info, warn};
use nalgebra::Matrix3;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::FilterConfig;
use crate::error::FilterError;
use crate::map::Map;
use crate::measurements::{LandmarkObservation, ObservationWeighter};
use crate::motion::{MotionModel, PoseNoise};
use crate::particle::{Particle, highest_weight};
use crate::resampling::uniform_resample;
use crate::{ControlInput, LandmarkStdDev, Pose, PoseStdDev};

pub struct ParticleFilter {
    config: FilterConfig,
    particles: Vec<Particle>,
    motion_model: MotionModel,
    rng: StdRng,
    initialized: bool,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        f.debug_struct("ParticleFilter")
            .field("initialized", &self.initialized)
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("config", &self.config)
            .finish()
    }
}
impl ParticleFilter {
    /// Create an uninitialized filter. The generator is seeded from `config.seed`, or from the OS when no seed
    /// is configured.
    pub fn new(config: FilterConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self::new_with_seed(config, seed)
    }

    /// Create an uninitialized filter with a specific random seed, overriding `config.seed`.
    ///
    /// This is useful for reproducible tests.
    pub fn new_with_seed(mut config: FilterConfig, seed: u64) -> Self {
        config.seed = Some(seed);
        let motion_model = MotionModel {
            yaw_rate_threshold: config.yaw_rate_threshold,
        };
        ParticleFilter {
            config,
            particles: Vec::new(),
            motion_model,
            rng: StdRng::seed_from_u64(seed),
            initialized: false,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn ensure_initialized(&self) -> Result<(), FilterError> {
        if self.initialized {
            Ok(())
        } else {
            Err(FilterError::NotInitialized)
        }
    }

    /// Seed the particle set from a Gaussian around the initial pose estimate `(x, y, theta)`.
    ///
    /// Every particle gets an independent draw for each dimension, a weight of 1, and its index as id. Zero standard
    /// deviations collapse the corresponding dimension onto the mean. Calling `init` again discards the current
    /// particle set and starts over.
    pub fn init(&mut self, x: f64, y: f64, theta: f64, std: PoseStdDev) -> Result<(), FilterError> {
        if self.config.num_particles == 0 {
            return Err(FilterError::invalid("num_particles", "must be at least 1"));
        }
        let mean = Pose::new(x, y, theta);
        if !mean.is_finite() {
            return Err(FilterError::invalid(
                "initial_pose",
                format!("must be finite, got {mean}"),
            ));
        }
        MotionModel::new(self.config.yaw_rate_threshold)?;
        let distribution = PoseNoise::centered_on(&mean, std)?;
        self.particles = (0..self.config.num_particles)
            .map(|id| Particle::new(id, distribution.sample(&mut self.rng), 1.0))
            .collect();
        self.initialized = true;
        info!(
            "Initialized {} particles around {} with std {:?}",
            self.particles.len(),
            mean,
            std
        );
        Ok(())
    }

    /// Move every particle forward by `dt` seconds under `control`, then add independent process noise.
    pub fn predict(
        &mut self,
        dt: f64,
        std: PoseStdDev,
        control: ControlInput,
    ) -> Result<(), FilterError> {
        self.ensure_initialized()?;
        if !dt.is_finite() || dt < 0.0 {
            return Err(FilterError::invalid(
                "dt",
                format!("must be finite and non-negative, got {dt}"),
            ));
        }
        if !(control.velocity.is_finite() && control.yaw_rate.is_finite()) {
            return Err(FilterError::invalid(
                "control",
                format!("must be finite, got {control:?}"),
            ));
        }
        let noise = PoseNoise::new(std)?;
        for particle in &mut self.particles {
            particle.pose = self.motion_model.propagate(&particle.pose, &control, dt);
            noise.perturb(&mut particle.pose, &mut self.rng);
        }
        debug!(
            "Predicted {} particles over dt = {dt} with {control:?}",
            self.particles.len()
        );
        Ok(())
    }

    /// Recompute every particle's weight from the current vehicle-frame observations.
    ///
    /// Weights are left unnormalized: each is the product of the Gaussian likelihoods of the particle's matched
    /// observations. Observations with no landmark in range are handled by
    /// [`FilterConfig::unmatched_policy`]. Each particle's diagnostics are replaced with its matches.
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        landmark_std: LandmarkStdDev,
        observations: &[LandmarkObservation],
        map: &Map,
    ) -> Result<(), FilterError> {
        self.ensure_initialized()?;
        let weighter =
            ObservationWeighter::new(sensor_range, landmark_std, self.config.unmatched_policy)?;
        if let Some(bad) = observations
            .iter()
            .find(|o| !(o.x.is_finite() && o.y.is_finite()))
        {
            return Err(FilterError::invalid(
                "observations",
                format!("coordinates must be finite, got {bad:?}"),
            ));
        }
        for particle in &mut self.particles {
            weighter.weigh(particle, observations, map);
        }
        debug!(
            "Weighted {} particles against {} observations, N_eff = {:.2}",
            self.particles.len(),
            observations.len(),
            self.effective_sample_size()
        );
        Ok(())
    }

    /// Replace the particle set with a weight-proportional draw of the same size.
    ///
    /// Poses and weights are copied from the chosen particles, and each member of the new generation gets a fresh
    /// id. If the weights are degenerate (all zero or any non-finite) the draw falls back to uniform over the
    /// current particles.
    pub fn resample(&mut self) -> Result<(), FilterError> {
        self.ensure_initialized()?;
        let n = self.particles.len();
        let weights: Vec<f64> = self.particles.iter().map(|p| p.weight).collect();
        let indices = match self.config.resampling_strategy.resample(
            &weights,
            n,
            self.config.wheel_step,
            &mut self.rng,
        ) {
            Ok(indices) => indices,
            Err(FilterError::DegenerateWeights) => {
                warn!("Particle weights are degenerate, resampling {n} particles uniformly");
                uniform_resample(n, n, &mut self.rng)?
            }
            Err(e) => return Err(e),
        };
        let particles = indices
            .into_iter()
            .enumerate()
            .map(|(id, index)| {
                let mut particle = self.particles[index].clone();
                particle.id = id;
                particle
            })
            .collect();
        self.particles = particles;
        debug!("Resampled {n} particles");
        Ok(())
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Mutable access to the particles, e.g. for externally supplied weights. The set size cannot change.
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// The particle with the largest weight.
    pub fn best_particle(&self) -> Result<&Particle, FilterError> {
        self.ensure_initialized()?;
        highest_weight(&self.particles).ok_or(FilterError::DegenerateWeights)
    }

    /// Pose estimate according to [`FilterConfig::averaging_strategy`].
    pub fn estimate(&self) -> Result<Pose, FilterError> {
        self.ensure_initialized()?;
        let (pose, _) = self.config.averaging_strategy.estimate(&self.particles)?;
        Ok(pose)
    }

    /// Spread of the particle set around the estimate, ordered (x, y, theta).
    pub fn covariance(&self) -> Result<Matrix3<f64>, FilterError> {
        self.ensure_initialized()?;
        let (_, cov) = self.config.averaging_strategy.estimate(&self.particles)?;
        Ok(cov)
    }

    /// Scale the weights to sum to one. Degenerate weights are reset to uniform.
    pub fn normalize_weights(&mut self) {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if sum > 0.0 && sum.is_finite() {
            for particle in &mut self.particles {
                particle.weight /= sum;
            }
        } else {
            let uniform = 1.0 / self.particles.len() as f64;
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
        }
    }

    /// N_eff = 1 / sum(w_i^2) over the normalized weights; 0 when the weights are degenerate.
    pub fn effective_sample_size(&self) -> f64 {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !(sum > 0.0 && sum.is_finite()) {
            return 0.0;
        }
        let sum_of_squares: f64 = self
            .particles
            .iter()
            .map(|p| (p.weight / sum).powi(2))
            .sum();
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }
}
