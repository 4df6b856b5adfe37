//! Kinematic motion model with Gaussian process noise.
//!
//! The deterministic part integrates a constant velocity and yaw rate over the timestep. For a turning vehicle the
//! exact integral of the bicycle model is
//!
//! $$
//! \begin{aligned}
//! x(+) &= x(-) + \frac{v}{\dot\theta} \left( \sin(\theta + \dot\theta \Delta t) - \sin\theta \right) \\\\
//! y(+) &= y(-) + \frac{v}{\dot\theta} \left( \cos\theta - \cos(\theta + \dot\theta \Delta t) \right) \\\\
//! \theta(+) &= \theta(-) + \dot\theta \Delta t
//! \end{aligned}
//! $$
//!
//! which is ill-conditioned as $\dot\theta \to 0$. Below a yaw-rate threshold the straight-line form is used
//! instead and the heading is left unchanged.
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::{ControlInput, Pose, PoseStdDev};

/// Default magnitude of yaw rate (rad/s) below which motion is treated as straight.
pub const DEFAULT_YAW_RATE_THRESHOLD: f64 = 0.01;

/// Deterministic part of the motion model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionModel {
    pub yaw_rate_threshold: f64,
}
impl Default for MotionModel {
    fn default() -> Self {
        MotionModel {
            yaw_rate_threshold: DEFAULT_YAW_RATE_THRESHOLD,
        }
    }
}
impl MotionModel {
    pub fn new(yaw_rate_threshold: f64) -> Result<Self, FilterError> {
        if !yaw_rate_threshold.is_finite() || yaw_rate_threshold <= 0.0 {
            return Err(FilterError::invalid(
                "yaw_rate_threshold",
                format!("must be finite and positive, got {yaw_rate_threshold}"),
            ));
        }
        Ok(MotionModel { yaw_rate_threshold })
    }
    /// Advance `pose` by `dt` seconds under `control`, without noise.
    pub fn propagate(&self, pose: &Pose, control: &ControlInput, dt: f64) -> Pose {
        let v = control.velocity;
        let yaw_rate = control.yaw_rate;
        if yaw_rate.abs() < self.yaw_rate_threshold {
            Pose::new(
                pose.x + v * dt * pose.theta.cos(),
                pose.y + v * dt * pose.theta.sin(),
                pose.theta,
            )
        } else {
            let theta = pose.theta + yaw_rate * dt;
            Pose::new(
                pose.x + v / yaw_rate * (theta.sin() - pose.theta.sin()),
                pose.y + v / yaw_rate * (pose.theta.cos() - theta.cos()),
                theta,
            )
        }
    }
}

/// Zero-mean Gaussian noise on each pose dimension.
#[derive(Clone, Copy, Debug)]
pub struct PoseNoise {
    x: Normal<f64>,
    y: Normal<f64>,
    theta: Normal<f64>,
}
impl PoseNoise {
    pub fn new(std: PoseStdDev) -> Result<Self, FilterError> {
        Self::centered_on(&Pose::default(), std)
    }
    /// Gaussian centered on `mean` rather than zero; used to seed the initial particle cloud.
    pub fn centered_on(mean: &Pose, std: PoseStdDev) -> Result<Self, FilterError> {
        std.validate("pose_std")?;
        let normal = |mean: f64, std_dev: f64| {
            Normal::new(mean, std_dev)
                .map_err(|e| FilterError::invalid("pose_std", e.to_string()))
        };
        Ok(PoseNoise {
            x: normal(mean.x, std.x)?,
            y: normal(mean.y, std.y)?,
            theta: normal(mean.theta, std.theta)?,
        })
    }
    /// Draw one independent sample per dimension.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Pose {
        Pose::new(
            self.x.sample(rng),
            self.y.sample(rng),
            self.theta.sample(rng),
        )
    }
    /// Add an independent draw of noise to each dimension of `pose`.
    pub fn perturb<R: Rng + ?Sized>(&self, pose: &mut Pose, rng: &mut R) {
        let noise = self.sample(rng);
        pose.x += noise.x;
        pose.y += noise.y;
        pose.theta += noise.theta;
    }
}
