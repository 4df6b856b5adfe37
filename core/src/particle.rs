//! Particles, their diagnostic annotations, and strategies for reducing a particle set to a single pose estimate.
use std::fmt::{self, Display};

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::{Pose, wrap_to_pi};

/// A weighted hypothesis of the vehicle pose.
///
/// Besides the pose and weight, a particle can carry diagnostics describing its most recent weighting pass: the ids
/// of the landmarks its observations were matched to, and where those observations landed in the map frame. They
/// are purely for reporting and play no part in the filter itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    /// Unique within one generation of the particle set
    pub id: usize,
    pub pose: Pose,
    /// Unnormalized importance weight; never negative
    pub weight: f64,
    associations: Vec<u32>,
    sensed: Vec<Point2<f64>>,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.pose.x)
            .field("y", &self.pose.y)
            .field("theta", &self.pose.theta)
            .field("weight", &self.weight)
            .field("associations", &self.associations.len())
            .finish()
    }
}
impl Particle {
    pub fn new(id: usize, pose: Pose, weight: f64) -> Particle {
        Particle {
            id,
            pose,
            weight,
            associations: Vec::new(),
            sensed: Vec::new(),
        }
    }
    /// Replace the particle's diagnostics with the given landmark ids and map-frame sensed positions.
    ///
    /// Any previously attached values are discarded first. The two sequences are parallel and must have the same
    /// length.
    pub fn set_associations(
        &mut self,
        associations: Vec<u32>,
        sensed: Vec<Point2<f64>>,
    ) -> Result<(), FilterError> {
        if associations.len() != sensed.len() {
            return Err(FilterError::invalid(
                "associations",
                format!(
                    "{} landmark ids but {} sensed positions",
                    associations.len(),
                    sensed.len()
                ),
            ));
        }
        self.set_associations_unchecked(associations, sensed);
        Ok(())
    }
    pub(crate) fn set_associations_unchecked(
        &mut self,
        associations: Vec<u32>,
        sensed: Vec<Point2<f64>>,
    ) {
        self.associations = associations;
        self.sensed = sensed;
    }
    pub fn clear_associations(&mut self) {
        self.associations.clear();
        self.sensed.clear();
    }
    /// Landmark ids matched during the last weighting pass, in observation order.
    pub fn associations(&self) -> &[u32] {
        &self.associations
    }
    /// Map-frame positions of the matched observations, parallel to [Particle::associations].
    pub fn sensed_positions(&self) -> &[Point2<f64>] {
        &self.sensed
    }
    pub fn sense_x(&self) -> Vec<f64> {
        self.sensed.iter().map(|p| p.x).collect()
    }
    pub fn sense_y(&self) -> Vec<f64> {
        self.sensed.iter().map(|p| p.y).collect()
    }
    /// Landmark ids joined by `separator`, e.g. `"1 4 7"`.
    pub fn associations_string(&self, separator: &str) -> String {
        join(self.associations.iter(), separator)
    }
    pub fn sense_x_string(&self, separator: &str) -> String {
        join(self.sensed.iter().map(|p| p.x), separator)
    }
    pub fn sense_y_string(&self, separator: &str) -> String {
        join(self.sensed.iter().map(|p| p.y), separator)
    }
}

fn join<T: Display>(values: impl Iterator<Item = T>, separator: &str) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// How a particle set is reduced to a single pose estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleAveragingStrategy {
    /// Weight-averaged pose; heading is averaged on the unit circle.
    WeightedAverage,
    /// Plain mean over all particles.
    UnweightedAverage,
    /// Pose of the single heaviest particle, or the plain mean when no weight is a number.
    #[default]
    HighestWeight,
}
impl ParticleAveragingStrategy {
    /// Pose estimate and its 3x3 covariance (x, y, theta) for the given particles.
    pub fn estimate(&self, particles: &[Particle]) -> Result<(Pose, Matrix3<f64>), FilterError> {
        if particles.is_empty() {
            return Err(FilterError::NotInitialized);
        }
        match self {
            ParticleAveragingStrategy::WeightedAverage => {
                let total: f64 = particles.iter().map(|p| p.weight).sum();
                if total > 0.0 && total.is_finite() {
                    Ok(weighted_moments(particles, |p| p.weight / total))
                } else {
                    // No usable weights; every hypothesis counts equally.
                    let n = particles.len() as f64;
                    Ok(weighted_moments(particles, |_| 1.0 / n))
                }
            }
            ParticleAveragingStrategy::UnweightedAverage => {
                let n = particles.len() as f64;
                Ok(weighted_moments(particles, |_| 1.0 / n))
            }
            ParticleAveragingStrategy::HighestWeight => match highest_weight(particles) {
                Some(best) => Ok((best.pose, Matrix3::zeros())),
                None => {
                    // Every weight is NaN; fall back to the plain mean.
                    let n = particles.len() as f64;
                    Ok(weighted_moments(particles, |_| 1.0 / n))
                }
            },
        }
    }
}

/// The heaviest particle; the first one wins on ties. NaN weights are never chosen.
pub fn highest_weight(particles: &[Particle]) -> Option<&Particle> {
    let mut best: Option<&Particle> = None;
    for p in particles.iter().filter(|p| !p.weight.is_nan()) {
        if best.is_none_or(|b| p.weight > b.weight) {
            best = Some(p);
        }
    }
    best
}

fn weighted_moments<F: Fn(&Particle) -> f64>(particles: &[Particle], weight: F) -> (Pose, Matrix3<f64>) {
    let mut x = 0.0;
    let mut y = 0.0;
    let mut sin = 0.0;
    let mut cos = 0.0;
    for p in particles {
        let w = weight(p);
        x += w * p.pose.x;
        y += w * p.pose.y;
        sin += w * p.pose.theta.sin();
        cos += w * p.pose.theta.cos();
    }
    let mean = Pose::new(x, y, sin.atan2(cos));
    let mut cov = Matrix3::<f64>::zeros();
    for p in particles {
        let diff = Vector3::new(
            p.pose.x - mean.x,
            p.pose.y - mean.y,
            wrap_to_pi(p.pose.theta - mean.theta),
        );
        cov += weight(p) * diff * diff.transpose();
    }
    (mean, cov)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn particles(poses_and_weights: &[(f64, f64, f64, f64)]) -> Vec<Particle> {
        poses_and_weights
            .iter()
            .enumerate()
            .map(|(i, &(x, y, theta, w))| Particle::new(i, Pose::new(x, y, theta), w))
            .collect()
    }

    #[test]
    fn test_set_associations_clears_previous() {
        let mut p = Particle::new(0, Pose::default(), 1.0);
        p.set_associations(vec![1, 2, 3], vec![Point2::new(1.0, 2.0); 3])
            .unwrap();
        p.set_associations(vec![5], vec![Point2::new(-1.5, 4.0)]).unwrap();
        assert_eq!(p.associations(), &[5]);
        assert_eq!(p.sense_x(), vec![-1.5]);
        assert_eq!(p.sense_y(), vec![4.0]);
    }

    #[test]
    fn test_set_associations_length_mismatch() {
        let mut p = Particle::new(0, Pose::default(), 1.0);
        p.set_associations(vec![1], vec![Point2::new(1.0, 1.0)]).unwrap();
        let result = p.set_associations(vec![1, 2], vec![Point2::new(1.0, 2.0)]);
        assert!(matches!(result, Err(FilterError::InvalidParameter { .. })));
        // A rejected call leaves the previous values in place.
        assert_eq!(p.associations(), &[1]);
    }

    #[test]
    fn test_association_strings() {
        let mut p = Particle::new(0, Pose::default(), 1.0);
        assert_eq!(p.associations_string(" "), "");
        p.set_associations(
            vec![3, 14, 15],
            vec![Point2::new(1.5, -2.0), Point2::new(0.25, 3.0), Point2::new(10.0, 7.5)],
        )
        .unwrap();
        assert_eq!(p.associations_string(" "), "3 14 15");
        assert_eq!(p.sense_x_string(","), "1.5,0.25,10");
        assert_eq!(p.sense_y_string(" "), "-2 3 7.5");
        p.clear_associations();
        assert!(p.associations().is_empty());
        assert!(p.sensed_positions().is_empty());
    }

    #[test]
    fn test_highest_weight() {
        let ps = particles(&[(0.0, 0.0, 0.0, 0.2), (1.0, 1.0, 0.0, 0.7), (2.0, 2.0, 0.0, 0.7)]);
        let (pose, cov) = ParticleAveragingStrategy::HighestWeight.estimate(&ps).unwrap();
        assert_eq!(pose, Pose::new(1.0, 1.0, 0.0));
        assert_eq!(cov, Matrix3::zeros());
    }

    #[test]
    fn test_highest_weight_skips_nan() {
        let ps = particles(&[(0.0, 0.0, 0.0, f64::NAN), (1.0, 0.0, 0.0, 0.1)]);
        assert_eq!(highest_weight(&ps).map(|p| p.id), Some(1));
    }

    #[test]
    fn test_weighted_average() {
        let ps = particles(&[(0.0, 0.0, 0.1, 1.0), (4.0, 8.0, 0.1, 3.0)]);
        let (pose, cov) = ParticleAveragingStrategy::WeightedAverage.estimate(&ps).unwrap();
        assert_approx_eq!(pose.x, 3.0, 1e-12);
        assert_approx_eq!(pose.y, 6.0, 1e-12);
        assert_approx_eq!(pose.theta, 0.1, 1e-12);
        // var x = 0.25 * 9 + 0.75 * 1
        assert_approx_eq!(cov[(0, 0)], 3.0, 1e-12);
        assert_approx_eq!(cov[(2, 2)], 0.0, 1e-12);
    }

    #[test]
    fn test_heading_average_wraps() {
        let pi = std::f64::consts::PI;
        let ps = particles(&[(0.0, 0.0, pi - 0.1, 1.0), (0.0, 0.0, -pi + 0.1, 1.0)]);
        let (pose, cov) = ParticleAveragingStrategy::UnweightedAverage.estimate(&ps).unwrap();
        assert_approx_eq!(pose.theta.abs(), pi, 1e-9);
        assert_approx_eq!(cov[(2, 2)], 0.01, 1e-9);
    }

    #[test]
    fn test_weighted_average_with_zero_weights_falls_back_to_mean() {
        let ps = particles(&[(0.0, 0.0, 0.0, 0.0), (2.0, 4.0, 0.0, 0.0)]);
        let (pose, _) = ParticleAveragingStrategy::WeightedAverage.estimate(&ps).unwrap();
        assert_approx_eq!(pose.x, 1.0, 1e-12);
        assert_approx_eq!(pose.y, 2.0, 1e-12);
    }

    #[test]
    fn test_highest_weight_all_nan_falls_back_to_mean() {
        let ps = particles(&[(0.0, 0.0, 0.0, f64::NAN), (2.0, 4.0, 0.0, f64::NAN)]);
        assert!(highest_weight(&ps).is_none());
        let (pose, _) = ParticleAveragingStrategy::HighestWeight.estimate(&ps).unwrap();
        assert_approx_eq!(pose.x, 1.0, 1e-12);
        assert_approx_eq!(pose.y, 2.0, 1e-12);
    }

    #[test]
    fn test_estimate_empty() {
        assert_eq!(
            ParticleAveragingStrategy::WeightedAverage.estimate(&[]),
            Err(FilterError::NotInitialized)
        );
    }
}
