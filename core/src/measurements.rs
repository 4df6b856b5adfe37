//! Landmark observations and the observation model used to weight particles.
//!
//! A range sensor reports the positions of nearby landmarks relative to the vehicle. For a given particle those
//! observations are moved into the map frame using the particle's pose, paired with nearby map landmarks by
//! [`crate::association::associate`], and scored with an axis-aligned bivariate Gaussian:
//!
//! $$
//! w = \frac{1}{2 \pi \sigma_x \sigma_y} \exp\left( -\left( \frac{(\mu_x - x)^2}{2 \sigma_x^2} + \frac{(\mu_y - y)^2}{2 \sigma_y^2} \right) \right)
//! $$
//!
//! where $(\mu_x, \mu_y)$ is the matched landmark and $(x, y)$ the transformed observation. Observations are treated
//! as conditionally independent given the pose, so a particle's weight is the product over its matched observations.
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::association::associate;
use crate::error::FilterError;
use crate::map::Map;
use crate::particle::Particle;
use crate::{LandmarkStdDev, Pose};

/// A landmark position, either as observed from the vehicle or as predicted from the map.
///
/// The frame of `x`/`y` depends on where the value sits in the pipeline: observations from the sensor are in the
/// vehicle frame, transformed observations and predictions are in the map frame. The `id` is the observation's own
/// identity; association results are returned separately and never written back into it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkObservation {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}
impl LandmarkObservation {
    pub fn new(id: u32, x: f64, y: f64) -> Self {
        LandmarkObservation { id, x, y }
    }
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Transform a vehicle-frame observation into the map frame as seen from `pose`.
pub fn to_map_frame(pose: &Pose, observation: &LandmarkObservation) -> LandmarkObservation {
    let p = pose.isometry() * observation.position();
    LandmarkObservation::new(observation.id, p.x, p.y)
}

/// Transform a map-frame point into the vehicle frame of `pose`. Inverse of [to_map_frame].
pub fn to_vehicle_frame(pose: &Pose, point: &Point2<f64>) -> Point2<f64> {
    pose.isometry().inverse_transform_point(point)
}

/// Map landmarks inside the sensor box around `pose`, as map-frame predictions.
pub fn predicted_landmarks(map: &Map, pose: &Pose, sensor_range: f64) -> Vec<LandmarkObservation> {
    map.landmarks_in_box(&Point2::new(pose.x, pose.y), sensor_range)
        .map(|l| LandmarkObservation::new(l.id, l.x, l.y))
        .collect()
}

/// What to do with an observation that has no landmark to pair with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedObservationPolicy {
    /// Leave the particle's weight unaffected by the observation.
    #[default]
    Skip,
    /// Drive the particle's weight to zero.
    ZeroWeight,
}

/// Axis-aligned Gaussian landmark observation model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianLandmarkModel {
    std: LandmarkStdDev,
    normalizer: f64,
}
impl GaussianLandmarkModel {
    /// Both standard deviations must be finite and strictly positive, and large enough that the peak density is
    /// finite.
    pub fn new(std: LandmarkStdDev) -> Result<Self, FilterError> {
        if !(std.x.is_finite() && std.y.is_finite() && std.x > 0.0 && std.y > 0.0) {
            return Err(FilterError::invalid(
                "landmark_std",
                format!("standard deviations must be finite and positive, got {std:?}"),
            ));
        }
        let normalizer = 1.0 / (2.0 * std::f64::consts::PI * std.x * std.y);
        if !normalizer.is_finite() {
            return Err(FilterError::invalid(
                "landmark_std",
                format!("standard deviations too small for a finite density, got {std:?}"),
            ));
        }
        Ok(GaussianLandmarkModel { std, normalizer })
    }
    pub fn std(&self) -> LandmarkStdDev {
        self.std
    }
    /// Density at a perfect match, $1 / (2 \pi \sigma_x \sigma_y)$.
    pub fn peak_likelihood(&self) -> f64 {
        self.normalizer
    }
    pub fn likelihood(&self, predicted: &Point2<f64>, observed: &Point2<f64>) -> f64 {
        let dx = predicted.x - observed.x;
        let dy = predicted.y - observed.y;
        let exponent =
            dx * dx / (2.0 * self.std.x * self.std.x) + dy * dy / (2.0 * self.std.y * self.std.y);
        self.normalizer * (-exponent).exp()
    }
}

/// Scores particles against one timestep's observations.
#[derive(Clone, Copy, Debug)]
pub struct ObservationWeighter {
    sensor_range: f64,
    model: GaussianLandmarkModel,
    unmatched: UnmatchedObservationPolicy,
}
impl ObservationWeighter {
    pub fn new(
        sensor_range: f64,
        landmark_std: LandmarkStdDev,
        unmatched: UnmatchedObservationPolicy,
    ) -> Result<Self, FilterError> {
        if !sensor_range.is_finite() || sensor_range <= 0.0 {
            return Err(FilterError::invalid(
                "sensor_range",
                format!("must be finite and positive, got {sensor_range}"),
            ));
        }
        Ok(ObservationWeighter {
            sensor_range,
            model: GaussianLandmarkModel::new(landmark_std)?,
            unmatched,
        })
    }
    pub fn model(&self) -> &GaussianLandmarkModel {
        &self.model
    }
    /// Recompute `particle.weight` from scratch for the given vehicle-frame observations, and record the matched
    /// landmark ids and map-frame sensed positions as the particle's diagnostics.
    pub fn weigh(&self, particle: &mut Particle, observations: &[LandmarkObservation], map: &Map) {
        let predictions = predicted_landmarks(map, &particle.pose, self.sensor_range);
        let transformed: Vec<LandmarkObservation> = observations
            .iter()
            .map(|o| to_map_frame(&particle.pose, o))
            .collect();
        let matches = associate(&predictions, &transformed);

        let mut weight = 1.0;
        let mut ids = Vec::with_capacity(transformed.len());
        let mut sensed = Vec::with_capacity(transformed.len());
        for (observation, matched) in transformed.iter().zip(matches) {
            match matched {
                Some(index) => {
                    let landmark = &predictions[index];
                    weight *= self
                        .model
                        .likelihood(&landmark.position(), &observation.position());
                    ids.push(landmark.id);
                    sensed.push(observation.position());
                }
                None => {
                    if self.unmatched == UnmatchedObservationPolicy::ZeroWeight {
                        weight = 0.0;
                    }
                }
            }
        }
        particle.weight = weight;
        particle.set_associations_unchecked(ids, sensed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapLandmark;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_to_map_frame_translation_only() {
        let pose = Pose::new(4.0, 5.0, 0.0);
        let obs = to_map_frame(&pose, &LandmarkObservation::new(3, 2.0, 2.0));
        assert_eq!(obs.id, 3);
        assert_approx_eq!(obs.x, 6.0, 1e-12);
        assert_approx_eq!(obs.y, 7.0, 1e-12);
    }

    #[test]
    fn test_to_map_frame_rotated() {
        // Worked example: particle at (4, 5) facing -90 degrees.
        let pose = Pose::new(4.0, 5.0, -std::f64::consts::FRAC_PI_2);
        let obs = to_map_frame(&pose, &LandmarkObservation::new(0, 2.0, 2.0));
        assert_approx_eq!(obs.x, 6.0, 1e-12);
        assert_approx_eq!(obs.y, 3.0, 1e-12);
        let obs = to_map_frame(&pose, &LandmarkObservation::new(0, 0.0, -4.0));
        assert_approx_eq!(obs.x, 0.0, 1e-12);
        assert_approx_eq!(obs.y, 5.0, 1e-12);
    }

    #[test]
    fn test_frame_transform_is_invertible() {
        let poses = [
            Pose::new(0.0, 0.0, 0.0),
            Pose::new(-3.2, 7.5, 1.1),
            Pose::new(102.4, -55.0, -2.9),
        ];
        let points = [(1.0, 0.0), (-4.5, 2.25), (30.0, -12.0)];
        for pose in &poses {
            for &(x, y) in &points {
                let map_point = to_map_frame(pose, &LandmarkObservation::new(0, x, y)).position();
                let back = to_vehicle_frame(pose, &map_point);
                assert_approx_eq!(back.x, x, 1e-9);
                assert_approx_eq!(back.y, y, 1e-9);
            }
        }
    }

    #[test]
    fn test_gaussian_peak() {
        let model = GaussianLandmarkModel::new(LandmarkStdDev::new(0.3, 0.3)).unwrap();
        let p = Point2::new(5.0, 0.0);
        assert_approx_eq!(model.likelihood(&p, &p), 1.0 / (2.0 * std::f64::consts::PI * 0.09), 1e-12);
        assert_approx_eq!(model.peak_likelihood(), model.likelihood(&p, &p), 1e-15);
    }

    #[test]
    fn test_gaussian_falls_off() {
        let model = GaussianLandmarkModel::new(LandmarkStdDev::new(0.3, 0.5)).unwrap();
        let predicted = Point2::new(0.0, 0.0);
        let near = model.likelihood(&predicted, &Point2::new(0.1, 0.1));
        let far = model.likelihood(&predicted, &Point2::new(1.0, 1.0));
        assert!(near < model.peak_likelihood());
        assert!(far < near);
        let expected = model.peak_likelihood()
            * (-(1.0 / (2.0 * 0.09) + 1.0 / (2.0 * 0.25_f64))).exp();
        assert_approx_eq!(far, expected, 1e-12);
    }

    #[test]
    fn test_gaussian_rejects_zero_std() {
        assert!(GaussianLandmarkModel::new(LandmarkStdDev::new(0.0, 0.3)).is_err());
        assert!(GaussianLandmarkModel::new(LandmarkStdDev::new(0.3, -0.3)).is_err());
        // Product of the deviations underflows to zero.
        assert!(GaussianLandmarkModel::new(LandmarkStdDev::new(1e-170, 1e-170)).is_err());
        assert!(GaussianLandmarkModel::new(LandmarkStdDev::new(3.9e-78, 3.9e-78)).is_ok());
    }

    #[test]
    fn test_weigher_rejects_bad_range() {
        let std = LandmarkStdDev::new(0.3, 0.3);
        assert!(ObservationWeighter::new(0.0, std, UnmatchedObservationPolicy::Skip).is_err());
        assert!(ObservationWeighter::new(-5.0, std, UnmatchedObservationPolicy::Skip).is_err());
        assert!(ObservationWeighter::new(f64::NAN, std, UnmatchedObservationPolicy::Skip).is_err());
    }

    #[test]
    fn test_weigh_perfect_match() {
        let map = Map::new(vec![MapLandmark::new(1, 5.0, 0.0)]);
        let weigher =
            ObservationWeighter::new(10.0, LandmarkStdDev::new(0.3, 0.3), UnmatchedObservationPolicy::Skip)
                .unwrap();
        let mut particle = Particle::new(0, Pose::new(0.0, 0.0, 0.0), 0.25);
        weigher.weigh(&mut particle, &[LandmarkObservation::new(0, 5.0, 0.0)], &map);
        assert_approx_eq!(particle.weight, 1.0 / (2.0 * std::f64::consts::PI * 0.09), 1e-12);
        assert_eq!(particle.associations(), &[1]);
        assert_approx_eq!(particle.sensed_positions()[0].x, 5.0, 1e-12);
    }

    #[test]
    fn test_weigh_product_over_observations() {
        let map = Map::new(vec![MapLandmark::new(1, 5.0, 0.0), MapLandmark::new(2, 0.0, 5.0)]);
        let weigher =
            ObservationWeighter::new(10.0, LandmarkStdDev::new(0.3, 0.3), UnmatchedObservationPolicy::Skip)
                .unwrap();
        let peak = weigher.model().peak_likelihood();
        let mut particle = Particle::new(0, Pose::new(0.0, 0.0, 0.0), 1.0);
        let observations = [
            LandmarkObservation::new(0, 5.0, 0.0),
            LandmarkObservation::new(1, 0.0, 5.0),
        ];
        weigher.weigh(&mut particle, &observations, &map);
        assert_approx_eq!(particle.weight, peak * peak, 1e-9);
        assert_eq!(particle.associations(), &[1, 2]);
    }

    #[test]
    fn test_weigh_unmatched_policies() {
        // The only landmark is outside the sensor box, so nothing can be matched.
        let map = Map::new(vec![MapLandmark::new(1, 50.0, 0.0)]);
        let observations = [LandmarkObservation::new(0, 5.0, 0.0)];
        let std = LandmarkStdDev::new(0.3, 0.3);

        let skip = ObservationWeighter::new(10.0, std, UnmatchedObservationPolicy::Skip).unwrap();
        let mut particle = Particle::new(0, Pose::default(), 0.5);
        skip.weigh(&mut particle, &observations, &map);
        assert_approx_eq!(particle.weight, 1.0, 1e-15);
        assert!(particle.associations().is_empty());

        let zero = ObservationWeighter::new(10.0, std, UnmatchedObservationPolicy::ZeroWeight).unwrap();
        let mut particle = Particle::new(0, Pose::default(), 0.5);
        zero.weigh(&mut particle, &observations, &map);
        assert_eq!(particle.weight, 0.0);
    }

    #[test]
    fn test_weigh_replaces_stale_diagnostics() {
        let map = Map::new(vec![MapLandmark::new(4, 2.0, 0.0)]);
        let weigher =
            ObservationWeighter::new(10.0, LandmarkStdDev::new(0.3, 0.3), UnmatchedObservationPolicy::Skip)
                .unwrap();
        let mut particle = Particle::new(0, Pose::default(), 1.0);
        particle
            .set_associations(vec![9, 9, 9], vec![Point2::origin(); 3])
            .unwrap();
        weigher.weigh(&mut particle, &[LandmarkObservation::new(0, 2.1, 0.0)], &map);
        assert_eq!(particle.associations(), &[4]);
        assert_eq!(particle.sensed_positions().len(), 1);
    }
}
