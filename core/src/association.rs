//! Nearest-neighbor data association.
//!
//! Each map-frame observation is paired with the closest predicted landmark by Euclidean distance. The
//! comparison is strict, so when two predictions are equally close the one that appears first wins, and a distance
//! that is not a number never wins. An observation with nothing to compare against is left unmatched (`None`)
//! rather than failing.
use nalgebra::distance;

use crate::measurements::LandmarkObservation;

/// Index into `predicted` of the nearest prediction for every observation, in observation order.
///
/// # Arguments
/// * `predicted` - Map-frame landmark predictions for a single particle.
/// * `observations` - Map-frame observations for the same particle.
///
/// # Returns
/// A vector the same length as `observations`. `None` marks an observation with no match, which happens when
/// `predicted` is empty or no distance is below `f64::MAX`.
pub fn associate(
    predicted: &[LandmarkObservation],
    observations: &[LandmarkObservation],
) -> Vec<Option<usize>> {
    observations
        .iter()
        .map(|observation| {
            let position = observation.position();
            let mut best: Option<(usize, f64)> = None;
            for (index, prediction) in predicted.iter().enumerate() {
                let d = distance(&position, &prediction.position());
                let min_distance = best.map_or(f64::MAX, |(_, min_distance)| min_distance);
                if d < min_distance {
                    best = Some((index, d));
                }
            }
            best.map(|(index, _)| index)
        })
        .collect()
}

/// Same as [associate], reporting the matched landmark ids instead of indices.
pub fn associate_ids(
    predicted: &[LandmarkObservation],
    observations: &[LandmarkObservation],
) -> Vec<Option<u32>> {
    associate(predicted, observations)
        .into_iter()
        .map(|matched| matched.map(|index| predicted[index].id))
        .collect()
}
