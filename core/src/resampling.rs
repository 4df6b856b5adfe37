//! Weight-proportional resampling.
//!
//! Every strategy returns the indices of the particles that survive into the next generation (with repetition)
//! rather than the particles themselves, so the caller can build the new generation in one pass and swap it in
//! whole. Each function rejects weights it cannot sample from with [`FilterError::DegenerateWeights`]: all zero,
//! any negative, or any non-finite value. [`uniform_resample`] is the fallback for that case.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Step distribution of the resampling wheel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelStep {
    /// Step drawn from $U[0, 2 w_{max})$.
    #[default]
    Doubled,
    /// Step drawn from $U[0, w_{max})$.
    Canonical,
}
impl WheelStep {
    /// Upper bound of the step for weights scaled to a maximum of 1.
    fn upper_bound(&self) -> f64 {
        match self {
            WheelStep::Doubled => 2.0,
            WheelStep::Canonical => 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleResamplingStrategy {
    /// Resampling wheel: one shared walk around the circle of weights.
    #[default]
    Wheel,
    /// Evenly spaced pointers with a single random offset.
    Systematic,
    /// Independent draws from the weight distribution.
    Multinomial,
}
impl ParticleResamplingStrategy {
    /// Draw `n` indices into `weights` in proportion to the weights.
    pub fn resample<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        n: usize,
        wheel_step: WheelStep,
        rng: &mut R,
    ) -> Result<Vec<usize>, FilterError> {
        match self {
            ParticleResamplingStrategy::Wheel => wheel_resample(weights, n, wheel_step, rng),
            ParticleResamplingStrategy::Systematic => systematic_resample(weights, n, rng),
            ParticleResamplingStrategy::Multinomial => multinomial_resample(weights, n, rng),
        }
    }
}

/// Weights divided by their maximum, so they lie in [0, 1] and sums over them cannot overflow.
fn scaled_weights(weights: &[f64]) -> Result<Vec<f64>, FilterError> {
    if weights.is_empty() {
        return Err(FilterError::invalid("weights", "cannot resample an empty particle set"));
    }
    let mut max_weight = 0.0_f64;
    for &w in weights {
        if !w.is_finite() || w < 0.0 {
            return Err(FilterError::DegenerateWeights);
        }
        max_weight = max_weight.max(w);
    }
    if max_weight <= 0.0 {
        return Err(FilterError::DegenerateWeights);
    }
    Ok(weights.iter().map(|w| w / max_weight).collect())
}

/// Resampling wheel.
///
/// Starts at a uniformly random index with an accumulator `beta = 0`. For each draw, `beta` grows by a uniform step
/// (see [WheelStep]); while it exceeds the weight under the current index, that weight is subtracted and the index
/// advances around the circle. The particle under the index when the loop stops is drawn. All `n` draws share the
/// same walk. The walk runs on weights scaled so the largest is 1, which leaves the draw distribution unchanged.
pub fn wheel_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    step: WheelStep,
    rng: &mut R,
) -> Result<Vec<usize>, FilterError> {
    let weights = scaled_weights(weights)?;
    let len = weights.len();
    let upper = step.upper_bound();
    let mut index = rng.random_range(0..len);
    let mut beta = 0.0;
    let mut indices = Vec::with_capacity(n);
    for _ in 0..n {
        beta += rng.random_range(0.0..upper);
        while beta > weights[index] {
            beta -= weights[index];
            index = (index + 1) % len;
        }
        indices.push(index);
    }
    Ok(indices)
}

/// Systematic resampling: pointers at `u + k * W / n` for a single `u ~ U[0, W / n)`.
pub fn systematic_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Result<Vec<usize>, FilterError> {
    let weights = scaled_weights(weights)?;
    if n == 0 {
        return Ok(Vec::new());
    }
    let total: f64 = weights.iter().sum();
    let step = total / n as f64;
    let offset = rng.random_range(0.0..step);
    let mut indices = Vec::with_capacity(n);
    let mut index = 0;
    let mut cumulative = weights[0];
    for k in 0..n {
        let pointer = offset + k as f64 * step;
        while pointer >= cumulative && index < weights.len() - 1 {
            index += 1;
            cumulative += weights[index];
        }
        indices.push(index);
    }
    Ok(indices)
}

/// Multinomial resampling: `n` independent draws by inverting the cumulative weights.
pub fn multinomial_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Result<Vec<usize>, FilterError> {
    let weights = scaled_weights(weights)?;
    let cumulative: Vec<f64> = weights
        .iter()
        .scan(0.0, |acc, &w| {
            *acc += w;
            Some(*acc)
        })
        .collect();
    let total = cumulative[cumulative.len() - 1];
    let last = weights.len() - 1;
    Ok((0..n)
        .map(|_| {
            let u = rng.random_range(0.0..total);
            cumulative.partition_point(|&c| c <= u).min(last)
        })
        .collect())
}

/// `n` indices drawn uniformly from `0..len`, ignoring weights.
pub fn uniform_resample<R: Rng + ?Sized>(
    len: usize,
    n: usize,
    rng: &mut R,
) -> Result<Vec<usize>, FilterError> {
    if len == 0 {
        return Err(FilterError::invalid("weights", "cannot resample an empty particle set"));
    }
    Ok((0..n).map(|_| rng.random_range(0..len)).collect())
}
