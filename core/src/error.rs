//! Error type shared by the filter operations.
use thiserror::Error;

/// An error raised by a particle filter operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    /// An operation other than `init` was called before the particle set was initialized.
    #[error("The particle filter has not been initialized")]
    NotInitialized,

    /// A caller-supplied parameter is outside its valid domain.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// All particle weights are zero, or at least one is non-finite, so weight-proportional
    /// sampling is undefined.
    #[error("Particle weights are degenerate (all zero or non-finite)")]
    DegenerateWeights,
}

impl FilterError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        FilterError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
