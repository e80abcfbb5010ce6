//! Error types for the temporal encoder.

use thiserror::Error;

/// Errors raised while building or running a temporal encoder.
///
/// Every variant reflects a caller contract violation or an ill-conditioned
/// input. None of them is retryable.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// A tensor did not have the dimensions the encoder was configured for.
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Invalid construction parameters.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// NaN or Inf detected while computing a forward pass.
    #[error("Numerical instability in {stage} (layer {layer})")]
    NumericalInstability { stage: &'static str, layer: usize },

    /// A state dict did not contain a required tensor.
    #[error("Missing parameter '{0}' in state dict")]
    MissingParameter(String),

    /// An internal reshape failed.
    #[error(transparent)]
    Layout(#[from] ndarray::ShapeError),
}

impl EncoderError {
    pub(crate) fn shape(
        context: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        EncoderError::ShapeMismatch {
            context: context.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        EncoderError::ConfigError(msg.into())
    }
}

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = EncoderError::shape("features", [2, 4, 8], [2, 5, 8]);
        assert_eq!(
            err.to_string(),
            "Shape mismatch in features: expected [2, 4, 8], got [2, 5, 8]"
        );
    }

    #[test]
    fn test_layout_error_converts() {
        let result: EncoderResult<ndarray::Array2<f32>> =
            ndarray::Array2::from_shape_vec((2, 3), vec![0.0; 5]).map_err(EncoderError::from);
        assert!(matches!(result, Err(EncoderError::Layout(_))));
    }
}
