//! Masked self-attention temporal encoder for clip-level action recognition.
//!
//! A clip arrives as an ordered sequence of per-frame feature vectors from a
//! convolutional backbone. The encoder prepends a learned classification
//! token, optionally corrupts a random subset of positions while training,
//! and runs the sequence through a stack of transformer blocks. The output
//! at position 0 feeds a linear classifier; the remaining positions and the
//! corruption mask feed reconstruction and distillation losses.
//!
//! ```no_run
//! use temporal_bert::prelude::*;
//! use ndarray::Array3;
//!
//! # fn main() -> Result<(), EncoderError> {
//! let config = EncoderConfig::new(512, 8).with_block_policy(BlockPolicy::PreNorm);
//! let encoder = TemporalEncoder::from_seed(config, 0)?;
//! let features = Array3::<f32>::zeros((2, 8, 512));
//! let output = encoder.forward_eval(&features.view())?;
//! assert_eq!(output.sequence_output.dim(), (2, 9, 512));
//! # Ok(())
//! # }
//! ```

pub mod activations;
pub mod attention;
pub mod distillation;
pub mod dropout;
pub mod embeddings;
pub mod encoder;
pub mod error;
pub mod feedforward;
pub mod head;
pub mod linear_layer;
pub mod masking;
pub mod mode;
pub mod model;
pub mod normalization;
pub mod pooling;
pub mod utils;
pub mod weights;

// Re-export commonly used items
pub use crate::{
    activations::Activation,
    attention::EncoderSelfAttention,
    embeddings::TemporalEmbeddings,
    encoder::{BlockPolicy, EncoderConfig, EncoderLayer, EncoderOutput, TemporalEncoder},
    error::{EncoderError, EncoderResult},
    feedforward::StdFeedForward,
    head::ClassificationHead,
    linear_layer::LinearLayer,
    masking::{CorruptionMask, MaskingPolicy},
    mode::ForwardMode,
    model::{ClassifierOutput, TemporalClassifier},
    normalization::{LayerNorm, Normalization},
    pooling::l2_normalize,
    weights::{Parameterized, StateDict},
};

pub mod prelude {
    pub use crate::distillation::{feature_mse, masked_mse};
    pub use crate::encoder::{BlockPolicy, EncoderConfig, EncoderOutput, TemporalEncoder};
    pub use crate::error::{EncoderError, EncoderResult};
    pub use crate::masking::CorruptionMask;
    pub use crate::mode::ForwardMode;
    pub use crate::model::{ClassifierOutput, TemporalClassifier};
    pub use crate::weights::Parameterized;
}
