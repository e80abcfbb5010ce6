//! Multi-head scaled dot-product self-attention.

pub mod self_attention;

pub use crate::attention::self_attention::{AttentionOutput, EncoderSelfAttention};
