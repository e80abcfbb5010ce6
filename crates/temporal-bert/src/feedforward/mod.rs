//! Position-wise feed-forward sublayer.

pub mod standard;

pub use crate::feedforward::standard::StdFeedForward;
