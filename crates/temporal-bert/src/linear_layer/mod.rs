//! Dense affine projection used by every sublayer of the encoder.
//!
//! All weight matrices are stored in `[OutFeatures, InFeatures]` layout, the
//! same layout a checkpoint exporter writes, so `matmul` computes
//! `x @ W^T + b`.

mod linear_layer;

pub use linear_layer::LinearLayer;

#[cfg(test)]
mod tests;
