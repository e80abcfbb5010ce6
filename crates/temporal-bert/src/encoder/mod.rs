//! Encoder stack: configuration, transformer blocks, and the full temporal
//! encoder.

pub mod config;
pub mod encoder_layer;
pub mod output;
mod transformer_encoder;

pub use config::{BlockPolicy, EncoderConfig};
pub use encoder_layer::{EncoderLayer, LayerOutput};
pub use output::EncoderOutput;
pub use transformer_encoder::TemporalEncoder;
