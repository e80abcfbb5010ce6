//! Normalization strategies for encoder blocks.

pub mod layer_norm;

pub use crate::normalization::layer_norm::LayerNorm;

use ndarray::{Array3, ArrayView3, ArrayViewD, ArrayViewMutD};

use crate::weights::Parameterized;

/// Normalization applied around a block's sublayers.
///
/// `Identity` is used by blocks that run without normalization; it owns no
/// parameters and passes activations through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalization {
    LayerNorm(LayerNorm),
    Identity,
}

impl Normalization {
    pub fn forward(&self, input: &ArrayView3<f32>) -> Array3<f32> {
        match self {
            Normalization::LayerNorm(ln) => ln.forward(input),
            Normalization::Identity => input.to_owned(),
        }
    }

    pub fn as_layer_norm(&self) -> Option<&LayerNorm> {
        match self {
            Normalization::LayerNorm(ln) => Some(ln),
            Normalization::Identity => None,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Normalization::Identity)
    }
}

impl Parameterized for Normalization {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        if let Normalization::LayerNorm(ln) = self {
            ln.named_parameters(prefix, out);
        }
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        if let Normalization::LayerNorm(ln) = self {
            ln.named_parameters_mut(prefix, out);
        }
    }
}
