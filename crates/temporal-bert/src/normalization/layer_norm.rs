//! Layer normalization implementation

use ndarray::{Array1, Array3, ArrayView3, ArrayViewD, ArrayViewMutD, Axis};

use crate::weights::{join, Parameterized};

/// Layer normalization over the last axis.
///
/// Uses the biased variance with `eps` added inside the square root.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNorm {
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(weight: Array1<f32>, bias: Array1<f32>, eps: f32) -> Self {
        Self { weight, bias, eps }
    }

    /// Unit gain, zero bias.
    pub fn identity_init(hidden: usize, eps: f32) -> Self {
        Self::new(Array1::ones(hidden), Array1::zeros(hidden), eps)
    }

    /// Apply layer norm to a 3D tensor of activations.
    #[inline]
    pub fn forward(&self, hidden_states: &ArrayView3<f32>) -> Array3<f32> {
        let Some(mean) = hidden_states.mean_axis(Axis(2)) else {
            return hidden_states.to_owned();
        };
        let variance = hidden_states.var_axis(Axis(2), 0.0);

        let mean_expanded = mean.insert_axis(Axis(2));
        let var_expanded = variance.insert_axis(Axis(2));

        let inv_std = (&var_expanded + self.eps).mapv(|x| 1.0 / x.sqrt());
        let normalized_hidden = (hidden_states - &mean_expanded) * &inv_std;

        normalized_hidden * &self.weight + &self.bias
    }

    pub fn forward_3d(&self, hidden: &Array3<f32>) -> Array3<f32> {
        self.forward(&hidden.view())
    }
}

impl Parameterized for LayerNorm {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        out.push((join(prefix, "weight"), self.weight.view().into_dyn()));
        out.push((join(prefix, "bias"), self.bias.view().into_dyn()));
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        out.push((join(prefix, "weight"), self.weight.view_mut().into_dyn()));
        out.push((join(prefix, "bias"), self.bias.view_mut().into_dyn()));
    }
}
