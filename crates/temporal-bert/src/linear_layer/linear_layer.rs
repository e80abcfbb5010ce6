use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, ArrayViewMutD};
use rand::Rng;

use crate::error::{EncoderError, EncoderResult};
use crate::weights::{join, xavier_uniform, Parameterized};

/// A linear transformation layer (y = xW^T + b).
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLayer {
    /// `[out_features, in_features]`
    pub weight: Array2<f32>,
    pub bias: Option<Array1<f32>>,
}

impl LinearLayer {
    /// Creates a layer from a weight matrix in `[OutFeatures, InFeatures]`
    /// layout and an optional bias.
    pub fn new_f32(weights: Array2<f32>, bias: impl Into<Option<Array1<f32>>>) -> Self {
        Self {
            weight: weights,
            bias: bias.into(),
        }
    }

    /// Xavier-uniform weights with a zero bias.
    pub fn xavier<R: Rng + ?Sized>(out_features: usize, in_features: usize, rng: &mut R) -> Self {
        Self::new_f32(
            xavier_uniform(out_features, in_features, rng),
            Array1::zeros(out_features),
        )
    }

    /// Computes `y = x @ W^T + b` for a `[tokens, in_features]` input.
    #[inline]
    pub fn matmul(&self, input: &ArrayView2<f32>) -> Array2<f32> {
        let mut result = input.dot(&self.weight.t());

        if let Some(b) = &self.bias {
            result.outer_iter_mut().for_each(|mut row| row += b);
        }

        result
    }

    /// Applies the projection to every position of a `[batch, seq, in]` tensor.
    pub fn forward_3d(&self, input: &ArrayView3<f32>) -> EncoderResult<Array3<f32>> {
        let (batch, seq, width) = input.dim();
        if width != self.in_features() {
            return Err(EncoderError::shape(
                "linear input",
                [batch, seq, self.in_features()],
                [batch, seq, width],
            ));
        }

        let contiguous = input.as_standard_layout();
        let flat = contiguous.view().into_shape_with_order((batch * seq, width))?;
        let out = self.matmul(&flat);
        Ok(out.into_shape_with_order((batch, seq, self.out_features()))?)
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.out_features(), self.in_features()]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }
}

impl Parameterized for LinearLayer {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        out.push((join(prefix, "weight"), self.weight.view().into_dyn()));
        if let Some(b) = &self.bias {
            out.push((join(prefix, "bias"), b.view().into_dyn()));
        }
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        out.push((join(prefix, "weight"), self.weight.view_mut().into_dyn()));
        if let Some(b) = &mut self.bias {
            out.push((join(prefix, "bias"), b.view_mut().into_dyn()));
        }
    }
}
