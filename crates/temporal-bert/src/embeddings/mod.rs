//! Temporal embedding stage.
//!
//! Turns a `[batch, L, input_width]` feature sequence into the
//! `[batch, L + 1, hidden]` seed of the encoder: optional projection to the
//! hidden width, zeroing of corrupted positions, a prepended classification
//! token, learned absolute position embeddings, then dropout.

use std::ops::AddAssign;

use ndarray::{s, Array1, Array2, Array3, ArrayView3, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;

use crate::dropout::Dropout;
use crate::error::{EncoderError, EncoderResult};
use crate::linear_layer::LinearLayer;
use crate::masking::CorruptionMask;
use crate::mode::ForwardMode;
use crate::weights::{join, normal, Parameterized, EMBEDDING_INIT_STD};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalEmbeddings {
    /// Present only when the input width differs from the hidden width.
    pub projection: Option<LinearLayer>,
    /// `[hidden]`
    pub cls_token: Array1<f32>,
    /// `[L + 1, hidden]`, row 0 belongs to the classification position.
    pub position_embeddings: Array2<f32>,
    pub dropout: Dropout,
    input_width: usize,
}

impl TemporalEmbeddings {
    /// Creates the embedding stage from pre-built components.
    pub fn new(
        input_width: usize,
        projection: Option<LinearLayer>,
        cls_token: Array1<f32>,
        position_embeddings: Array2<f32>,
        dropout: Dropout,
    ) -> EncoderResult<Self> {
        let hidden = cls_token.len();
        match &projection {
            Some(proj) if proj.shape() != [hidden, input_width] => {
                return Err(EncoderError::shape(
                    "embedding projection",
                    [hidden, input_width],
                    proj.shape(),
                ));
            }
            None if input_width != hidden => {
                return Err(EncoderError::shape(
                    "embedding input width (no projection)",
                    hidden,
                    input_width,
                ));
            }
            _ => {}
        }
        if position_embeddings.ncols() != hidden {
            return Err(EncoderError::shape(
                "position embeddings",
                [position_embeddings.nrows(), hidden],
                position_embeddings.shape(),
            ));
        }
        if position_embeddings.nrows() < 2 {
            return Err(EncoderError::config(
                "position table needs a classification row and at least one input row",
            ));
        }

        Ok(Self {
            projection,
            cls_token,
            position_embeddings,
            dropout,
            input_width,
        })
    }

    /// Random initialization: Xavier projection, N(0, 0.02^2) token and
    /// position table.
    pub fn init<R: Rng + ?Sized>(
        input_width: usize,
        hidden_size: usize,
        seq_len: usize,
        dropout: Dropout,
        rng: &mut R,
    ) -> EncoderResult<Self> {
        let projection = (input_width != hidden_size)
            .then(|| LinearLayer::xavier(hidden_size, input_width, rng));
        let cls_token = normal(hidden_size, EMBEDDING_INIT_STD, rng)?;
        let position_embeddings = normal((seq_len + 1, hidden_size), EMBEDDING_INIT_STD, rng)?;
        Self::new(input_width, projection, cls_token, position_embeddings, dropout)
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn hidden_size(&self) -> usize {
        self.cls_token.len()
    }

    /// Number of input positions, excluding the classification position.
    pub fn seq_len(&self) -> usize {
        self.position_embeddings.nrows() - 1
    }

    /// Performs the complete embedding forward pass.
    pub fn forward(
        &self,
        features: &ArrayView3<f32>,
        corruption: &CorruptionMask,
        mode: &mut ForwardMode<'_>,
    ) -> EncoderResult<Array3<f32>> {
        let (batch_size, seq_len, width) = features.dim();
        if seq_len != self.seq_len() || width != self.input_width {
            return Err(EncoderError::shape(
                "feature sequence",
                [batch_size, self.seq_len(), self.input_width],
                [batch_size, seq_len, width],
            ));
        }
        if corruption.as_array().dim() != (batch_size, seq_len) {
            return Err(EncoderError::shape(
                "corruption mask",
                [batch_size, seq_len],
                corruption.as_array().shape(),
            ));
        }

        let mut projected = match &self.projection {
            Some(proj) => proj.forward_3d(features)?,
            None => features.to_owned(),
        };

        for ((b, t), &is_corrupted) in corruption.as_array().indexed_iter() {
            if is_corrupted {
                projected.slice_mut(s![b, t, ..]).fill(0.0);
            }
        }

        let hidden_size = self.hidden_size();
        let mut hidden = Array3::<f32>::zeros((batch_size, seq_len + 1, hidden_size));
        hidden
            .slice_mut(s![.., 0, ..])
            .assign(&self.cls_token.view().insert_axis(Axis(0)));
        hidden.slice_mut(s![.., 1.., ..]).assign(&projected);

        // [L + 1, hidden] -> [1, L + 1, hidden]
        hidden.add_assign(&self.position_embeddings.view().insert_axis(Axis(0)));

        self.dropout.apply(&mut hidden, mode);
        Ok(hidden)
    }
}

impl Parameterized for TemporalEmbeddings {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        out.push((join(prefix, "cls_token"), self.cls_token.view().into_dyn()));
        out.push((
            join(prefix, "position_embeddings"),
            self.position_embeddings.view().into_dyn(),
        ));
        if let Some(proj) = &self.projection {
            proj.named_parameters(&join(prefix, "projection"), out);
        }
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        out.push((join(prefix, "cls_token"), self.cls_token.view_mut().into_dyn()));
        out.push((
            join(prefix, "position_embeddings"),
            self.position_embeddings.view_mut().into_dyn(),
        ));
        if let Some(proj) = &mut self.projection {
            proj.named_parameters_mut(&join(prefix, "projection"), out);
        }
    }
}
