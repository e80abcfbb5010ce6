//! Linear classification head over the classification-position vector.

use ndarray::{Array2, ArrayView2, ArrayViewD, ArrayViewMutD};
use rand::Rng;

use crate::dropout::Dropout;
use crate::error::{EncoderError, EncoderResult};
use crate::linear_layer::LinearLayer;
use crate::mode::ForwardMode;
use crate::weights::{join, Parameterized};

/// Dropout applied to the classification vector before the classifier.
pub const DEFAULT_HEAD_DROPOUT: f32 = 0.8;

/// `dropout -> linear` mapping `hidden` to `num_classes` logits.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationHead {
    pub dropout: Dropout,
    pub classifier: LinearLayer,
}

impl ClassificationHead {
    /// Xavier-uniform classifier with a zero bias.
    pub fn new<R: Rng + ?Sized>(
        hidden_size: usize,
        num_classes: usize,
        dropout: f32,
        rng: &mut R,
    ) -> EncoderResult<Self> {
        if hidden_size == 0 || num_classes == 0 {
            return Err(EncoderError::config(format!(
                "classification head needs non-zero sizes, got {} -> {}",
                hidden_size, num_classes
            )));
        }
        Self::from_parts(LinearLayer::xavier(num_classes, hidden_size, rng), dropout)
    }

    pub fn from_parts(classifier: LinearLayer, dropout: f32) -> EncoderResult<Self> {
        if !(0.0..=1.0).contains(&dropout) {
            return Err(EncoderError::config(format!(
                "head dropout must be in [0, 1], got {}",
                dropout
            )));
        }
        Ok(Self {
            dropout: Dropout::new(dropout),
            classifier,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.out_features()
    }

    pub fn hidden_size(&self) -> usize {
        self.classifier.in_features()
    }

    /// `[batch, hidden]` classification vectors to `[batch, num_classes]` logits.
    pub fn forward(
        &self,
        pooled: &ArrayView2<f32>,
        mode: &mut ForwardMode<'_>,
    ) -> EncoderResult<Array2<f32>> {
        if pooled.ncols() != self.hidden_size() {
            return Err(EncoderError::shape(
                "classification vector",
                [pooled.nrows(), self.hidden_size()],
                pooled.shape(),
            ));
        }
        let mut x = pooled.to_owned();
        self.dropout.apply(&mut x, mode);
        Ok(self.classifier.matmul(&x.view()))
    }
}

impl Parameterized for ClassificationHead {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        self.classifier
            .named_parameters(&join(prefix, "classifier"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        self.classifier
            .named_parameters_mut(&join(prefix, "classifier"), out);
    }
}
