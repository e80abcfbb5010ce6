//! Encoder plus classification head, the shape shared by every clip model.
//!
//! ```text
//! features [B, L, in] ──► TemporalEncoder ──► [B, L+1, H]
//!                                              │
//!                      position 0 ◄────────────┤
//!                          │                   └──► positions 1..=L (sequence_output)
//!                          ▼
//!                  ClassificationHead ──► logits [B, classes]
//! ```

use ndarray::{Array2, Array3, ArrayView3, ArrayViewD, ArrayViewMutD};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::activations::softmax_inplace;
use crate::encoder::{EncoderConfig, TemporalEncoder};
use crate::error::{EncoderError, EncoderResult};
use crate::head::{ClassificationHead, DEFAULT_HEAD_DROPOUT};
use crate::masking::CorruptionMask;
use crate::mode::ForwardMode;
use crate::weights::{join, Parameterized};

/// Everything a clip model hands to its losses.
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// `[batch, num_classes]`
    pub logits: Array2<f32>,
    /// `[batch, L, input_width]`, the backbone features as given.
    pub input_vectors: Array3<f32>,
    /// `[batch, L, hidden]`, encoder output without the classification position.
    pub sequence_output: Array3<f32>,
    /// `[batch, L]`
    pub corruption_mask: CorruptionMask,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalClassifier {
    encoder: TemporalEncoder,
    head: ClassificationHead,
}

impl TemporalClassifier {
    pub fn new<R: Rng + ?Sized>(
        config: EncoderConfig,
        num_classes: usize,
        rng: &mut R,
    ) -> EncoderResult<Self> {
        let hidden = config.hidden_width;
        let encoder = TemporalEncoder::new(config, rng)?;
        let head = ClassificationHead::new(hidden, num_classes, DEFAULT_HEAD_DROPOUT, rng)?;
        Self::from_parts(encoder, head)
    }

    pub fn from_seed(config: EncoderConfig, num_classes: usize, seed: u64) -> EncoderResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(config, num_classes, &mut rng)
    }

    pub fn from_parts(encoder: TemporalEncoder, head: ClassificationHead) -> EncoderResult<Self> {
        if head.hidden_size() != encoder.hidden_size() {
            return Err(EncoderError::shape(
                "classification head",
                [head.num_classes(), encoder.hidden_size()],
                head.classifier.shape(),
            ));
        }
        Ok(Self { encoder, head })
    }

    pub fn encoder(&self) -> &TemporalEncoder {
        &self.encoder
    }

    pub fn head(&self) -> &ClassificationHead {
        &self.head
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    pub fn forward(
        &self,
        features: &ArrayView3<f32>,
        mode: &mut ForwardMode<'_>,
    ) -> EncoderResult<ClassifierOutput> {
        let encoded = self.encoder.forward(features, mode)?;
        let logits = self.head.forward(&encoded.classification_output(), mode)?;
        let sequence_output = encoded.sequence_vectors().to_owned();

        Ok(ClassifierOutput {
            logits,
            input_vectors: features.to_owned(),
            sequence_output,
            corruption_mask: encoded.corruption_mask,
        })
    }

    pub fn forward_train<R: RngCore>(
        &self,
        features: &ArrayView3<f32>,
        rng: &mut R,
    ) -> EncoderResult<ClassifierOutput> {
        self.forward(features, &mut ForwardMode::Train(rng))
    }

    /// Class probabilities from an inference pass, `[batch, num_classes]`.
    pub fn predict(&self, features: &ArrayView3<f32>) -> EncoderResult<Array2<f32>> {
        let logits = self.forward(features, &mut ForwardMode::Eval)?.logits;
        let mut probs = logits.as_standard_layout().into_owned();
        for mut row in probs.rows_mut() {
            if let Some(slice) = row.as_slice_mut() {
                softmax_inplace(slice);
            }
        }
        Ok(probs)
    }

    /// Most likely class per clip.
    pub fn predict_classes(&self, features: &ArrayView3<f32>) -> EncoderResult<Vec<usize>> {
        let probs = self.predict(features)?;
        Ok(probs
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &p)| {
                        if p > best.1 {
                            (i, p)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect())
    }
}

impl Parameterized for TemporalClassifier {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        self.encoder.named_parameters(&join(prefix, "encoder"), out);
        self.head.named_parameters(&join(prefix, "head"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        self.encoder
            .named_parameters_mut(&join(prefix, "encoder"), out);
        self.head.named_parameters_mut(&join(prefix, "head"), out);
    }
}
