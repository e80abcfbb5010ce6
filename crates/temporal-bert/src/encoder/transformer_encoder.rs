use ndarray::{Array3, ArrayView3, ArrayViewD, ArrayViewMutD};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;

use crate::dropout::Dropout;
use crate::embeddings::TemporalEmbeddings;
use crate::encoder::config::{BlockPolicy, EncoderConfig};
use crate::encoder::encoder_layer::EncoderLayer;
use crate::encoder::output::EncoderOutput;
use crate::error::{EncoderError, EncoderResult};
use crate::masking::{CorruptionMask, MaskingPolicy};
use crate::mode::ForwardMode;
use crate::utils::masks::{create_full_attention_mask, create_two_stream_mask, intersect_masks};
use crate::weights::{join, Parameterized};

/// Masked self-attention encoder over a fixed-length feature sequence.
///
/// Holds no state across calls besides its weights. Forward passes borrow
/// `&self`, so one encoder can serve several threads at once.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalEncoder {
    config: EncoderConfig,
    embeddings: TemporalEmbeddings,
    layers: Vec<EncoderLayer>,
    masking: MaskingPolicy,
}

impl TemporalEncoder {
    /// Builds a randomly initialized encoder.
    pub fn new<R: Rng + ?Sized>(config: EncoderConfig, rng: &mut R) -> EncoderResult<Self> {
        config.validate()?;

        let embeddings = TemporalEmbeddings::init(
            config.input_width,
            config.hidden_width,
            config.sequence_length,
            Dropout::new(config.dropout_probability),
            rng,
        )?;
        let layers = (0..config.num_layers)
            .map(|_| EncoderLayer::init(&config, rng))
            .collect::<EncoderResult<Vec<_>>>()?;

        Self::from_parts(config, embeddings, layers)
    }

    /// Deterministic initialization from a seed.
    pub fn from_seed(config: EncoderConfig, seed: u64) -> EncoderResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(config, &mut rng)
    }

    /// Assembles an encoder from pre-built components, checking that they
    /// agree with `config`.
    pub fn from_parts(
        config: EncoderConfig,
        embeddings: TemporalEmbeddings,
        layers: Vec<EncoderLayer>,
    ) -> EncoderResult<Self> {
        config.validate()?;

        if embeddings.input_width() != config.input_width
            || embeddings.hidden_size() != config.hidden_width
            || embeddings.seq_len() != config.sequence_length
        {
            return Err(EncoderError::shape(
                "embeddings",
                [config.sequence_length, config.input_width, config.hidden_width],
                [
                    embeddings.seq_len(),
                    embeddings.input_width(),
                    embeddings.hidden_size(),
                ],
            ));
        }
        if layers.len() != config.num_layers {
            return Err(EncoderError::config(format!(
                "expected {} layers, got {}",
                config.num_layers,
                layers.len()
            )));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.self_attn.hidden_size() != config.hidden_width
                || layer.self_attn.num_heads != config.num_heads
            {
                return Err(EncoderError::config(format!(
                    "layer {} has {} heads over width {}, expected {} over {}",
                    i,
                    layer.self_attn.num_heads,
                    layer.self_attn.hidden_size(),
                    config.num_heads,
                    config.hidden_width
                )));
            }
            let expects_identity = !config.block_policy.uses_norm();
            if layer.self_attn_layer_norm.is_identity() != expects_identity
                || layer.ffn_layer_norm.is_identity() != expects_identity
            {
                return Err(EncoderError::config(format!(
                    "layer {} normalization does not match the {} block policy",
                    i, config.block_policy
                )));
            }
        }

        let masking = MaskingPolicy::new(config.corruption_probability)?;
        let encoder = Self {
            config,
            embeddings,
            layers,
            masking,
        };

        log::info!(
            "Built temporal encoder: {} ({} parameters)",
            encoder.config,
            encoder.num_parameters()
        );
        Ok(encoder)
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn embeddings(&self) -> &TemporalEmbeddings {
        &self.embeddings
    }

    pub fn layers(&self) -> &[EncoderLayer] {
        &self.layers
    }

    pub fn masking_policy(&self) -> &MaskingPolicy {
        &self.masking
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_width
    }

    /// Encodes `[batch, L, input_width]` features into
    /// `[batch, L + 1, hidden]`.
    pub fn forward(
        &self,
        features: &ArrayView3<f32>,
        mode: &mut ForwardMode<'_>,
    ) -> EncoderResult<EncoderOutput> {
        self.run(features, mode, false)
    }

    /// Inference pass: no corruption, no dropout.
    pub fn forward_eval(&self, features: &ArrayView3<f32>) -> EncoderResult<EncoderOutput> {
        self.run(features, &mut ForwardMode::Eval, false)
    }

    /// Training pass drawing corruption and dropout from `rng`.
    pub fn forward_train<R: RngCore>(
        &self,
        features: &ArrayView3<f32>,
        rng: &mut R,
    ) -> EncoderResult<EncoderOutput> {
        self.run(features, &mut ForwardMode::Train(rng), false)
    }

    /// Inference over independent clips on the rayon pool, one pass per clip.
    pub fn forward_eval_many(
        &self,
        clips: &[ArrayView3<'_, f32>],
    ) -> EncoderResult<Vec<EncoderOutput>> {
        clips
            .par_iter()
            .map(|clip| self.forward_eval(clip))
            .collect()
    }

    /// Like [`TemporalEncoder::forward`], also returning every layer's
    /// attention probabilities.
    pub fn forward_with_attention(
        &self,
        features: &ArrayView3<f32>,
        mode: &mut ForwardMode<'_>,
    ) -> EncoderResult<EncoderOutput> {
        self.run(features, mode, true)
    }

    fn run(
        &self,
        features: &ArrayView3<f32>,
        mode: &mut ForwardMode<'_>,
        keep_attentions: bool,
    ) -> EncoderResult<EncoderOutput> {
        let (batch_size, seq_len, width) = features.dim();
        if seq_len != self.config.sequence_length || width != self.config.input_width {
            return Err(EncoderError::shape(
                "feature sequence",
                [batch_size, self.config.sequence_length, self.config.input_width],
                [batch_size, seq_len, width],
            ));
        }

        let corruption = self.masking.draw(batch_size, seq_len, mode)?;
        let attention_mask = self.attention_mask(&corruption)?;
        log::debug!(
            "Encoding batch of {} ({:?}), {} corrupted positions",
            batch_size,
            mode,
            corruption.num_corrupted()
        );

        let mut hidden: Array3<f32> = self.embeddings.forward(features, &corruption, mode)?;
        let mut attentions = keep_attentions.then(|| Vec::with_capacity(self.layers.len()));

        for (i, layer) in self.layers.iter().enumerate() {
            log::trace!("Layer {}/{}", i + 1, self.layers.len());
            let output = layer.forward(hidden, &attention_mask, self.config.block_policy, mode, i)?;
            hidden = output.hidden;
            if let Some(all) = attentions.as_mut() {
                all.push(output.attention_probs);
            }
        }

        Ok(EncoderOutput {
            sequence_output: hidden,
            corruption_mask: corruption,
            attentions,
        })
    }

    /// `[batch, L + 1, L + 1]` mask for one pass.
    fn attention_mask(&self, corruption: &CorruptionMask) -> EncoderResult<Array3<f32>> {
        let batch_size = corruption.batch_size();
        let seq_len = self.config.sequence_length + 1;

        let mask = if corruption.any() {
            corruption.attention_mask()
        } else {
            create_full_attention_mask(batch_size, seq_len)
        };

        match self.config.block_policy {
            BlockPolicy::TwoStream { primary_len } => {
                intersect_masks(&mask, &create_two_stream_mask(batch_size, seq_len, primary_len)?)
            }
            _ => Ok(mask),
        }
    }
}

impl Parameterized for TemporalEncoder {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        self.embeddings.named_parameters(&join(prefix, "embedding"), out);
        for (i, layer) in self.layers.iter().enumerate() {
            layer.named_parameters(&join(prefix, &format!("layers.{}", i)), out);
        }
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        self.embeddings
            .named_parameters_mut(&join(prefix, "embedding"), out);
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.named_parameters_mut(&join(prefix, &format!("layers.{}", i)), out);
        }
    }
}
