use ndarray::{Array3, Array4, ArrayViewD, ArrayViewMutD};
use rand::Rng;

use crate::attention::{AttentionOutput, EncoderSelfAttention};
use crate::dropout::Dropout;
use crate::encoder::config::{BlockPolicy, EncoderConfig};
use crate::error::{EncoderError, EncoderResult};
use crate::feedforward::StdFeedForward;
use crate::mode::ForwardMode;
use crate::normalization::{LayerNorm, Normalization};
use crate::weights::{join, Parameterized};

/// One transformer block: self-attention and a feed-forward sublayer, each
/// wrapped in a residual connection. The [`BlockPolicy`] passed to
/// [`EncoderLayer::forward`] decides where normalization sits.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderLayer {
    pub self_attn: EncoderSelfAttention,
    pub self_attn_layer_norm: Normalization,
    pub feedforward: StdFeedForward,
    pub ffn_layer_norm: Normalization,
    /// Applied to each sublayer output before its residual add.
    pub dropout: Dropout,
}

/// Block output plus the attention probabilities it used.
#[derive(Debug, Clone)]
pub struct LayerOutput {
    pub hidden: Array3<f32>,
    pub attention_probs: Array4<f32>,
}

impl EncoderLayer {
    pub fn new(
        self_attn: EncoderSelfAttention,
        self_attn_layer_norm: Normalization,
        feedforward: StdFeedForward,
        ffn_layer_norm: Normalization,
        dropout: Dropout,
    ) -> Self {
        Self {
            self_attn,
            self_attn_layer_norm,
            feedforward,
            ffn_layer_norm,
            dropout,
        }
    }

    /// Random initialization following `config`. Blocks under
    /// [`BlockPolicy::NoNorm`] get identity normalization.
    pub fn init<R: Rng + ?Sized>(config: &EncoderConfig, rng: &mut R) -> EncoderResult<Self> {
        let hidden = config.hidden_width;
        let dropout = Dropout::new(config.dropout_probability);
        let norm = || {
            if config.block_policy.uses_norm() {
                Normalization::LayerNorm(LayerNorm::identity_init(hidden, config.norm_eps))
            } else {
                Normalization::Identity
            }
        };

        let self_attn = EncoderSelfAttention::xavier(hidden, config.num_heads, dropout, rng)?;
        let feedforward =
            StdFeedForward::xavier(hidden, config.intermediate_size(), config.activation, rng);

        Ok(Self::new(self_attn, norm(), feedforward, norm(), dropout))
    }

    /// Forward pass with the given norm placement.
    ///
    /// # Arguments
    /// * `hidden` - Input tensor [batch, seq, hidden]
    /// * `attention_mask` - [batch, seq, seq], 1 = may attend
    /// * `policy` - Norm placement; the two-stream policy differs only in
    ///   its mask, which the caller builds
    /// * `layer_idx` - Used in diagnostics
    pub fn forward(
        &self,
        hidden: Array3<f32>,
        attention_mask: &Array3<f32>,
        policy: BlockPolicy,
        mode: &mut ForwardMode<'_>,
        layer_idx: usize,
    ) -> EncoderResult<LayerOutput> {
        let output = match policy {
            BlockPolicy::PostNorm => self.forward_postnorm(hidden, attention_mask, mode, layer_idx),
            BlockPolicy::PreNorm | BlockPolicy::NoNorm | BlockPolicy::TwoStream { .. } => {
                self.forward_prenorm(hidden, attention_mask, mode, layer_idx)
            }
            BlockPolicy::NormalizedResidual => {
                self.forward_normalized_residual(hidden, attention_mask, mode, layer_idx)
            }
        }?;

        if output.hidden.iter().any(|v| !v.is_finite()) {
            log::warn!("non-finite block output in layer {}", layer_idx);
            return Err(EncoderError::NumericalInstability {
                stage: "block output",
                layer: layer_idx,
            });
        }
        Ok(output)
    }

    /// Pre-norm: LN → Sublayer → Residual
    ///
    /// ```text
    /// x ──┬── LN ──► Attention ──┬──► + ──┬── LN ──► FFN ──┬──► + ──► out
    ///     └─────────────────────►┘        └────────────────►┘
    /// ```
    ///
    /// With identity normalization this is the plain residual block.
    fn forward_prenorm(
        &self,
        mut hidden: Array3<f32>,
        attention_mask: &Array3<f32>,
        mode: &mut ForwardMode<'_>,
        layer_idx: usize,
    ) -> EncoderResult<LayerOutput> {
        // 1. Attention Block
        let normed = self.self_attn_layer_norm.forward(&hidden.view());
        let AttentionOutput {
            hidden: mut attn_out,
            probs,
        } = self
            .self_attn
            .forward(&normed.view(), attention_mask, mode, layer_idx)?;
        self.dropout.apply(&mut attn_out, mode);
        hidden += &attn_out;

        // 2. FFN Block
        let normed = self.ffn_layer_norm.forward(&hidden.view());
        let mut ffn_out = self.feedforward.forward(&normed.view())?;
        self.dropout.apply(&mut ffn_out, mode);
        hidden += &ffn_out;

        Ok(LayerOutput {
            hidden,
            attention_probs: probs,
        })
    }

    /// Post-norm: Sublayer → Residual → LN
    ///
    /// ```text
    /// x ──┬──► Attention ──┬──► + ──► LN ──┬──► FFN ──┬──► + ──► LN ──► out
    ///     └────────────────►┘              └──────────►┘
    /// ```
    fn forward_postnorm(
        &self,
        mut hidden: Array3<f32>,
        attention_mask: &Array3<f32>,
        mode: &mut ForwardMode<'_>,
        layer_idx: usize,
    ) -> EncoderResult<LayerOutput> {
        // 1. Attention Block
        let AttentionOutput {
            hidden: mut attn_out,
            probs,
        } = self
            .self_attn
            .forward(&hidden.view(), attention_mask, mode, layer_idx)?;
        self.dropout.apply(&mut attn_out, mode);
        hidden += &attn_out;
        let ffn_input = self.self_attn_layer_norm.forward(&hidden.view());

        // 2. FFN Block
        let mut ffn_out = self.feedforward.forward(&ffn_input.view())?;
        self.dropout.apply(&mut ffn_out, mode);
        let hidden = self
            .ffn_layer_norm
            .forward(&(ffn_input + &ffn_out).view());

        Ok(LayerOutput {
            hidden,
            attention_probs: probs,
        })
    }

    /// Normalized residual: the residual runs from the normalized input.
    ///
    /// ```text
    /// x ── LN ──┬──► Attention ──┬──► + ── LN ──┬──► FFN ──┬──► + ──► out
    ///           └───────────────►┘              └──────────►┘
    /// ```
    fn forward_normalized_residual(
        &self,
        hidden: Array3<f32>,
        attention_mask: &Array3<f32>,
        mode: &mut ForwardMode<'_>,
        layer_idx: usize,
    ) -> EncoderResult<LayerOutput> {
        // 1. Attention Block
        let mut normed = self.self_attn_layer_norm.forward(&hidden.view());
        let AttentionOutput {
            hidden: mut attn_out,
            probs,
        } = self
            .self_attn
            .forward(&normed.view(), attention_mask, mode, layer_idx)?;
        self.dropout.apply(&mut attn_out, mode);
        normed += &attn_out;

        // 2. FFN Block
        let mut normed = self.ffn_layer_norm.forward(&normed.view());
        let mut ffn_out = self.feedforward.forward(&normed.view())?;
        self.dropout.apply(&mut ffn_out, mode);
        normed += &ffn_out;

        Ok(LayerOutput {
            hidden: normed,
            attention_probs: probs,
        })
    }
}

impl Parameterized for EncoderLayer {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        self.self_attn.named_parameters(&join(prefix, "attention"), out);
        self.self_attn_layer_norm
            .named_parameters(&join(prefix, "attention_norm"), out);
        self.feedforward.named_parameters(&join(prefix, "feedforward"), out);
        self.ffn_layer_norm
            .named_parameters(&join(prefix, "feedforward_norm"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        self.self_attn
            .named_parameters_mut(&join(prefix, "attention"), out);
        self.self_attn_layer_norm
            .named_parameters_mut(&join(prefix, "attention_norm"), out);
        self.feedforward
            .named_parameters_mut(&join(prefix, "feedforward"), out);
        self.ffn_layer_norm
            .named_parameters_mut(&join(prefix, "feedforward_norm"), out);
    }
}
