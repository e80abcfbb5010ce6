use ndarray::{Array3, Array4, ArrayView3, ArrayViewD, ArrayViewMutD};
use rand::Rng;

use crate::activations::softmax_4d_inplace;
use crate::dropout::Dropout;
use crate::error::{EncoderError, EncoderResult};
use crate::linear_layer::LinearLayer;
use crate::mode::ForwardMode;
use crate::utils::linear_algebra::matmul_4d;
use crate::utils::masks::apply_attention_mask;
use crate::weights::{join, Parameterized};

/// Result of one attention sublayer.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// `[batch, seq, hidden]`
    pub hidden: Array3<f32>,
    /// Post-softmax weights before dropout, `[batch, heads, seq, seq]`.
    pub probs: Array4<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSelfAttention {
    pub q_proj: LinearLayer,
    pub k_proj: LinearLayer,
    pub v_proj: LinearLayer,
    /// Output projection layer.
    pub out_proj: LinearLayer,

    /// Number of attention heads.
    pub num_heads: usize,
    /// Dimension of each attention head.
    pub head_dim: usize,
    /// Scaling factor: 1 / sqrt(head_dim).
    pub scale_factor: f32,
    /// Dropout on the normalized attention weights.
    pub dropout: Dropout,
}

impl EncoderSelfAttention {
    /// Creates a new encoder self-attention module.
    ///
    /// # Arguments
    ///
    /// * `hidden_size` - The model's hidden dimension.
    /// * `num_heads` - Number of attention heads. Must divide `hidden_size`.
    /// * `q`, `k`, `v`, `o` - `[hidden, hidden]` projections.
    pub fn new(
        hidden_size: usize,
        num_heads: usize,
        q: LinearLayer,
        k: LinearLayer,
        v: LinearLayer,
        o: LinearLayer,
        dropout: Dropout,
    ) -> EncoderResult<Self> {
        if num_heads == 0 || hidden_size % num_heads != 0 {
            return Err(EncoderError::config(format!(
                "hidden width {} is not divisible by {} heads",
                hidden_size, num_heads
            )));
        }
        for (name, layer) in [("q_proj", &q), ("k_proj", &k), ("v_proj", &v), ("o_proj", &o)] {
            if layer.shape() != [hidden_size, hidden_size] {
                return Err(EncoderError::shape(
                    name,
                    [hidden_size, hidden_size],
                    layer.shape(),
                ));
            }
        }

        let head_dim = hidden_size / num_heads;
        Ok(Self {
            q_proj: q,
            k_proj: k,
            v_proj: v,
            out_proj: o,
            num_heads,
            head_dim,
            scale_factor: 1.0 / (head_dim as f32).sqrt(),
            dropout,
        })
    }

    /// Xavier-uniform projections with zero biases.
    pub fn xavier<R: Rng + ?Sized>(
        hidden_size: usize,
        num_heads: usize,
        dropout: Dropout,
        rng: &mut R,
    ) -> EncoderResult<Self> {
        let q = LinearLayer::xavier(hidden_size, hidden_size, rng);
        let k = LinearLayer::xavier(hidden_size, hidden_size, rng);
        let v = LinearLayer::xavier(hidden_size, hidden_size, rng);
        let o = LinearLayer::xavier(hidden_size, hidden_size, rng);
        Self::new(hidden_size, num_heads, q, k, v, o, dropout)
    }

    /// Returns the hidden size.
    #[inline]
    pub fn hidden_size(&self) -> usize {
        self.num_heads * self.head_dim
    }

    /// Performs the forward pass of encoder self-attention.
    ///
    /// `attention_mask` is `[batch, seq, seq]` with `1.0` for allowed pairs.
    /// `layer_idx` only labels a [`EncoderError::NumericalInstability`].
    pub fn forward(
        &self,
        hidden_states: &ArrayView3<f32>,
        attention_mask: &Array3<f32>,
        mode: &mut ForwardMode<'_>,
        layer_idx: usize,
    ) -> EncoderResult<AttentionOutput> {
        let (batch, seq_len, _) = hidden_states.dim();
        let hidden_dim = self.hidden_size();

        // 1. Project
        let q = self.q_proj.forward_3d(hidden_states)?;
        let k = self.k_proj.forward_3d(hidden_states)?;
        let v = self.v_proj.forward_3d(hidden_states)?;

        // 2. Reshape & Permute to [B, H, S, D]
        let q_heads = q
            .into_shape_with_order((batch, seq_len, self.num_heads, self.head_dim))?
            .permuted_axes([0, 2, 1, 3]);

        let k_heads_t = k
            .into_shape_with_order((batch, seq_len, self.num_heads, self.head_dim))?
            .permuted_axes([0, 2, 3, 1]);

        let v_heads = v
            .into_shape_with_order((batch, seq_len, self.num_heads, self.head_dim))?
            .permuted_axes([0, 2, 1, 3]);

        // 3. Scores: Q @ K^T / sqrt(d)
        let mut scores = matmul_4d(&q_heads, &k_heads_t);
        scores.mapv_inplace(|x| x * self.scale_factor);

        if scores.iter().any(|x| !x.is_finite()) {
            log::warn!("non-finite attention scores in layer {}", layer_idx);
            return Err(EncoderError::NumericalInstability {
                stage: "attention scores",
                layer: layer_idx,
            });
        }

        // 4. Mask & softmax
        apply_attention_mask(&mut scores, attention_mask)?;
        softmax_4d_inplace(&mut scores);

        // 5. Context: probs @ V
        let context = if self.dropout.p > 0.0 && mode.is_training() {
            let mut dropped = scores.clone();
            self.dropout.apply(&mut dropped, mode);
            matmul_4d(&dropped, &v_heads)
        } else {
            matmul_4d(&scores, &v_heads)
        };

        // 6. Merge heads and output projection
        let context_contig = context
            .permuted_axes([0, 2, 1, 3])
            .as_standard_layout()
            .into_owned();

        let context_flat = context_contig.into_shape_with_order((batch * seq_len, hidden_dim))?;
        let output = self.out_proj.matmul(&context_flat.view());

        Ok(AttentionOutput {
            hidden: output.into_shape_with_order((batch, seq_len, hidden_dim))?,
            probs: scores,
        })
    }
}

impl Parameterized for EncoderSelfAttention {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        self.q_proj.named_parameters(&join(prefix, "q_proj"), out);
        self.k_proj.named_parameters(&join(prefix, "k_proj"), out);
        self.v_proj.named_parameters(&join(prefix, "v_proj"), out);
        self.out_proj.named_parameters(&join(prefix, "o_proj"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        self.q_proj.named_parameters_mut(&join(prefix, "q_proj"), out);
        self.k_proj.named_parameters_mut(&join(prefix, "k_proj"), out);
        self.v_proj.named_parameters_mut(&join(prefix, "v_proj"), out);
        self.out_proj.named_parameters_mut(&join(prefix, "o_proj"), out);
    }
}
