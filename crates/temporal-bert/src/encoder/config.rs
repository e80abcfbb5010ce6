//! Encoder configuration types
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{EncoderError, EncoderResult};

/// Where a block normalizes relative to its sublayers and residuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockPolicy {
    /// Sublayer, residual add, then normalize (BERT style).
    PostNorm,
    /// Normalize, sublayer, then residual add.
    #[default]
    PreNorm,
    /// Normalize, sublayer, residual taken around the normalized input.
    NormalizedResidual,
    /// No normalization parameters at all.
    NoNorm,
    /// Pre-norm block over two concatenated streams. The first
    /// `primary_len` input positions may not attend to the rest.
    TwoStream { primary_len: usize },
}

impl BlockPolicy {
    pub fn uses_norm(&self) -> bool {
        !matches!(self, BlockPolicy::NoNorm)
    }

    pub fn primary_len(&self) -> Option<usize> {
        match self {
            BlockPolicy::TwoStream { primary_len } => Some(*primary_len),
            _ => None,
        }
    }
}

impl fmt::Display for BlockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPolicy::PostNorm => write!(f, "post-norm"),
            BlockPolicy::PreNorm => write!(f, "pre-norm"),
            BlockPolicy::NormalizedResidual => write!(f, "normalized-residual"),
            BlockPolicy::NoNorm => write!(f, "no-norm"),
            BlockPolicy::TwoStream { primary_len } => write!(f, "two-stream({})", primary_len),
        }
    }
}

fn default_num_heads() -> usize {
    8
}

fn default_num_layers() -> usize {
    1
}

fn default_corruption_probability() -> f32 {
    0.2
}

fn default_dropout_probability() -> f32 {
    0.1
}

fn default_norm_eps() -> f32 {
    1e-6
}

/// Construction-time configuration of a [`TemporalEncoder`](super::TemporalEncoder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Width of each incoming feature vector.
    pub input_width: usize,
    pub hidden_width: usize,
    #[serde(default = "default_num_heads")]
    pub num_heads: usize,
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    /// Number of input positions L, excluding the classification position.
    pub sequence_length: usize,
    /// Per-position probability of corruption during training.
    #[serde(default = "default_corruption_probability")]
    pub corruption_probability: f32,
    #[serde(default = "default_dropout_probability")]
    pub dropout_probability: f32,
    #[serde(default)]
    pub block_policy: BlockPolicy,
    /// Feed-forward inner width; `4 * hidden_width` when absent.
    #[serde(default)]
    pub intermediate_width: Option<usize>,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_norm_eps")]
    pub norm_eps: f32,
}

impl EncoderConfig {
    /// One pre-norm layer, eight heads, hidden width equal to the input width.
    pub fn new(input_width: usize, sequence_length: usize) -> Self {
        Self {
            input_width,
            hidden_width: input_width,
            num_heads: default_num_heads(),
            num_layers: default_num_layers(),
            sequence_length,
            corruption_probability: default_corruption_probability(),
            dropout_probability: default_dropout_probability(),
            block_policy: BlockPolicy::default(),
            intermediate_width: None,
            activation: Activation::default(),
            norm_eps: default_norm_eps(),
        }
    }

    pub fn with_hidden_width(mut self, hidden_width: usize) -> Self {
        self.hidden_width = hidden_width;
        self
    }

    pub fn with_num_heads(mut self, num_heads: usize) -> Self {
        self.num_heads = num_heads;
        self
    }

    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_corruption_probability(mut self, p: f32) -> Self {
        self.corruption_probability = p;
        self
    }

    pub fn with_dropout_probability(mut self, p: f32) -> Self {
        self.dropout_probability = p;
        self
    }

    pub fn with_block_policy(mut self, policy: BlockPolicy) -> Self {
        self.block_policy = policy;
        self
    }

    pub fn with_intermediate_width(mut self, width: usize) -> Self {
        self.intermediate_width = Some(width);
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_norm_eps(mut self, eps: f32) -> Self {
        self.norm_eps = eps;
        self
    }

    pub fn intermediate_size(&self) -> usize {
        self.intermediate_width.unwrap_or(4 * self.hidden_width)
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_width / self.num_heads.max(1)
    }

    pub fn validate(&self) -> EncoderResult<()> {
        if self.input_width == 0 || self.hidden_width == 0 {
            return Err(EncoderError::config("input and hidden width must be positive"));
        }
        if self.num_heads == 0 || self.hidden_width % self.num_heads != 0 {
            return Err(EncoderError::config(format!(
                "hidden width {} is not divisible by {} heads",
                self.hidden_width, self.num_heads
            )));
        }
        if self.num_layers == 0 {
            return Err(EncoderError::config("an encoder needs at least one layer"));
        }
        if self.sequence_length == 0 {
            return Err(EncoderError::config("sequence length must be positive"));
        }
        for (name, p) in [
            ("corruption", self.corruption_probability),
            ("dropout", self.dropout_probability),
        ] {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(EncoderError::config(format!(
                    "{} probability must be in [0, 1], got {}",
                    name, p
                )));
            }
        }
        if self.intermediate_width == Some(0) {
            return Err(EncoderError::config("intermediate width must be positive"));
        }
        if !(self.norm_eps.is_finite() && self.norm_eps > 0.0) {
            return Err(EncoderError::config(format!(
                "norm epsilon must be positive, got {}",
                self.norm_eps
            )));
        }
        if let Some(primary_len) = self.block_policy.primary_len() {
            if primary_len == 0 || primary_len >= self.sequence_length {
                return Err(EncoderError::config(format!(
                    "two-stream split {} must lie in 1..{}",
                    primary_len, self.sequence_length
                )));
            }
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> EncoderResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EncoderError::config(format!("malformed encoder config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> EncoderResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EncoderError::config(format!("cannot serialize encoder config: {}", e)))
    }
}

impl fmt::Display for EncoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EncoderConfig {{ input: {}, hidden: {}, heads: {}, layers: {}, len: {}, corruption: {}, dropout: {}, block: {} }}",
            self.input_width,
            self.hidden_width,
            self.num_heads,
            self.num_layers,
            self.sequence_length,
            self.corruption_probability,
            self.dropout_probability,
            self.block_policy
        )
    }
}
