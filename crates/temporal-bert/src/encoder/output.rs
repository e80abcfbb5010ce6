use ndarray::{s, Array3, Array4, ArrayView2, ArrayView3};

use crate::masking::CorruptionMask;

/// Result of a full encoder pass.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// `[batch, L + 1, hidden]`; position 0 is the classification position.
    pub sequence_output: Array3<f32>,
    /// `[batch, L]` flags of the input positions corrupted in this pass.
    pub corruption_mask: CorruptionMask,
    /// Per-layer attention probabilities `[batch, heads, L + 1, L + 1]`,
    /// present only when requested.
    pub attentions: Option<Vec<Array4<f32>>>,
}

impl EncoderOutput {
    /// `[batch, hidden]` vector at the classification position.
    pub fn classification_output(&self) -> ArrayView2<'_, f32> {
        self.sequence_output.slice(s![.., 0, ..])
    }

    /// `[batch, L, hidden]` vectors at the input positions.
    pub fn sequence_vectors(&self) -> ArrayView3<'_, f32> {
        self.sequence_output.slice(s![.., 1.., ..])
    }

    pub fn batch_size(&self) -> usize {
        self.sequence_output.dim().0
    }

    pub fn into_parts(self) -> (Array3<f32>, CorruptionMask) {
        (self.sequence_output, self.corruption_mask)
    }
}
