//! Attention masks over the encoded sequence.
//!
//! Masks are `[batch, query, key]` arrays holding `1.0` where a query may
//! attend to a key and `0.0` where it may not. Index 0 is always the
//! classification position. Every constructor here keeps the diagonal and
//! the classification column open.

use ndarray::{s, Array3, Array4, ArrayView2, Axis, Zip};

use crate::error::{EncoderError, EncoderResult};

pub const MASK_VALUE: f32 = -1e9;

/// Full bidirectional attention.
pub fn create_full_attention_mask(batch_size: usize, seq_len: usize) -> Array3<f32> {
    Array3::ones((batch_size, seq_len, seq_len))
}

/// Blocks attention to corrupted keys.
///
/// `corrupted` is `[batch, L]` over the non-classification positions; the
/// returned mask is `[batch, L + 1, L + 1]`. A corrupted position still
/// attends to itself, and every position still attends to the
/// classification position.
pub fn create_corruption_mask(corrupted: &ArrayView2<bool>) -> Array3<f32> {
    let (batch_size, len) = corrupted.dim();
    let seq_len = len + 1;
    let mut mask = create_full_attention_mask(batch_size, seq_len);

    for ((b, t), &is_corrupted) in corrupted.indexed_iter() {
        if is_corrupted {
            let key = t + 1;
            mask.slice_mut(s![b, .., key]).fill(0.0);
            mask[[b, key, key]] = 1.0;
        }
    }
    mask
}

/// Asymmetric mask for a sequence made of two concatenated streams.
///
/// Positions `1..=primary_len` are the primary stream and attend only to
/// the classification position and to each other. The classification
/// position and the auxiliary positions attend everywhere.
pub fn create_two_stream_mask(
    batch_size: usize,
    seq_len: usize,
    primary_len: usize,
) -> EncoderResult<Array3<f32>> {
    if primary_len == 0 || primary_len + 1 >= seq_len {
        return Err(EncoderError::config(format!(
            "two-stream split {} must leave both streams non-empty in a sequence of {} positions",
            primary_len,
            seq_len.saturating_sub(1)
        )));
    }

    let mut mask = create_full_attention_mask(batch_size, seq_len);
    mask.slice_mut(s![.., 1..=primary_len, primary_len + 1..])
        .fill(0.0);
    Ok(mask)
}

/// Element-wise intersection of two masks of the same shape.
pub fn intersect_masks(a: &Array3<f32>, b: &Array3<f32>) -> EncoderResult<Array3<f32>> {
    if a.dim() != b.dim() {
        return Err(EncoderError::shape("attention mask", a.shape(), b.shape()));
    }
    let mut out = a.clone();
    Zip::from(&mut out).and(b).for_each(|x, &y| {
        if y == 0.0 {
            *x = 0.0;
        }
    });
    Ok(out)
}

/// Sets scores of disallowed pairs to [`MASK_VALUE`].
///
/// `scores` is `[batch, heads, query, key]`, `mask` is `[batch, query, key]`
/// and is shared across heads.
pub fn apply_attention_mask(scores: &mut Array4<f32>, mask: &Array3<f32>) -> EncoderResult<()> {
    let (batch_size, num_heads, seq_q, seq_k) = scores.dim();

    if mask.dim() != (batch_size, seq_q, seq_k) {
        return Err(EncoderError::shape(
            "attention mask",
            [batch_size, seq_q, seq_k],
            mask.shape(),
        ));
    }

    // [batch, q, k] -> [batch, 1, q, k]
    let mask_expanded = mask.view().insert_axis(Axis(1));

    if let Some(broadcast_mask) = mask_expanded.broadcast((batch_size, num_heads, seq_q, seq_k)) {
        Zip::from(scores).and(&broadcast_mask).for_each(|s, &m| {
            if m == 0.0 {
                *s = MASK_VALUE;
            }
        });
    }

    Ok(())
}
