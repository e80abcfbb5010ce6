//! Random corruption of input positions.
//!
//! Each non-classification position is replaced by a zero vector with an
//! independent Bernoulli draw. The mask is produced fresh on every training
//! pass and handed back to the caller so reconstruction or distillation
//! losses can be restricted to the corrupted positions.

use ndarray::{Array2, Array3, ArrayView2};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::error::{EncoderError, EncoderResult};
use crate::mode::ForwardMode;
use crate::utils::masks::create_corruption_mask;

/// `[batch, L]` flags over the input positions, `true` where corrupted.
///
/// Never covers the classification position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptionMask(Array2<bool>);

impl CorruptionMask {
    /// All-false mask.
    pub fn none(batch_size: usize, seq_len: usize) -> Self {
        Self(Array2::from_elem((batch_size, seq_len), false))
    }

    pub fn from_array(flags: Array2<bool>) -> Self {
        Self(flags)
    }

    pub fn as_array(&self) -> &Array2<bool> {
        &self.0
    }

    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array2<bool> {
        self.0
    }

    pub fn batch_size(&self) -> usize {
        self.0.nrows()
    }

    pub fn seq_len(&self) -> usize {
        self.0.ncols()
    }

    pub fn is_corrupted(&self, batch: usize, position: usize) -> bool {
        self.0[[batch, position]]
    }

    pub fn num_corrupted(&self) -> usize {
        self.0.iter().filter(|&&m| m).count()
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|&m| m)
    }

    /// `1.0` where corrupted, `0.0` elsewhere.
    pub fn to_weights(&self) -> Array2<f32> {
        self.0.mapv(|m| if m { 1.0 } else { 0.0 })
    }

    /// `[batch, L + 1, L + 1]` attention mask closing corrupted keys.
    pub fn attention_mask(&self) -> Array3<f32> {
        create_corruption_mask(&self.0.view())
    }
}

/// Per-position corruption with probability `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskingPolicy {
    probability: f32,
}

impl MaskingPolicy {
    pub fn new(probability: f32) -> EncoderResult<Self> {
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(EncoderError::config(format!(
                "corruption probability must be in [0, 1], got {}",
                probability
            )));
        }
        Ok(Self { probability })
    }

    pub fn disabled() -> Self {
        Self { probability: 0.0 }
    }

    pub fn probability(&self) -> f32 {
        self.probability
    }

    pub fn is_enabled(&self) -> bool {
        self.probability > 0.0
    }

    /// Draws a mask with independent Bernoulli(`p`) flags.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        seq_len: usize,
        rng: &mut R,
    ) -> EncoderResult<CorruptionMask> {
        if !self.is_enabled() {
            return Ok(CorruptionMask::none(batch_size, seq_len));
        }
        let dist = Bernoulli::new(self.probability as f64)
            .map_err(|e| EncoderError::config(format!("corruption probability: {}", e)))?;
        Ok(CorruptionMask(Array2::from_shape_simple_fn(
            (batch_size, seq_len),
            || dist.sample(rng),
        )))
    }

    /// Samples during training, all-false at inference.
    pub fn draw(
        &self,
        batch_size: usize,
        seq_len: usize,
        mode: &mut ForwardMode<'_>,
    ) -> EncoderResult<CorruptionMask> {
        match mode.rng() {
            Some(rng) if self.is_enabled() => self.sample(batch_size, seq_len, rng),
            _ => Ok(CorruptionMask::none(batch_size, seq_len)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_probability_never_corrupts() {
        let policy = MaskingPolicy::new(0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..10 {
            let mask = policy
                .draw(4, 8, &mut ForwardMode::Train(&mut rng))
                .unwrap();
            assert!(!mask.any());
        }
    }

    #[test]
    fn test_full_probability_corrupts_everything() {
        let policy = MaskingPolicy::new(1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..10 {
            let mask = policy
                .draw(3, 5, &mut ForwardMode::Train(&mut rng))
                .unwrap();
            assert_eq!(mask.num_corrupted(), 15);
        }
    }

    #[test]
    fn test_eval_never_corrupts() {
        let policy = MaskingPolicy::new(1.0).unwrap();
        let mask = policy.draw(2, 6, &mut ForwardMode::Eval).unwrap();
        assert_eq!(mask, CorruptionMask::none(2, 6));
    }

    #[test]
    fn test_corrupted_fraction_tracks_probability() {
        let policy = MaskingPolicy::new(0.2).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let mask = policy.sample(200, 50, &mut rng).unwrap();
        let fraction = mask.num_corrupted() as f32 / 10_000.0;
        assert!((fraction - 0.2).abs() < 0.02, "fraction {}", fraction);
    }

    #[test]
    fn test_seed_reproducibility() {
        let policy = MaskingPolicy::new(0.5).unwrap();
        let a = policy.sample(4, 16, &mut StdRng::seed_from_u64(77)).unwrap();
        let b = policy.sample(4, 16, &mut StdRng::seed_from_u64(77)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_invalid_probability() {
        assert!(MaskingPolicy::new(-0.1).is_err());
        assert!(MaskingPolicy::new(1.5).is_err());
        assert!(MaskingPolicy::new(f32::NAN).is_err());
    }

    #[test]
    fn test_weights_and_attention_mask() {
        let mask = CorruptionMask::from_array(ndarray::arr2(&[[true, false]]));
        assert_eq!(mask.to_weights(), ndarray::arr2(&[[1.0f32, 0.0]]));
        assert!(mask.is_corrupted(0, 0));

        let attn = mask.attention_mask();
        assert_eq!(attn.dim(), (1, 3, 3));
        assert_eq!(attn[[0, 2, 1]], 0.0);
        assert_eq!(attn[[0, 1, 1]], 1.0);
    }
}
