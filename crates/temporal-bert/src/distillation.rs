//! Reconstruction and distillation losses over encoder outputs.
//!
//! Values only; gradients are the training loop's concern.

use ndarray::{ArrayView3, Zip};

use crate::error::{EncoderError, EncoderResult};
use crate::masking::CorruptionMask;

fn check_pair(prediction: &ArrayView3<f32>, target: &ArrayView3<f32>) -> EncoderResult<()> {
    if prediction.dim() != target.dim() {
        return Err(EncoderError::shape(
            "distillation target",
            prediction.shape(),
            target.shape(),
        ));
    }
    Ok(())
}

/// Mean squared error over every element of two `[batch, L, width]` tensors.
pub fn feature_mse(prediction: &ArrayView3<f32>, target: &ArrayView3<f32>) -> EncoderResult<f32> {
    check_pair(prediction, target)?;
    if prediction.is_empty() {
        return Ok(0.0);
    }
    let sum = Zip::from(prediction)
        .and(target)
        .fold(0.0f32, |acc, &p, &t| acc + (p - t) * (p - t));
    Ok(sum / prediction.len() as f32)
}

/// Mean squared error restricted to corrupted positions.
///
/// Averages over every feature of every corrupted position. Zero when
/// nothing was corrupted.
pub fn masked_mse(
    prediction: &ArrayView3<f32>,
    target: &ArrayView3<f32>,
    mask: &CorruptionMask,
) -> EncoderResult<f32> {
    check_pair(prediction, target)?;
    let (batch_size, seq_len, width) = prediction.dim();
    if mask.as_array().dim() != (batch_size, seq_len) {
        return Err(EncoderError::shape(
            "corruption mask",
            [batch_size, seq_len],
            mask.as_array().shape(),
        ));
    }

    let corrupted = mask.num_corrupted();
    if corrupted == 0 || width == 0 {
        return Ok(0.0);
    }

    let mut sum = 0.0f32;
    for ((b, t), &is_corrupted) in mask.as_array().indexed_iter() {
        if !is_corrupted {
            continue;
        }
        let p = prediction.slice(ndarray::s![b, t, ..]);
        let q = target.slice(ndarray::s![b, t, ..]);
        sum += Zip::from(&p)
            .and(&q)
            .fold(0.0f32, |acc, &x, &y| acc + (x - y) * (x - y));
    }
    Ok(sum / (corrupted * width) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr2, Array3};

    #[test]
    fn test_feature_mse() {
        let a = Array3::from_elem((2, 3, 4), 1.0f32);
        let b = Array3::from_elem((2, 3, 4), 3.0f32);
        assert_relative_eq!(feature_mse(&a.view(), &b.view()).unwrap(), 4.0);
        assert_eq!(feature_mse(&a.view(), &a.view()).unwrap(), 0.0);
    }

    #[test]
    fn test_masked_mse_only_counts_corrupted() {
        let prediction = Array3::from_shape_vec((1, 2, 2), vec![1.0, 1.0, 5.0, 5.0]).unwrap();
        let target = Array3::<f32>::zeros((1, 2, 2));
        let mask = CorruptionMask::from_array(arr2(&[[true, false]]));

        let loss = masked_mse(&prediction.view(), &target.view(), &mask).unwrap();
        assert_relative_eq!(loss, 1.0);
    }

    #[test]
    fn test_masked_mse_without_corruption_is_zero() {
        let prediction = Array3::from_elem((2, 3, 2), 7.0f32);
        let target = Array3::<f32>::zeros((2, 3, 2));
        let loss = masked_mse(&prediction.view(), &target.view(), &CorruptionMask::none(2, 3)).unwrap();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_shape_checks() {
        let a = Array3::<f32>::zeros((1, 2, 2));
        let b = Array3::<f32>::zeros((1, 3, 2));
        assert!(matches!(
            feature_mse(&a.view(), &b.view()),
            Err(EncoderError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            masked_mse(&a.view(), &a.view(), &CorruptionMask::none(1, 3)),
            Err(EncoderError::ShapeMismatch { .. })
        ));
    }
}
