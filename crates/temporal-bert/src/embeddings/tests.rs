use anyhow::Result;
use approx::assert_relative_eq;
use ndarray::{arr2, Array1, Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::TemporalEmbeddings;
use crate::dropout::Dropout;
use crate::error::EncoderError;
use crate::linear_layer::LinearLayer;
use crate::masking::CorruptionMask;
use crate::mode::ForwardMode;
use crate::weights::Parameterized;

fn fixed_embeddings(input_width: usize, projection: Option<LinearLayer>) -> TemporalEmbeddings {
    // hidden 2, L = 2
    let cls = Array1::from_vec(vec![10.0, 20.0]);
    let pos = arr2(&[[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]);
    TemporalEmbeddings::new(input_width, projection, cls, pos, Dropout::new(0.0)).unwrap()
}

#[test]
fn test_prepends_cls_and_adds_positions() -> Result<()> {
    let emb = fixed_embeddings(2, None);
    let features = Array3::from_shape_vec((1, 2, 2), vec![1.0, 2.0, 3.0, 4.0])?;
    let out = emb.forward(&features.view(), &CorruptionMask::none(1, 2), &mut ForwardMode::Eval)?;

    assert_eq!(out.dim(), (1, 3, 2));
    let expected = [[10.1, 20.2], [1.3, 2.4], [3.5, 4.6]];
    for (p, row) in expected.iter().enumerate() {
        for (h, &v) in row.iter().enumerate() {
            assert_relative_eq!(out[[0, p, h]], v, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn test_corrupted_positions_keep_only_position_signal() -> Result<()> {
    let emb = fixed_embeddings(2, None);
    let features = Array3::from_shape_vec((1, 2, 2), vec![1.0, 2.0, 3.0, 4.0])?;
    let mask = CorruptionMask::from_array(arr2(&[[false, true]]));
    let out = emb.forward(&features.view(), &mask, &mut ForwardMode::Eval)?;

    assert_relative_eq!(out[[0, 1, 0]], 1.3, epsilon = 1e-6);
    assert_relative_eq!(out[[0, 2, 0]], 0.5, epsilon = 1e-6);
    assert_relative_eq!(out[[0, 2, 1]], 0.6, epsilon = 1e-6);
    // The classification position is never corrupted.
    assert_relative_eq!(out[[0, 0, 0]], 10.1, epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_projection_from_wider_input() -> Result<()> {
    // 3 -> 2: sum of first two, and last component
    let proj = LinearLayer::new_f32(arr2(&[[1.0, 1.0, 0.0], [0.0, 0.0, 1.0]]), None);
    let emb = fixed_embeddings(3, Some(proj));
    let features = Array3::from_shape_vec((1, 2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    let out = emb.forward(&features.view(), &CorruptionMask::none(1, 2), &mut ForwardMode::Eval)?;

    assert_relative_eq!(out[[0, 1, 0]], 3.3, epsilon = 1e-6);
    assert_relative_eq!(out[[0, 1, 1]], 3.4, epsilon = 1e-6);
    assert_relative_eq!(out[[0, 2, 0]], 9.5, epsilon = 1e-6);
    assert_relative_eq!(out[[0, 2, 1]], 6.6, epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_rejects_wrong_length_and_width() {
    let emb = fixed_embeddings(2, None);

    let too_long = Array3::<f32>::zeros((1, 3, 2));
    let err = emb
        .forward(&too_long.view(), &CorruptionMask::none(1, 3), &mut ForwardMode::Eval)
        .unwrap_err();
    assert!(matches!(err, EncoderError::ShapeMismatch { .. }));

    let too_wide = Array3::<f32>::zeros((1, 2, 5));
    let err = emb
        .forward(&too_wide.view(), &CorruptionMask::none(1, 2), &mut ForwardMode::Eval)
        .unwrap_err();
    assert!(matches!(err, EncoderError::ShapeMismatch { .. }));
}

#[test]
fn test_rejects_missing_projection() {
    let err = TemporalEmbeddings::new(
        4,
        None,
        Array1::zeros(2),
        Array2::zeros((3, 2)),
        Dropout::new(0.0),
    )
    .unwrap_err();
    assert!(matches!(err, EncoderError::ShapeMismatch { .. }));
}

#[test]
fn test_init_shapes_and_names() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(8);
    let emb = TemporalEmbeddings::init(6, 4, 5, Dropout::new(0.1), &mut rng)?;
    assert_eq!(emb.seq_len(), 5);
    assert_eq!(emb.hidden_size(), 4);
    assert_eq!(emb.position_embeddings.dim(), (6, 4));

    let names: Vec<_> = emb.parameters().into_iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        [
            "cls_token",
            "position_embeddings",
            "projection.weight",
            "projection.bias"
        ]
    );

    let same_width = TemporalEmbeddings::init(4, 4, 5, Dropout::new(0.1), &mut rng)?;
    assert!(same_width.projection.is_none());
    Ok(())
}

#[test]
fn test_init_std_is_small() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(8);
    let emb = TemporalEmbeddings::init(64, 64, 63, Dropout::new(0.0), &mut rng)?;
    let n = emb.position_embeddings.len() as f32;
    let mean = emb.position_embeddings.sum() / n;
    let var = emb.position_embeddings.mapv(|v| (v - mean).powi(2)).sum() / n;
    assert!(mean.abs() < 0.005, "mean {}", mean);
    assert!((var.sqrt() - 0.02).abs() < 0.002, "std {}", var.sqrt());
    Ok(())
}
