use approx::assert_abs_diff_eq;
use ndarray::{arr1, arr2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::EncoderError;
use crate::linear_layer::LinearLayer;
use crate::weights::Parameterized;

// Helper to create a standard test layer
fn create_layer() -> LinearLayer {
    // Weights: 2x2 matrix
    // [[1.0, 2.0],
    //  [3.0, 4.0]]
    let weights = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
    LinearLayer::new_f32(weights, None)
}

#[test]
fn test_matmul_basic() {
    let layer = create_layer();
    let input = arr2(&[[1.0, 1.0]]);

    // Expected: Input @ Weights^T
    // [1*1 + 1*2, 1*3 + 1*4] = [3.0, 7.0]
    let output = layer.matmul(&input.view());

    assert_eq!(output, arr2(&[[3.0f32, 7.0]]));
}

#[test]
fn test_matmul_with_bias() {
    let weights = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
    let bias = arr1(&[10.0, 20.0]);
    let layer = LinearLayer::new_f32(weights, Some(bias));

    let input = arr2(&[[1.0, 1.0]]);
    let output = layer.matmul(&input.view());

    // [3.0 + 10.0, 7.0 + 20.0]
    assert_eq!(output, arr2(&[[13.0f32, 27.0]]));
}

#[test]
fn test_matmul_batch() {
    let layer = create_layer();
    let input = arr2(&[[1.0, 0.0], [0.0, 1.0]]);

    let output = layer.matmul(&input.view());

    // Row 0: [1*1 + 0*2, 1*3 + 0*4] = [1.0, 3.0]
    // Row 1: [0*1 + 1*2, 0*3 + 1*4] = [2.0, 4.0]
    assert_eq!(output, arr2(&[[1.0f32, 3.0], [2.0, 4.0]]));
}

#[test]
fn test_non_square_projection() {
    // 3 inputs -> 2 outputs
    let weights = arr2(&[[1.0, 0.0, -1.0], [0.5, 0.5, 0.5]]);
    let layer = LinearLayer::new_f32(weights, None);
    assert_eq!(layer.shape(), [2, 3]);

    let output = layer.matmul(&arr2(&[[2.0, 4.0, 6.0]]).view());
    assert_eq!(output, arr2(&[[-4.0f32, 6.0]]));
}

#[test]
fn test_forward_3d_matches_rowwise() {
    let layer = LinearLayer::new_f32(
        arr2(&[[1.0, 2.0], [3.0, 4.0], [-1.0, 0.5]]),
        arr1(&[0.1, 0.2, 0.3]),
    );
    let input = Array3::from_shape_fn((2, 3, 2), |(b, s, k)| (b * 6 + s * 2 + k) as f32 * 0.25);

    let out = layer.forward_3d(&input.view()).unwrap();
    assert_eq!(out.dim(), (2, 3, 3));

    for b in 0..2 {
        let expected = layer.matmul(&input.index_axis(ndarray::Axis(0), b));
        for s in 0..3 {
            for o in 0..3 {
                assert_abs_diff_eq!(out[[b, s, o]], expected[[s, o]], epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_forward_3d_non_contiguous_input() {
    let layer = create_layer();
    let base = Array3::from_shape_fn((2, 3, 2), |(b, s, k)| (b + s + k) as f32);
    let mut permuted = base.clone();
    permuted.swap_axes(0, 1);

    let out = layer.forward_3d(&permuted.view()).unwrap();
    assert_eq!(out.dim(), (3, 2, 2));
    // Position (s=1, b=1): input [2, 3] -> [8, 18]
    assert_eq!(out[[1, 1, 0]], 8.0);
    assert_eq!(out[[1, 1, 1]], 18.0);
}

#[test]
fn test_forward_3d_rejects_wrong_width() {
    let layer = create_layer();
    let input = Array3::<f32>::zeros((1, 2, 3));
    let err = layer.forward_3d(&input.view()).unwrap_err();
    assert!(matches!(err, EncoderError::ShapeMismatch { .. }));
}

#[test]
fn test_xavier_has_zero_bias() {
    let mut rng = StdRng::seed_from_u64(1);
    let layer = LinearLayer::xavier(6, 4, &mut rng);
    assert_eq!(layer.shape(), [6, 4]);
    assert!(layer.bias.as_ref().unwrap().iter().all(|&b| b == 0.0));
}

#[test]
fn test_named_parameters() {
    let mut rng = StdRng::seed_from_u64(1);
    let layer = LinearLayer::xavier(3, 2, &mut rng);

    let mut params = Vec::new();
    layer.named_parameters("proj", &mut params);
    let names: Vec<_> = params.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["proj.weight", "proj.bias"]);
    assert_eq!(layer.num_parameters(), 9);

    let no_bias = create_layer();
    assert_eq!(no_bias.parameters().len(), 1);
}
