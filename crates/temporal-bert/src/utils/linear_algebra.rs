use ndarray::{Array4, Zip};

/// Batched matmul over the last two axes: `[B, H, M, K] x [B, H, K, N]`.
///
/// Parallel over the batch axis. Heads within a batch element run on the
/// same worker.
#[inline]
pub fn matmul_4d(a: &Array4<f32>, b: &Array4<f32>) -> Array4<f32> {
    let (batch, heads, seq1, _) = a.dim();
    let seq2 = b.shape()[3];

    let mut output = Array4::<f32>::zeros((batch, heads, seq1, seq2));

    Zip::from(output.outer_iter_mut())
        .and(a.outer_iter())
        .and(b.outer_iter())
        .par_for_each(|mut out_b, a_b, b_b| {
            Zip::from(out_b.outer_iter_mut())
                .and(a_b.outer_iter())
                .and(b_b.outer_iter())
                .for_each(|mut out_h, a_h, b_h| {
                    out_h.assign(&a_h.dot(&b_h));
                });
        });

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, s, ArrayView2};

    #[test]
    fn test_matmul_4d_matches_2d() {
        let a = Array4::from_shape_fn((2, 3, 4, 5), |(b, h, i, k)| {
            ((b * 60 + h * 20 + i * 5 + k) as f32 * 0.1).cos()
        });
        let bm = Array4::from_shape_fn((2, 3, 5, 6), |(b, h, k, j)| {
            ((b * 90 + h * 30 + k * 6 + j) as f32 * 0.07).sin()
        });

        let out = matmul_4d(&a, &bm);
        assert_eq!(out.dim(), (2, 3, 4, 6));

        for b in 0..2 {
            for h in 0..3 {
                let a_h: ArrayView2<f32> = a.slice(s![b, h, .., ..]);
                let b_h: ArrayView2<f32> = bm.slice(s![b, h, .., ..]);
                let expected = a_h.dot(&b_h);
                let diff = (&out.slice(s![b, h, .., ..]) - &expected)
                    .mapv(f32::abs)
                    .fold(0.0f32, |m, &v| m.max(v));
                assert!(diff < 1e-6, "batch {} head {} max diff {}", b, h, diff);
            }
        }
    }

    #[test]
    fn test_matmul_4d_permuted_input() {
        // A transposed (non-contiguous) right-hand side.
        let a = Array4::from_shape_vec((1, 1, 1, 2), vec![1.0, 2.0]).unwrap();
        let mut k = Array4::from_shape_vec((1, 1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        k.swap_axes(2, 3);

        let out = matmul_4d(&a, &k);
        // [1, 2] x [[1, 3], [2, 4]] = [5, 11]
        assert_eq!(out.slice(s![0, 0, .., ..]), arr2(&[[5.0f32, 11.0]]));
    }
}
