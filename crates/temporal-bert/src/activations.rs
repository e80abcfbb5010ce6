//! Activation functions and softmax operations.

use std::str::FromStr;

use libm::{erff, tanhf};
use ndarray::{parallel::prelude::*, s, Array2, Array4};
use serde::{Deserialize, Serialize};

/// Minimum array size for parallel execution.
pub const PARALLEL_THRESHOLD: usize = 16_384;

const SQRT_2_INV: f32 = 0.7071067811865475;
const SQRT_2_OVER_PI: f32 = 0.7978845608;
const GELU_COEFF: f32 = 0.044715;

/// Nonlinearity used inside the feed-forward sublayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Exact GELU, `0.5 x (1 + erf(x / sqrt 2))`.
    #[serde(rename = "gelu_exact", alias = "gelu_erf")]
    Gelu,
    /// Tanh approximation of GELU.
    #[default]
    #[serde(rename = "gelu", alias = "gelu_new", alias = "gelu_tanh")]
    GeluNew,
    Relu,
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gelu_exact" | "gelu_erf" => Ok(Activation::Gelu),
            "gelu" | "gelu_new" | "gelu_tanh" => Ok(Activation::GeluNew),
            "relu" => Ok(Activation::Relu),
            _ => Err(format!("unknown activation function: {}", s)),
        }
    }
}

#[inline(always)]
pub fn gelu_scalar(x: f32) -> f32 {
    0.5 * x * (1.0 + erff(x * SQRT_2_INV))
}

#[inline(always)]
pub fn gelu_new_scalar(x: f32) -> f32 {
    let x_cubed = x * x * x;
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x_cubed);
    0.5 * x * (1.0 + tanhf(inner))
}

#[inline(always)]
pub fn relu_scalar(x: f32) -> f32 {
    x.max(0.0)
}

impl Activation {
    #[inline(always)]
    pub fn apply_scalar(self, x: f32) -> f32 {
        match self {
            Activation::Gelu => gelu_scalar(x),
            Activation::GeluNew => gelu_new_scalar(x),
            Activation::Relu => relu_scalar(x),
        }
    }
}

/// Applies activation in-place to a 2D array.
pub fn apply_activation_2d(arr: &mut Array2<f32>, activation: Activation) {
    let use_parallel = arr.len() >= PARALLEL_THRESHOLD;
    if let Some(slice) = arr.as_slice_mut() {
        if use_parallel {
            slice
                .par_iter_mut()
                .for_each(|x| *x = activation.apply_scalar(*x));
        } else {
            slice
                .iter_mut()
                .for_each(|x| *x = activation.apply_scalar(*x));
        }
    } else if use_parallel {
        arr.par_mapv_inplace(|x| activation.apply_scalar(x));
    } else {
        arr.mapv_inplace(|x| activation.apply_scalar(x));
    }
}

/// Applies softmax in-place to a slice.
///
/// The row maximum is subtracted before exponentiation. A row whose entries
/// are all the mask sentinel still normalizes to a uniform distribution.
pub fn softmax_inplace(slice: &mut [f32]) {
    if slice.is_empty() {
        return;
    }

    let max = slice.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));

    let mut sum = 0.0;
    for v in slice.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }

    if sum > 0.0 {
        let scale = 1.0 / sum;
        for v in slice.iter_mut() {
            *v *= scale;
        }
    }
}

/// Applies softmax along the last axis of a 4D array `[batch, heads, q, k]`.
pub fn softmax_4d_inplace(scores: &mut Array4<f32>) {
    let (batch_size, num_heads, q_len, _) = scores.dim();

    for b in 0..batch_size {
        for h in 0..num_heads {
            for q in 0..q_len {
                let mut row_view = scores.slice_mut(s![b, h, q, ..]);

                if let Some(slice) = row_view.as_slice_mut() {
                    softmax_inplace(slice);
                } else {
                    let max = row_view.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
                    row_view.mapv_inplace(|x| (x - max).exp());
                    let sum = row_view.sum();
                    if sum > 0.0 {
                        row_view /= sum;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scalars() {
        assert_eq!(relu_scalar(1.0), 1.0);
        assert_eq!(relu_scalar(-1.0), 0.0);

        assert_relative_eq!(gelu_scalar(0.0), 0.0);
        assert_relative_eq!(gelu_scalar(1.0), 0.8413447, epsilon = 1e-5);

        assert_relative_eq!(gelu_new_scalar(0.0), 0.0);
        assert_relative_eq!(gelu_new_scalar(1.0), 0.841192, epsilon = 1e-5);
    }

    #[test]
    fn test_activation_from_str() {
        assert_eq!(Activation::from_str("gelu").unwrap(), Activation::GeluNew);
        assert_eq!(Activation::from_str("GELU_ERF").unwrap(), Activation::Gelu);
        assert_eq!(Activation::from_str("relu").unwrap(), Activation::Relu);
        assert!(Activation::from_str("swish").is_err());
    }

    #[test]
    fn test_activation_serde() {
        let act: Activation = serde_json::from_str("\"gelu_tanh\"").unwrap();
        assert_eq!(act, Activation::GeluNew);
        assert_eq!(serde_json::to_string(&Activation::Relu).unwrap(), "\"relu\"");
    }

    #[test]
    fn test_serde_and_from_str_agree() {
        for name in ["gelu", "gelu_new", "gelu_tanh", "gelu_exact", "gelu_erf", "relu"] {
            let from_json: Activation = serde_json::from_str(&format!("\"{}\"", name)).unwrap();
            assert_eq!(from_json, Activation::from_str(name).unwrap(), "{}", name);
        }
        for act in [Activation::Gelu, Activation::GeluNew, Activation::Relu] {
            let name = serde_json::to_string(&act).unwrap();
            assert_eq!(Activation::from_str(name.trim_matches('"')).unwrap(), act);
        }
    }

    #[test]
    fn test_apply_activation_2d() {
        let mut arr = Array2::from_elem((2, 2), -1.0f32);
        apply_activation_2d(&mut arr, Activation::Relu);
        assert!(arr.iter().all(|&x| x == 0.0));

        let size = PARALLEL_THRESHOLD + 100;
        let mut big = Array2::from_elem((1, size), 1.0f32);
        apply_activation_2d(&mut big, Activation::Gelu);
        assert_relative_eq!(big[[0, size - 1]], 0.8413447, epsilon = 1e-5);
    }

    #[test]
    fn test_softmax_inplace_basic() {
        let mut data = vec![1.0, 2.0, 3.0];
        softmax_inplace(&mut data);
        assert_relative_eq!(data[0], 0.09003057, epsilon = 1e-6);
        assert_relative_eq!(data[1], 0.24472847, epsilon = 1e-6);
        assert_relative_eq!(data[2], 0.66524094, epsilon = 1e-6);
        assert_relative_eq!(data.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_softmax_inplace_empty() {
        let mut data: Vec<f32> = vec![];
        softmax_inplace(&mut data);
        assert!(data.is_empty());
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let mut input = Array4::from_shape_vec((1, 1, 1, 3), vec![1000.0, 1001.0, 1002.0]).unwrap();
        softmax_4d_inplace(&mut input);

        assert_relative_eq!(input.sum(), 1.0, epsilon = 1e-6);
        assert!(!input.iter().any(|x| x.is_nan()));
    }

    #[test]
    fn test_softmax_ignores_sentinel() {
        let mut input =
            Array4::from_shape_vec((1, 1, 1, 3), vec![0.5, -1e9, 0.5]).unwrap();
        softmax_4d_inplace(&mut input);

        assert_relative_eq!(input[[0, 0, 0, 0]], 0.5, epsilon = 1e-6);
        assert_eq!(input[[0, 0, 0, 1]], 0.0);
        assert_relative_eq!(input[[0, 0, 0, 2]], 0.5, epsilon = 1e-6);
    }
}
