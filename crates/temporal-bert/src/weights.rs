//! Weight initialization and named-parameter access.
//!
//! Initializers are pure functions of a shape and a random source, so a
//! single component can be built in a test without constructing a model.
//! Every component exposes its tensors under stable dotted names keyed by
//! layer index and sublayer (`layers.0.attention.q_proj.weight`), which is
//! what checkpoint loaders and external optimizers address.

use std::collections::BTreeMap;

use ndarray::{Array, Array2, ArrayD, ArrayViewD, ArrayViewMutD, Dimension, ShapeBuilder};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::error::{EncoderError, EncoderResult};

/// Standard deviation used for the classification token and position table.
pub const EMBEDDING_INIT_STD: f32 = 0.02;

/// Ordered map of parameter name to tensor.
pub type StateDict = BTreeMap<String, ArrayD<f32>>;

/// Xavier/Glorot uniform initialization for a `[out, in]` weight matrix.
pub fn xavier_uniform<R: Rng + ?Sized>(
    out_features: usize,
    in_features: usize,
    rng: &mut R,
) -> Array2<f32> {
    let limit = (6.0 / (in_features + out_features).max(1) as f32).sqrt();
    Array2::random_using(
        (out_features, in_features),
        Uniform::new_inclusive(-limit, limit),
        rng,
    )
}

/// Zero-mean normal initialization with the given standard deviation.
pub fn normal<Sh, D, R>(shape: Sh, std: f32, rng: &mut R) -> EncoderResult<Array<f32, D>>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
    R: Rng + ?Sized,
{
    let dist = Normal::new(0.0f32, std)
        .map_err(|e| EncoderError::config(format!("invalid init std {}: {}", std, e)))?;
    Ok(Array::random_using(shape, dist, rng))
}

/// Joins a parameter name onto a dotted prefix.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// A component owning trainable tensors.
pub trait Parameterized {
    /// Pushes a view of every tensor, named under `prefix`.
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>);

    /// Pushes a mutable view of every tensor, in the same order as
    /// [`Parameterized::named_parameters`].
    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    );

    fn parameters(&self) -> Vec<(String, ArrayViewD<'_, f32>)> {
        let mut out = Vec::new();
        self.named_parameters("", &mut out);
        out
    }

    /// Mutable views for an external optimizer. Requires `&mut self`, so no
    /// forward pass can be in flight while weights are being updated.
    fn parameters_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut out = Vec::new();
        self.named_parameters_mut("", &mut out);
        out
    }

    /// Number of trainable scalars.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|(_, t)| t.len()).sum()
    }

    fn state_dict(&self) -> StateDict {
        self.parameters()
            .into_iter()
            .map(|(name, t)| (name, t.to_owned()))
            .collect()
    }

    /// Copies every tensor from `state`. Nothing is written unless every
    /// required name is present with the right shape.
    fn load_state_dict(&mut self, state: &StateDict) -> EncoderResult<()> {
        let mut expected = 0usize;
        for (name, tensor) in self.parameters() {
            let src = state
                .get(&name)
                .ok_or_else(|| EncoderError::MissingParameter(name.clone()))?;
            if src.shape() != tensor.shape() {
                return Err(EncoderError::shape(name, tensor.shape(), src.shape()));
            }
            expected += 1;
        }
        if state.len() > expected {
            log::warn!(
                "state dict has {} tensors not used by this model",
                state.len() - expected
            );
        }

        for (name, mut tensor) in self.parameters_mut() {
            if let Some(src) = state.get(&name) {
                tensor.assign(src);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_xavier_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let w = xavier_uniform(16, 8, &mut rng);
        let limit = (6.0f32 / 24.0).sqrt();

        assert_eq!(w.shape(), &[16, 8]);
        assert!(w.iter().all(|&v| v.abs() <= limit));
        assert!(w.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_init_is_seed_deterministic() {
        let a = xavier_uniform(4, 4, &mut StdRng::seed_from_u64(11));
        let b = xavier_uniform(4, 4, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_normal_rejects_bad_std() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = normal((2, 2), f32::NAN, &mut rng);
        assert!(matches!(result, Err(EncoderError::ConfigError(_))));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "weight"), "weight");
        assert_eq!(join("layers.0", "weight"), "layers.0.weight");
    }
}
