//! Inverted dropout.

use ndarray::{ArrayBase, DataMut, Dimension};
use rand::Rng;

use crate::mode::ForwardMode;

/// Zeroes activations with probability `p` during training and rescales the
/// survivors by `1 / (1 - p)`. Identity at inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    pub p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> Self {
        Self { p }
    }

    pub fn apply<S, D>(&self, x: &mut ArrayBase<S, D>, mode: &mut ForwardMode<'_>)
    where
        S: DataMut<Elem = f32>,
        D: Dimension,
    {
        if self.p <= 0.0 {
            return;
        }
        let Some(rng) = mode.rng() else {
            return;
        };
        if self.p >= 1.0 {
            x.fill(0.0);
            return;
        }

        let keep_scale = 1.0 / (1.0 - self.p);
        x.map_inplace(|v| {
            if rng.gen::<f32>() < self.p {
                *v = 0.0;
            } else {
                *v *= keep_scale;
            }
        });
    }
}
