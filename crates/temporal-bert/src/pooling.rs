//! Normalization of encoder outputs for downstream consumers.
//!
//! The encoder itself never post-processes its output; callers opt in here.

use ndarray::{Array3, ArrayView3, Axis};

/// Guards the L2 norm against division by zero.
pub const L2_EPS: f32 = 1e-12;

/// L2-normalizes every vector of a `[batch, seq, hidden]` tensor.
pub fn l2_normalize(hidden: &ArrayView3<f32>) -> Array3<f32> {
    let mut out = hidden.to_owned();
    for mut lane in out.lanes_mut(Axis(2)) {
        let norm = lane.iter().map(|x| x * x).sum::<f32>().sqrt();
        lane /= norm.max(L2_EPS);
    }
    out
}
