//! Training vs. inference forward passes.

use rand::RngCore;

/// Selects how a forward pass treats its stochastic parts.
///
/// `Train` carries the random source used for the corruption mask and for
/// dropout. `Eval` is fully deterministic: no corruption, no dropout.
pub enum ForwardMode<'a> {
    Train(&'a mut dyn RngCore),
    Eval,
}

impl<'a> ForwardMode<'a> {
    #[inline]
    pub fn is_training(&self) -> bool {
        matches!(self, ForwardMode::Train(_))
    }

    /// The random source, if this is a training pass.
    #[inline]
    pub fn rng(&mut self) -> Option<&mut (dyn RngCore + 'a)> {
        match self {
            ForwardMode::Train(rng) => Some(&mut **rng),
            ForwardMode::Eval => None,
        }
    }
}

impl std::fmt::Debug for ForwardMode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardMode::Train(_) => write!(f, "Train"),
            ForwardMode::Eval => write!(f, "Eval"),
        }
    }
}
