use ndarray::{Array3, ArrayView3, ArrayViewD, ArrayViewMutD};
use rand::Rng;

use crate::activations::{apply_activation_2d, Activation};
use crate::error::{EncoderError, EncoderResult};
use crate::linear_layer::LinearLayer;
use crate::weights::{join, Parameterized};

/// Two-layer MLP applied independently at every position:
/// `fc2(act(fc1(x)))`.
#[derive(Debug, Clone, PartialEq)]
pub struct StdFeedForward {
    pub fc1: LinearLayer,
    pub fc2: LinearLayer,
    pub activation: Activation,
}

impl StdFeedForward {
    /// Creates a new feed-forward sublayer.
    ///
    /// # Arguments
    /// * `fc1` - Expansion, weight shape `[intermediate, hidden]` ([Out, In])
    /// * `fc2` - Contraction, weight shape `[hidden, intermediate]` ([Out, In])
    pub fn new(fc1: LinearLayer, fc2: LinearLayer, activation: Activation) -> EncoderResult<Self> {
        if fc1.out_features() != fc2.in_features() || fc1.in_features() != fc2.out_features() {
            return Err(EncoderError::shape(
                "feed-forward fc2 weight",
                [fc1.in_features(), fc1.out_features()],
                fc2.shape(),
            ));
        }
        Ok(Self {
            fc1,
            fc2,
            activation,
        })
    }

    pub fn xavier<R: Rng + ?Sized>(
        hidden: usize,
        intermediate: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        Self {
            fc1: LinearLayer::xavier(intermediate, hidden, rng),
            fc2: LinearLayer::xavier(hidden, intermediate, rng),
            activation,
        }
    }

    pub fn intermediate_size(&self) -> usize {
        self.fc1.out_features()
    }

    pub fn forward(&self, hidden: &ArrayView3<f32>) -> EncoderResult<Array3<f32>> {
        let (batch, seq, width) = hidden.dim();
        if width != self.fc1.in_features() {
            return Err(EncoderError::shape(
                "feed-forward input",
                [batch, seq, self.fc1.in_features()],
                [batch, seq, width],
            ));
        }

        // Ensure contiguous layout before reshape
        let hidden_contig = hidden.as_standard_layout();
        let hidden_2d = hidden_contig
            .view()
            .into_shape_with_order((batch * seq, width))?;

        // FC1 + Activation
        let mut intermediate = self.fc1.matmul(&hidden_2d);
        apply_activation_2d(&mut intermediate, self.activation);

        // FC2
        let output = self.fc2.matmul(&intermediate.view());

        Ok(output.into_shape_with_order((batch, seq, self.fc2.out_features()))?)
    }
}

impl Parameterized for StdFeedForward {
    fn named_parameters<'a>(&'a self, prefix: &str, out: &mut Vec<(String, ArrayViewD<'a, f32>)>) {
        self.fc1.named_parameters(&join(prefix, "fc1"), out);
        self.fc2.named_parameters(&join(prefix, "fc2"), out);
    }

    fn named_parameters_mut<'a>(
        &'a mut self,
        prefix: &str,
        out: &mut Vec<(String, ArrayViewMutD<'a, f32>)>,
    ) {
        self.fc1.named_parameters_mut(&join(prefix, "fc1"), out);
        self.fc2.named_parameters_mut(&join(prefix, "fc2"), out);
    }
}
