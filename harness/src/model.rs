use ndarray::{ArrayD, ArrayViewD};

use crate::error::ModelResult;

/// One mini-batch of examples, both arrays have the example dimension first.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub features: ArrayD<f32>,
    pub labels: ArrayD<f32>,
}

impl Batch {
    /// Creates a new `Batch`.
    ///
    /// # Arguments
    /// * `features` - The input data.
    /// * `labels` - The expected output.
    ///
    /// # Returns
    /// A new `Batch` instance.
    pub fn new(features: ArrayD<f32>, labels: ArrayD<f32>) -> Self {
        Self { features, labels }
    }

    /// The amount of examples in this batch.
    pub fn len(&self) -> usize {
        self.features.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A trainable network as seen by the benchmark.
///
/// Layered stacks and general graphs both implement this contract, the harness never
/// inspects which one it got.
pub trait Model: Send {
    /// Runs one full training step (forward, backward and parameter update) over `batch`.
    ///
    /// # Returns
    /// The score (loss) of the step or an error if occurred.
    fn train_step(&mut self, batch: &Batch) -> ModelResult<f32>;

    /// Computes the output activations for `input` without computing gradients.
    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> ModelResult<ArrayD<f32>>;

    /// Computes the gradient of the loss with respect to every parameter, without updating them.
    ///
    /// # Returns
    /// The flat gradient, one entry per parameter.
    fn backward(
        &mut self,
        input: ArrayViewD<'_, f32>,
        labels: ArrayViewD<'_, f32>,
    ) -> ModelResult<Vec<f32>>;

    fn param_count(&self) -> usize;

    fn layer_count(&self) -> usize;

    /// A human readable description of the topology.
    fn summary(&self) -> String;

    /// Every input the model last consumed, in declaration order.
    fn current_inputs(&self) -> Vec<ArrayViewD<'_, f32>>;

    /// The input the model last consumed. Multi-input models report their first input.
    fn current_input(&self) -> Option<ArrayViewD<'_, f32>> {
        self.current_inputs().into_iter().next()
    }

    /// A copy of the flat parameter vector.
    fn params(&self) -> Vec<f32>;

    /// Overwrites every parameter with `params`.
    ///
    /// # Errors
    /// `ModelErr::SizeMismatch` if `params` is not `param_count()` long.
    fn set_params(&mut self, params: &[f32]) -> ModelResult<()>;

    /// An independent copy of this model, used as a worker replica.
    fn replicate(&self) -> Box<dyn Model>;
}
