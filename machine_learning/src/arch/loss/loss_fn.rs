use ndarray::{Array2, ArrayView2};

/// A loss over a batch of predictions, one row per example.
pub trait LossFn {
    /// The name shown in model summaries.
    fn name(&self) -> &'static str;

    /// The mean loss of `y_pred` against the expected `y`.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// The derivative of `loss` with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}
