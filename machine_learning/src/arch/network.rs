use std::fmt::Write;

use harness::{Batch, Model, ModelErr, ModelResult};
use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD};

use super::{Sequential, loss::LossFn};
use crate::{MlErr, Result, optimization::Optimizer};

/// A sequential model bundled with its parameters, its loss function and its optimizer.
///
/// The last training input is kept around so iteration listeners can size the batch.
#[derive(Clone)]
pub struct Network<O, L> {
    name: String,
    model: Sequential,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: O,
    loss_fn: L,
    input: Option<ArrayD<f32>>,
    /// The prediction of the last `forward` call not yet backpropagated.
    output: Option<Array2<f32>>,
}

impl<O: Optimizer, L: LossFn> Network<O, L> {
    /// Creates a new `Network`.
    ///
    /// # Arguments
    /// * `name` - The name shown in the summary.
    /// * `model` - The layers.
    /// * `params` - The initial parameters, one per parameter of `model`.
    /// * `optimizer` - How gradients are applied.
    /// * `loss_fn` - What gets minimized.
    ///
    /// # Returns
    /// A new `Network` instance or an error if `params` doesn't fit `model`.
    pub fn new(
        name: impl Into<String>,
        model: Sequential,
        params: Vec<f32>,
        optimizer: O,
        loss_fn: L,
    ) -> Result<Self> {
        if params.len() != model.size() {
            return Err(MlErr::SizeMismatch {
                what: "initial parameters",
                got: params.len(),
                expected: model.size(),
            });
        }

        Ok(Self {
            name: name.into(),
            grad: vec![0.; params.len()],
            model,
            params,
            optimizer,
            loss_fn,
            input: None,
            output: None,
        })
    }

    /// Computes the gradient for `(x, y)` into `self.grad`, reusing a pending prediction.
    fn compute_grad(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        let y_pred = match self.output.take() {
            Some(y_pred) if y_pred.nrows() == x.nrows() => y_pred,
            _ => self.model.forward(&self.params, x)?,
        };

        if y_pred.dim() != y.dim() {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: y.len(),
                expected: y_pred.len(),
            });
        }

        let loss = self.loss_fn.loss(y_pred.view(), y);
        let d = self.loss_fn.loss_prime(y_pred.view(), y);
        self.model.backward(&self.params, &mut self.grad, d)?;

        Ok(loss)
    }
}

/// Views a batch as a matrix with one example per row.
fn as_rows<'a>(a: ArrayViewD<'a, f32>) -> Result<ArrayView2<'a, f32>> {
    let rows = a.shape().first().copied().unwrap_or(1);
    let cols = if rows == 0 { 0 } else { a.len() / rows };

    Ok(a.into_shape_with_order((rows, cols))?)
}

impl<O, L> Model for Network<O, L>
where
    O: Optimizer + Clone + Send + 'static,
    L: LossFn + Clone + Send + 'static,
{
    fn train_step(&mut self, batch: &Batch) -> ModelResult<f32> {
        let x = as_rows(batch.features.view())?;
        let y = as_rows(batch.labels.view())?;

        self.output = None;
        let loss = self.compute_grad(x, y)?;
        self.optimizer.update_params(&mut self.params, &self.grad);
        self.input = Some(batch.features.clone());

        Ok(loss)
    }

    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> ModelResult<ArrayD<f32>> {
        let x = as_rows(input)?;
        let y_pred = self.model.forward(&self.params, x)?;

        self.output = Some(y_pred.clone());
        Ok(y_pred.into_dyn())
    }

    fn backward(
        &mut self,
        input: ArrayViewD<'_, f32>,
        labels: ArrayViewD<'_, f32>,
    ) -> ModelResult<Vec<f32>> {
        let x = as_rows(input)?;
        let y = as_rows(labels)?;

        self.compute_grad(x, y)?;
        Ok(self.grad.clone())
    }

    fn param_count(&self) -> usize {
        self.params.len()
    }

    fn layer_count(&self) -> usize {
        self.model.layers().len()
    }

    fn summary(&self) -> String {
        let mut out = format!(
            "{} ({} loss, {} optimizer)\n",
            self.name,
            self.loss_fn.name(),
            self.optimizer.name()
        );

        for (i, layer) in self.model.layers().iter().enumerate() {
            let (n_in, n_out) = layer.dim();
            let act = layer.act_fn().map_or("linear", |f| f.name());
            let _ = writeln!(
                out,
                "{i:>4}  dense {n_in:>6} -> {n_out:<6} {act:<8} {:>10} params",
                layer.size()
            );
        }

        let _ = write!(out, "total parameters: {}", self.params.len());
        out
    }

    fn current_inputs(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.input.iter().map(|x| x.view()).collect()
    }

    fn params(&self) -> Vec<f32> {
        self.params.clone()
    }

    fn set_params(&mut self, params: &[f32]) -> ModelResult<()> {
        if params.len() != self.params.len() {
            return Err(ModelErr::SizeMismatch {
                what: "network parameters",
                got: params.len(),
                expected: self.params.len(),
            });
        }

        self.params.copy_from_slice(params);
        self.output = None;
        Ok(())
    }

    fn replicate(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}
