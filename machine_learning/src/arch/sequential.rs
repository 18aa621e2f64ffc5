use ndarray::{Array2, ArrayView2};

use super::layers::Dense;
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The parameters of every layer are passed in as one flat slice, layer after layer.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
    size: usize,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Dense>,
    {
        let layers: Vec<_> = layers.into_iter().collect();
        let size = layers.iter().map(Dense::size).sum();

        Self { layers, size }
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The parameters of every layer.
    /// * `x` - The input data.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_len("model parameters", params.len())?;

        let mut rest = params;
        let mut out: Option<Array2<f32>> = None;

        for layer in &mut self.layers {
            let (layer_params, tail) = rest.split_at(layer.size());
            rest = tail;

            let input = match &out {
                Some(a) => a.view(),
                None => x.view(),
            };
            out = Some(layer.forward(layer_params, input)?);
        }

        Ok(out.unwrap_or_else(|| x.to_owned()))
    }

    /// Makes a backward pass through the network, writing the gradient of every layer.
    ///
    /// Must follow a `forward` call, whose intermediate results it uses.
    ///
    /// # Arguments
    /// * `params` - The parameters of every layer.
    /// * `grad` - Where the gradient of every layer is written, laid out as `params`.
    /// * `d` - The loss derivative with respect to the last prediction.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Result<()> {
        self.check_len("model parameters", params.len())?;
        self.check_len("model gradient", grad.len())?;

        let mut end = params.len();
        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn layers_are_chained_in_order() {
        let mut model = Sequential::new([Dense::new((2, 1), None), Dense::new((1, 2), None)]);
        assert_eq!(model.size(), 3 + 4);

        // h = x0 + x1 + 1, then [2h, -2h]
        let params = [1., 1., 1., 2., -2., 0., 0.];
        let y = model.forward(&params, array![[1., 0.5]].view()).unwrap();

        assert_eq!(y, array![[5., -5.]]);
    }

    #[test]
    fn backward_fills_the_whole_gradient() {
        let mut model = Sequential::new([Dense::new((2, 1), None), Dense::new((1, 1), None)]);
        let params = [1., 1., 0., 3., 0.];
        model.forward(&params, array![[1., 2.]].view()).unwrap();

        let mut grad = [0.; 5];
        model.backward(&params, &mut grad, array![[1.]]).unwrap();

        // The hidden output is 3 and the second weight is 3.
        assert_eq!(grad, [3., 6., 3., 3., 1.]);
    }

    #[test]
    fn wrong_parameter_counts_are_rejected() {
        let mut model = Sequential::new([Dense::new((2, 1), None)]);
        let err = model.forward(&[1., 1.], array![[1., 2.]].view()).unwrap_err();

        assert!(matches!(err, MlErr::SizeMismatch { expected: 3, .. }));
    }
}
