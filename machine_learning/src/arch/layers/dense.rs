use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer with an optional activation function.
///
/// Its parameters live outside of it, in a flat slice laid out as the `dim.0 x dim.1`
/// weights in row-major order followed by the `dim.1` biases.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense`.
    ///
    /// # Arguments
    /// * `dim` - The input and output sizes.
    /// * `act_fn` - The activation applied to the outputs, if any.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: Array2::zeros((0, dim.0)),
            z: Array2::zeros((0, dim.1)),
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn act_fn(&self) -> Option<&ActFn> {
        self.act_fn.as_ref()
    }

    /// Computes this layer's output for the batch `x`, one example per row.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The input batch.
    ///
    /// # Returns
    /// The activated output or an error if `x` or `params` don't fit this layer.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        self.x = x.to_owned();
        self.z = z;
        Ok(a)
    }

    /// Backpropagates `d`, the loss derivative with respect to this layer's last output.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - Where this layer's gradient is written.
    /// * `d` - The incoming delta.
    ///
    /// # Returns
    /// The delta with respect to this layer's last input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "dense delta",
                got: d.len(),
                expected: self.z.len(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut dx);

        Ok(dx)
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let (w_raw, b_raw) = params.split_at(w_size);
        let weights = ArrayView2::from_shape(self.dim, w_raw)?;
        let biases = ArrayView1::from_shape(self.dim.1, b_raw)?;
        Ok((weights, biases))
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

    // w = [[1, 2], [3, 4]], b = [0.5, -0.5]
    const PARAMS: [f32; 6] = [1., 2., 3., 4., 0.5, -0.5];

    #[test]
    fn forward_is_an_affine_map() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 1.], [0., 2.]];

        let y = dense.forward(&PARAMS, x.view()).unwrap();
        assert_eq!(y, array![[4.5, 5.5], [6.5, 7.5]]);
    }

    #[test]
    fn backward_writes_weight_and_bias_gradients() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 1.], [0., 2.]];
        dense.forward(&PARAMS, x.view()).unwrap();

        let mut grad = [0.; 6];
        let d = array![[1., 0.], [0., 1.]];
        let dx = dense.backward(&PARAMS, &mut grad, d).unwrap();

        // dw = x^T d, db = sum of d's rows, dx = d w^T.
        assert_eq!(grad, [1., 0., 1., 2., 1., 1.]);
        assert_eq!(dx, array![[1., 3.], [2., 4.]]);
    }

    #[test]
    fn activations_scale_the_delta() {
        let mut dense = Dense::new((2, 2), Some(ActFn::relu()));
        let neg = [-1., 0., 0., -1., 0., 0.];
        let x = array![[1., 1.]];

        let y = dense.forward(&neg, x.view()).unwrap();
        assert_eq!(y, array![[0., 0.]]);

        let mut grad = [9.; 6];
        dense.backward(&neg, &mut grad, array![[1., 1.]]).unwrap();
        assert_eq!(grad, [0.; 6]);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let mut dense = Dense::new((2, 2), None);
        let x = array![[1., 1., 1.]];

        assert!(matches!(
            dense.forward(&PARAMS, x.view()),
            Err(MlErr::SizeMismatch { what: "dense input", .. })
        ));
        assert!(matches!(
            dense.forward(&PARAMS[..4], array![[1., 1.]].view()),
            Err(MlErr::SizeMismatch { what: "dense parameters", .. })
        ));
    }
}
