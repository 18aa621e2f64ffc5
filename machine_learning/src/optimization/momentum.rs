use rayon::prelude::*;

use super::Optimizer;

/// Gradient descent with momentum and L2 weight decay.
///
/// Each step computes `v = mu * v + (g + l2 * p)` and then `p -= lr * v`.
#[derive(Debug, Clone)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    l2: f32,
    velocity: Vec<f32>,
}

impl GradientDescentWithMomentum {
    /// Returns a new `GradientDescentWithMomentum`.
    ///
    /// # Arguments
    /// * `learning_rate` - The step length.
    /// * `momentum` - How much of the previous velocity carries over.
    /// * `l2` - The weight decay coefficient, zero disables it.
    pub fn new(learning_rate: f32, momentum: f32, l2: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            l2,
            velocity: Vec::new(),
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        let Self {
            learning_rate: lr,
            momentum: mu,
            l2,
            ref mut velocity,
        } = *self;

        if velocity.len() != params.len() {
            *velocity = vec![0.; params.len()];
        }

        params
            .par_iter_mut()
            .zip(velocity.par_iter_mut())
            .zip(grad.par_iter())
            .for_each(|((p, v), g)| {
                *v = mu * *v + g + l2 * *p;
                *p -= lr * *v;
            });
    }
}
