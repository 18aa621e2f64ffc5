/// Applies a gradient onto a model's parameters.
pub trait Optimizer {
    /// The name shown in model summaries.
    fn name(&self) -> &'static str;

    fn update_params(&mut self, params: &mut [f32], grad: &[f32]);
}
