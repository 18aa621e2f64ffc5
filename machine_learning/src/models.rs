use harness::{Model, ModelRegistry, ModelResult, ModelShape, ModelType};

use crate::{
    arch::{Network, Sequential, activations::ActFn, layers::Dense, loss::SoftmaxCrossEntropy},
    init::{self, ParamGen},
    optimization::GradientDescentWithMomentum,
};

const HIDDEN: usize = 1000;
const LEARNING_RATE: f32 = 6e-3;
const MOMENTUM: f32 = 0.9;
const L2: f32 = 1e-4;

/// Builds the SIMPLE MLP benchmark model for inputs shaped like `shape`.
///
/// Two ReLU hidden layers of 1000 units and a softmax output, with Xavier initialization and
/// momentum gradient descent.
pub fn simple_mlp(shape: &ModelShape) -> ModelResult<Box<dyn Model>> {
    let inputs = shape.example.iter().product();

    let model = Sequential::new([
        Dense::new((inputs, HIDDEN), Some(ActFn::relu())),
        Dense::new((HIDDEN, HIDDEN), Some(ActFn::relu())),
        Dense::new((HIDDEN, shape.labels), None),
    ]);
    let params = init::init_params(&model, ParamGen::Xavier, shape.seed)?;
    let optimizer = GradientDescentWithMomentum::new(LEARNING_RATE, MOMENTUM, L2);

    let network = Network::new(
        ModelType::SimpleMlp.name(),
        model,
        params,
        optimizer,
        SoftmaxCrossEntropy,
    )?;

    Ok(Box::new(network))
}

/// The registry of every model this crate can build.
pub fn registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register(ModelType::SimpleMlp, simple_mlp);
    registry
}
