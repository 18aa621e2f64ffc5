mod loaders;
mod minibatch;
mod synthetic;

pub use loaders::{MiniBatchLoader, SyntheticLoader, default_shape};
pub use minibatch::{MiniBatchDirSource, save_batch};
pub use synthetic::SyntheticSource;
