pub mod arch;
pub mod backend;
pub mod data;
pub mod error;
pub mod init;
pub mod models;
pub mod optimization;

pub use backend::CpuBackend;
pub use data::{MiniBatchDirSource, MiniBatchLoader, SyntheticLoader, SyntheticSource};
pub use error::{MlErr, Result};
pub use models::{registry, simple_mlp};
