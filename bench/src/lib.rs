pub mod config;

pub use config::{BenchConfig, DatasetConfig};
