mod prefetch;
mod source;

pub use prefetch::PrefetchSource;
pub use source::{BatchSource, VecSource};
