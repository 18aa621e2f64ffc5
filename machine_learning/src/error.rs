use std::{
    error::Error,
    fmt::{self, Display},
};

use harness::ModelErr;
use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    /// A parameter distribution couldn't be built.
    Distribution(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "Invalid array shape: {e}"),
            MlErr::Distribution(msg) => write!(f, "Invalid parameter distribution: {msg}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(e: ShapeError) -> Self {
        Self::Shape(e)
    }
}

impl From<MlErr> for ModelErr {
    fn from(e: MlErr) -> Self {
        match e {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => ModelErr::SizeMismatch {
                what,
                got,
                expected,
            },
            e => ModelErr::Failure(e.to_string()),
        }
    }
}
