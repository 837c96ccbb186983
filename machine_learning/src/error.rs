use std::{
    error::Error,
    fmt::{self, Display},
};

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
    InvalidShape {
        what: &'static str,
        rows: usize,
        cols: usize,
    },
    EmptyDataset,
    Init(String),
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
                "There's a size mismatch for {what}, got {got} and expected {expected}"
            ),
            MlErr::InvalidShape { what, rows, cols } => {
                write!(f, "Cannot view {what} as a {rows}x{cols} matrix")
            }
            MlErr::EmptyDataset => write!(f, "Tried to use an empty dataset"),
            MlErr::Init(detail) => write!(f, "Failed to initialize parameters: {detail}"),
        }
    }
}

impl Error for MlErr {}
