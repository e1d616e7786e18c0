use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("invalid split: {0}")]
    Split(String),
    #[error("unknown dataset `{0}`")]
    UnknownDataset(String),
    #[error("missing column `{column}` in {file}")]
    MissingColumn { column: String, file: String },
    #[error("non-finite {what} at epoch {epoch}")]
    NonFinite { what: &'static str, epoch: usize },
}

impl From<ParseFloatError> for Error {
    fn from(err: ParseFloatError) -> Self {
        Error::Parse(err.to_string())
    }
}
impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Self {
        Error::Parse(err.to_string())
    }
}
impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::Shape(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
