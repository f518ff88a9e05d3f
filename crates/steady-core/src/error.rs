use thiserror::Error;

#[derive(Error, Debug)]
pub enum StabilizationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

pub type Result<T> = std::result::Result<T, StabilizationError>;
