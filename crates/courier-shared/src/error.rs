use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdError {
    #[error("Invalid id length: expected 24 hex chars, got {0}")]
    Length(usize),

    #[error("Invalid id hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} too long: {len} bytes (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("No valid message ids")]
    NoValidIds,

    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
