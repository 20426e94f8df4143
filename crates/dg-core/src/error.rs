use thiserror::Error;

/// Errors raised by key parsing, grid codec and priority lookups.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid key string: {0}")]
    InvalidKey(String),

    #[error("unknown relation character: {0:?}")]
    InvalidCharacter(char),

    #[error("grid shape error: expected length {expected}, got {actual}")]
    GridShape { expected: usize, actual: usize },

    #[error("malformed RLE run at offset {offset} in {rle:?}")]
    MalformedRle { rle: String, offset: usize },

    #[error("diagonal at position {0} is not the self character")]
    BadDiagonal(usize),
}
