use thiserror::Error;

/// Why an expression or table line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("input is empty")]
    EmptyInput,
    #[error("line is a comment")]
    CommentLine,
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// Failure at the boundary with the system table tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("failed to read schedule table: {0}")]
    ReadFailed(String),
    #[error("failed to write schedule table: {0}")]
    WriteFailed(String),
}
