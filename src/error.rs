use thiserror::Error;

/// Fatal conversion errors.
///
/// Any of these aborts the whole run; no script is produced. Recoverable
/// problems are reported as [`crate::types::Diagnostic`] values instead.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Parse error at line {line}: {message}")]
    ParseErrorAtLine { line: usize, message: String },

    #[error("Unknown policy id {id} referenced at line {line}")]
    UnknownPolicy { line: usize, id: u32 },

    #[error("Policy id {id} defined twice (line {line})")]
    DuplicatePolicy { line: usize, id: u32 },

    #[error("Invalid policy {id} at line {line}: {reason}")]
    InvalidPolicy {
        line: usize,
        id: u32,
        reason: String,
    },

    #[error("Unsupported log option at line {line}: {option}")]
    UnsupportedLogOption { line: usize, option: String },

    #[error("Unexpected line inside policy block at line {line}: {content}")]
    UnexpectedBlockLine { line: usize, content: String },

    #[error("Policy block for id {id} opened at line {line} is never closed")]
    UnterminatedBlock { line: usize, id: u32 },

    #[error("Service continuation at line {line} has no preceding service definition")]
    OrphanServiceContinuation { line: usize },

    #[error("Unknown service \"{service}\" referenced by policy {policy}")]
    UnknownService { policy: u32, service: String },

    #[error("Cyclic group reference: {zone}/{name}")]
    CyclicGroup { zone: String, name: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Resolve error: {0}")]
    ResolveError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConvertError {
    /// Line of the input the error points at, when it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            ConvertError::ParseErrorAtLine { line, .. }
            | ConvertError::UnknownPolicy { line, .. }
            | ConvertError::DuplicatePolicy { line, .. }
            | ConvertError::InvalidPolicy { line, .. }
            | ConvertError::UnsupportedLogOption { line, .. }
            | ConvertError::UnexpectedBlockLine { line, .. }
            | ConvertError::UnterminatedBlock { line, .. }
            | ConvertError::OrphanServiceContinuation { line } => Some(*line),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
