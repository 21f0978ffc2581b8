use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Persisted meta-record differs from the requested configuration
    ConfigurationMismatch,
    /// Argument rejected before any I/O
    Validation,
    NotFound,
    /// Transaction retry budget exceeded
    TransactionExhausted,
    /// Optimistic commit lost against a concurrent writer
    WriteConflict,
    InvalidState,
    Io,
    Parse,
    Internal,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, context.into())
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context.into())
    }

    /// Mismatch between the persisted meta-record and this instance's settings.
    pub fn configuration_mismatch(field: &str, existing: Option<i64>, current: i64) -> Self {
        let existing = existing.map_or_else(|| "missing".to_string(), |v| v.to_string());
        Error::new(
            ErrorKind::ConfigurationMismatch,
            format!(
                "{field} mismatch with existing data. Existing {field} is {existing}, current {field} is {current}"
            ),
        )
    }

    /// Errors the transaction runner may retry with a fresh transaction.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::WriteConflict)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
