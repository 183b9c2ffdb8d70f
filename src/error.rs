use std::{error::Error, fmt};

/// The failure categories of the engine.
///
/// `TransactionAborted` is special: it always means "run the abort path",
/// i.e. the caller is expected to finish the transaction with
/// `Transaction::abort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Structural or semantic failure not tied to a specific transaction
    /// (page full, tuple not on page, no evictable page, ...).
    Database,

    /// Deadlock or forced abort.
    TransactionAborted,

    /// Wrapped filesystem failure.
    Io,

    /// Malformed argument (bad page category, field index out of range,
    /// schema mismatch, ...).
    InvalidArgument,
}

#[derive(Debug, Clone)]
pub struct DbError {
    kind: DbErrorKind,
    details: String,
}

impl DbError {
    pub fn new(msg: &str) -> DbError {
        DbError {
            kind: DbErrorKind::Database,
            details: msg.to_string(),
        }
    }

    pub fn aborted(msg: &str) -> DbError {
        DbError {
            kind: DbErrorKind::TransactionAborted,
            details: msg.to_string(),
        }
    }

    pub fn io(e: &std::io::Error) -> DbError {
        DbError {
            kind: DbErrorKind::Io,
            details: e.to_string(),
        }
    }

    pub fn invalid_argument(msg: &str) -> DbError {
        DbError {
            kind: DbErrorKind::InvalidArgument,
            details: msg.to_string(),
        }
    }

    pub fn get_kind(&self) -> DbErrorKind {
        self.kind
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == DbErrorKind::TransactionAborted
    }

    pub fn show_backtrace(&self) {
        let bt = backtrace::Backtrace::new();
        log::error!("{}\n{:?}", self, bt);
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.details)
    }
}

impl Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::io(&e)
    }
}
