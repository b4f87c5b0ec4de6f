use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for schemata operations.
///
/// Every failure that crosses the public boundary of the crate carries exactly one of
/// these kinds, so callers can decide on retry or recovery by matching on
/// [`SchemataError::kind`] instead of parsing messages.
///
/// # Examples
///
/// ```rust,ignore
/// use schemata::errors::{ErrorKind, SchemataError, SchemataResult};
///
/// fn example() -> SchemataResult<()> {
///     Err(SchemataError::new("table 'todo' is not declared", ErrorKind::SchemaError))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Open Errors - raised while the engine opens a store
    /// The engine refused to open the store
    OpenError,
    /// Another connection prevents the version change
    Blocked,
    /// The stored version is above the declared chain version
    PreconditionViolation,

    // Transaction Errors - raised by collection operations or the transaction itself
    /// A collection operation or the surrounding transaction failed or was aborted
    TransactionError,
    /// A migration step body failed; the step's own error is the cause
    UpgradeError,

    // Record Errors - raised per query operation
    /// A supplied or stored record does not match the declared shape
    ValidationError,
    /// The engine rejected a write (duplicate key, unusable key path value)
    WriteError,
    /// The table is not declared in the bound snapshot, or a declaration is malformed
    SchemaError,

    // Lifecycle Errors
    /// The connection or handle has already been closed
    StoreClosed,
    /// The handle or builder does not allow this call in its current state
    InvalidOperation,
    /// Event delivery failed
    EventError,

    // bookkeeping
    /// An invariant of the crate itself was broken
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::OpenError => write!(f, "Open error"),
            ErrorKind::Blocked => write!(f, "Blocked"),
            ErrorKind::PreconditionViolation => write!(f, "Precondition violation"),
            ErrorKind::TransactionError => write!(f, "Transaction error"),
            ErrorKind::UpgradeError => write!(f, "Upgrade error"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::WriteError => write!(f, "Write error"),
            ErrorKind::SchemaError => write!(f, "Schema error"),
            ErrorKind::StoreClosed => write!(f, "Store closed"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom schemata error type.
///
/// `SchemataError` carries a message, an [`ErrorKind`] and an optional cause, so a
/// failed migration step can be reported as an `UpgradeError` while still exposing
/// the step's own error underneath.
///
/// # Examples
///
/// ```rust,ignore
/// use schemata::errors::{SchemataError, ErrorKind};
///
/// let cause = SchemataError::new("duplicate key", ErrorKind::WriteError);
/// let err = SchemataError::new_with_cause("step 2 failed", ErrorKind::UpgradeError, cause);
/// assert_eq!(err.cause().unwrap().kind(), &ErrorKind::WriteError);
/// ```
#[derive(Clone)]
pub struct SchemataError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<SchemataError>>,
    backtrace: Atomic<Backtrace>,
}

impl SchemataError {
    /// Creates a new `SchemataError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        SchemataError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `SchemataError` with a cause error.
    ///
    /// The cause is preserved and reachable through [`SchemataError::cause`] and
    /// [`std::error::Error::source`].
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: SchemataError) -> Self {
        SchemataError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&SchemataError> {
        self.cause.as_deref()
    }

    /// Walks the cause chain and returns the innermost error.
    pub fn root_cause(&self) -> &SchemataError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }
}

impl Display for SchemataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for SchemataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})\nCaused by: {:?}", self.message, self.error_kind, cause),
            None => write!(f, "{} ({})\n{:?}", self.message, self.error_kind, self.backtrace.read()),
        }
    }
}

impl Error for SchemataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for schemata operations.
pub type SchemataResult<T> = Result<T, SchemataError>;

impl From<serde_json::Error> for SchemataError {
    fn from(err: serde_json::Error) -> Self {
        SchemataError::new(&format!("Record shape mismatch: {}", err), ErrorKind::ValidationError)
    }
}

impl From<String> for SchemataError {
    fn from(msg: String) -> Self {
        SchemataError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for SchemataError {
    fn from(msg: &str) -> Self {
        SchemataError::new(msg, ErrorKind::InternalError)
    }
}
