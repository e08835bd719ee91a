use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for lodestone operations.
///
/// Every failure surfaced by the store falls into one of these categories, so
/// callers can branch on the kind instead of parsing messages.
///
/// # Examples
///
/// ```rust,ignore
/// use lodestone::errors::{ErrorKind, LodestoneError, LodestoneResult};
///
/// fn example() -> LodestoneResult<()> {
///     Err(LodestoneError::new("$all requires array", ErrorKind::SelectorError))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// Malformed selector or operator usage
    SelectorError,
    /// Unsupported sort specification or sort key conflict
    SortError,
    /// Invalid modifier, key path or type mismatch while applying one
    ModifierError,
    /// Store level violation such as a duplicate or changed `_id`
    StoreError,
    /// An API was used in an unsupported order or combination
    UsageError,
    /// An observer callback failed while the ordering queue drained
    CallbackError,
    /// The value cannot be used as a document id
    InvalidId,
    /// Error converting to or from an external representation
    EncodingError,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::SelectorError => write!(f, "Selector error"),
            ErrorKind::SortError => write!(f, "Sort error"),
            ErrorKind::ModifierError => write!(f, "Modifier error"),
            ErrorKind::StoreError => write!(f, "Store error"),
            ErrorKind::UsageError => write!(f, "Usage error"),
            ErrorKind::CallbackError => write!(f, "Callback error"),
            ErrorKind::InvalidId => write!(f, "Invalid ID"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom lodestone error type.
///
/// `LodestoneError` carries the error message, its kind and an optional cause.
/// A backtrace is captured at construction for debugging.
///
/// # Examples
///
/// ```rust,ignore
/// use lodestone::errors::{ErrorKind, LodestoneError};
///
/// let err = LodestoneError::new("Duplicate _id 'abc'", ErrorKind::StoreError);
///
/// let cause = LodestoneError::new("boom", ErrorKind::InternalError);
/// let err = LodestoneError::new_with_cause("Observer callback failed", ErrorKind::CallbackError, cause);
/// ```
#[derive(Clone)]
pub struct LodestoneError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<LodestoneError>>,
    backtrace: Atomic<Backtrace>,
}

impl LodestoneError {
    /// Creates a new `LodestoneError` with the specified message and error kind.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        LodestoneError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `LodestoneError` that wraps the error that caused it.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    /// * `cause` - The underlying error
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: LodestoneError) -> Self {
        LodestoneError {
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

    pub fn cause(&self) -> Option<&LodestoneError> {
        self.cause.as_deref()
    }
}

impl Display for LodestoneError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for LodestoneError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}\nCaused by: {:?}", self.error_kind, self.message, cause),
            None => write!(f, "{}: {}\n{:?}", self.error_kind, self.message, self.backtrace.read()),
        }
    }
}

impl Error for LodestoneError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for lodestone operations.
pub type LodestoneResult<T> = Result<T, LodestoneError>;

impl From<std::fmt::Error> for LodestoneError {
    fn from(err: std::fmt::Error) -> Self {
        LodestoneError::new(&format!("Formatting error: {}", err), ErrorKind::InternalError)
    }
}

impl From<serde_json::Error> for LodestoneError {
    fn from(err: serde_json::Error) -> Self {
        LodestoneError::new(&format!("JSON error: {}", err), ErrorKind::EncodingError)
    }
}

impl From<String> for LodestoneError {
    fn from(msg: String) -> Self {
        LodestoneError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for LodestoneError {
    fn from(msg: &str) -> Self {
        LodestoneError::new(msg, ErrorKind::InternalError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_error_without_cause() {
        let error = LodestoneError::new("$size needs a number", ErrorKind::SelectorError);
        assert_eq!(error.message(), "$size needs a number");
        assert_eq!(error.kind(), &ErrorKind::SelectorError);
        assert!(error.cause().is_none());
        assert!(error.source().is_none());
    }

    #[test]
    fn new_with_cause_keeps_chain() {
        let cause = LodestoneError::new("boom", ErrorKind::InternalError);
        let error = LodestoneError::new_with_cause(
            "Observer callback failed",
            ErrorKind::CallbackError,
            cause,
        );
        assert_eq!(error.kind(), &ErrorKind::CallbackError);
        assert_eq!(error.cause().map(|c| c.message()), Some("boom"));
        assert!(error.source().is_some());
    }

    #[test]
    fn display_prints_message_only() {
        let error = LodestoneError::new("Duplicate _id 'a'", ErrorKind::StoreError);
        assert_eq!(format!("{}", error), "Duplicate _id 'a'");
    }

    #[test]
    fn debug_includes_kind_and_cause() {
        let cause = LodestoneError::new("inner", ErrorKind::ModifierError);
        let error = LodestoneError::new_with_cause("outer", ErrorKind::CallbackError, cause);
        let formatted = format!("{:?}", error);
        assert!(formatted.contains("Callback error: outer"));
        assert!(formatted.contains("Caused by:"));
        assert!(formatted.contains("inner"));
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::SortError.to_string(), "Sort error");
        assert_eq!(ErrorKind::UsageError.to_string(), "Usage error");
        assert_eq!(ErrorKind::InvalidId.to_string(), "Invalid ID");
    }

    #[test]
    fn converts_from_strings() {
        let error: LodestoneError = "plain".into();
        assert_eq!(error.kind(), &ErrorKind::InternalError);
        let error: LodestoneError = String::from("owned").into();
        assert_eq!(error.message(), "owned");
    }

    #[test]
    fn converts_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: LodestoneError = json_err.into();
        assert_eq!(error.kind(), &ErrorKind::EncodingError);
    }
}
