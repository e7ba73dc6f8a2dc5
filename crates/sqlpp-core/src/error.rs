//! Error types for sqlpp operations.

use std::fmt;

/// The primary error type for all sqlpp operations.
///
/// Per-call engine failures are reported through status codes; this type is
/// what constructors, cursors and the other raising entry points return.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, close, use of a closed handle)
    Connection(ConnectionError),
    /// Statement preparation and execution errors
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Configuration errors
    Config(ConfigError),
    /// Format-string expansion errors
    Format(FormatError),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// Operation attempted on a closed connection
    Disconnected,
    /// The path or VFS name could not be passed to the engine
    InvalidPath,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    /// Primary engine result code
    pub code: Option<i32>,
    /// Extended engine result code, when available
    pub extended_code: Option<i32>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission or authorization denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Database busy or locked
    Busy,
    /// Parameter or column index out of range
    Range,
    /// API misuse reported by the engine
    Misuse,
    /// Interrupted
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Another transaction already holds the connection
    AlreadyActive,
    /// BEGIN was rejected by the engine
    Begin,
    /// COMMIT or ROLLBACK was rejected by the engine
    Resolve,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    pub kind: FormatErrorKind,
    /// Byte offset of the offending specifier in the template
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatErrorKind {
    /// More specifiers than arguments
    MissingArgument,
    /// Fewer specifiers than arguments
    UnusedArgument,
    /// Argument kind does not fit the specifier
    Mismatch,
    /// Unknown conversion character
    UnknownSpecifier,
}

impl Error {
    /// Is this a retryable error (busy/locked)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(q.kind, QueryErrorKind::Busy),
            Error::Transaction(t) => matches!(t.kind, TransactionErrorKind::AlreadyActive),
            _ => false,
        }
    }

    /// Is this an error about the connection itself rather than a statement?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Get the primary engine result code if available.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Query(q) => q.code,
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Build a query error from an engine code and message.
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::from_code(code),
            sql: None,
            code: Some(code & 0xff),
            extended_code: Some(code),
            message: message.into(),
            source: None,
        }
    }

    /// Attach the SQL text that failed.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Is this a constraint violation?
    pub fn is_constraint_violation(&self) -> bool {
        self.kind == QueryErrorKind::Constraint
    }
}

impl QueryErrorKind {
    /// Classify a (possibly extended) SQLite result code.
    pub fn from_code(code: i32) -> Self {
        match code & 0xff {
            19 => QueryErrorKind::Constraint,
            5 | 6 => QueryErrorKind::Busy,
            3 | 23 => QueryErrorKind::Permission,
            12 => QueryErrorKind::NotFound,
            18 => QueryErrorKind::DataTruncation,
            25 => QueryErrorKind::Range,
            21 => QueryErrorKind::Misuse,
            9 => QueryErrorKind::Cancelled,
            _ => QueryErrorKind::Database,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(code) = e.code {
                    write!(f, "Query error (code {}): {}", code, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Format(e) => write!(f, "Format error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let boxed = match self {
            Error::Connection(e) => e.source.as_deref(),
            Error::Query(e) => e.source.as_deref(),
            Error::Config(e) => e.source.as_deref(),
            Error::Format(e) => return Some(e),
            _ => None,
        };
        boxed.map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.position)
    }
}

impl std::error::Error for FormatError {}

macro_rules! wrap_error {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(err: $ty) -> Self {
                    Error::$variant(err)
                }
            }
        )*
    };
}

wrap_error! {
    Connection(ConnectionError),
    Query(QueryError),
    Type(TypeError),
    Transaction(TransactionError),
    Config(ConfigError),
    Format(FormatError),
}

/// Result type alias for sqlpp operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_from_extended_code() {
        // SQLITE_CONSTRAINT_UNIQUE = 2067
        let query = QueryError::from_code(2067, "UNIQUE constraint failed: t.id")
            .with_sql("INSERT INTO t VALUES (1)");

        assert!(query.is_constraint_violation());
        assert_eq!(query.code, Some(19));
        assert_eq!(query.extended_code, Some(2067));

        let err = Error::Query(query);
        assert_eq!(err.code(), Some(19));
        assert_eq!(err.sql(), Some("INSERT INTO t VALUES (1)"));
        assert_eq!(
            err.to_string(),
            "Query error (code 19): UNIQUE constraint failed: t.id"
        );
    }

    #[test]
    fn retryable_and_connection_flags() {
        let busy = Error::Query(QueryError::from_code(5, "database is locked"));
        assert!(busy.is_retryable());

        let active = Error::Transaction(TransactionError {
            kind: TransactionErrorKind::AlreadyActive,
            message: "transaction already active".to_string(),
        });
        assert!(active.is_retryable());

        let conn_error = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: "connection is closed".to_string(),
            source: None,
        });
        assert!(conn_error.is_connection_error());
        assert!(!conn_error.is_retryable());
    }

    #[test]
    fn kind_classification() {
        // plain SQLITE_ERROR covers syntax errors and missing tables alike
        assert_eq!(QueryErrorKind::from_code(1), QueryErrorKind::Database);
        assert_eq!(QueryErrorKind::from_code(6), QueryErrorKind::Busy);
        assert_eq!(QueryErrorKind::from_code(25), QueryErrorKind::Range);
        assert_eq!(QueryErrorKind::from_code(21), QueryErrorKind::Misuse);
        assert_eq!(QueryErrorKind::from_code(11), QueryErrorKind::Database);
    }

    #[test]
    fn format_error_is_source() {
        let err = Error::from(FormatError {
            kind: FormatErrorKind::MissingArgument,
            position: 4,
            message: "missing argument for %q".to_string(),
        });
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(
            err.to_string(),
            "Format error: missing argument for %q at byte 4"
        );
    }
}
