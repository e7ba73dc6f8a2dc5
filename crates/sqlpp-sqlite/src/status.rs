//! Engine result codes.

use std::ffi::c_int;
use std::fmt;

use sqlpp_core::{Error, QueryError};

use crate::connection::Connection;
use crate::ffi;

/// An engine result code returned by a per-call operation.
///
/// Per-call operations never raise; they hand back whatever the engine said.
/// Use [`Status::check`] to turn a failure into an [`Error`] carrying the
/// connection's current message.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(c_int);

impl Status {
    pub const OK: Status = Status(ffi::SQLITE_OK);
    pub const ERROR: Status = Status(ffi::SQLITE_ERROR);
    pub const BUSY: Status = Status(ffi::SQLITE_BUSY);
    pub const LOCKED: Status = Status(ffi::SQLITE_LOCKED);
    pub const MISUSE: Status = Status(ffi::SQLITE_MISUSE);
    pub const RANGE: Status = Status(ffi::SQLITE_RANGE);
    pub const CONSTRAINT: Status = Status(ffi::SQLITE_CONSTRAINT);
    pub const ROW: Status = Status(ffi::SQLITE_ROW);
    pub const DONE: Status = Status(ffi::SQLITE_DONE);

    /// Wrap a raw engine code.
    pub const fn from_code(code: c_int) -> Self {
        Status(code)
    }

    /// The raw (possibly extended) engine code.
    pub const fn code(self) -> c_int {
        self.0
    }

    /// The primary result code, with extended bits stripped.
    pub const fn primary(self) -> c_int {
        self.0 & 0xff
    }

    pub const fn is_ok(self) -> bool {
        self.0 == ffi::SQLITE_OK
    }

    pub const fn is_row(self) -> bool {
        self.0 == ffi::SQLITE_ROW
    }

    pub const fn is_done(self) -> bool {
        self.0 == ffi::SQLITE_DONE
    }

    /// OK, ROW and DONE are the non-failure codes.
    pub const fn is_success(self) -> bool {
        matches!(
            self.0,
            ffi::SQLITE_OK | ffi::SQLITE_ROW | ffi::SQLITE_DONE
        )
    }

    /// The engine's generic English description of this code.
    pub fn description(self) -> &'static str {
        ffi::error_string(self.0)
    }

    /// Convert a failure into an error with the connection's current message.
    ///
    /// Success codes (OK, ROW, DONE) pass through as `Ok(self)`.
    pub fn check(self, conn: &Connection) -> Result<Status, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error(conn))
        }
    }

    /// Build the error for this code regardless of whether it is a failure.
    pub fn into_error(self, conn: &Connection) -> Error {
        // the connection reports extended codes when they are enabled
        let message = if conn.is_connected() && conn.error_code() & 0xff == self.primary() {
            conn.error_msg()
        } else {
            self.description().to_string()
        };
        Error::Query(QueryError::from_code(self.0, message))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.0)
    }
}

impl From<c_int> for Status {
    fn from(code: c_int) -> Self {
        Status(code)
    }
}

impl From<Status> for c_int {
    fn from(status: Status) -> Self {
        status.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(Status::OK.is_ok());
        assert!(Status::ROW.is_row());
        assert!(Status::DONE.is_done());
        assert!(Status::DONE.is_success());
        assert!(!Status::BUSY.is_success());
    }

    #[test]
    fn test_primary_strips_extended_bits() {
        // SQLITE_CONSTRAINT_UNIQUE
        let status = Status::from_code(2067);
        assert_eq!(status.primary(), ffi::SQLITE_CONSTRAINT);
        assert_ne!(status, Status::CONSTRAINT);
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::RANGE.to_string(), "column index out of range (25)");
    }

    #[test]
    fn test_check_on_closed_connection_uses_description() {
        let conn = Connection::new();
        let err = Status::MISUSE.check(&conn).unwrap_err();
        assert_eq!(err.code(), Some(ffi::SQLITE_MISUSE));
        assert!(Status::OK.check(&conn).is_ok());
    }

    #[test]
    fn test_check_keeps_engine_message_with_extended_codes() {
        let config = crate::SqliteConfig::memory().extended_result_codes(true);
        let conn = Connection::open(&config).expect("open sqlite memory db");
        assert!(conn.execute("CREATE TABLE t (x INTEGER UNIQUE)").is_ok());
        assert!(conn.execute("INSERT INTO t VALUES (1)").is_ok());

        let status = conn.execute("INSERT INTO t VALUES (1)");
        assert_eq!(status.primary(), ffi::SQLITE_CONSTRAINT);
        assert_ne!(status, Status::CONSTRAINT);

        let err = status.check(&conn).unwrap_err();
        assert_eq!(err.code(), Some(ffi::SQLITE_CONSTRAINT));
        assert_eq!(
            err.to_string(),
            "Query error (code 19): UNIQUE constraint failed: t.x"
        );
    }
}
