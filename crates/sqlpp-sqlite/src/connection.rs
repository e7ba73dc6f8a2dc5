//! SQLite connection.
//!
//! [`Connection`] owns exactly one engine handle. Construction through
//! [`Connection::open`] raises on failure; every other operation reports the
//! engine's result code as a [`Status`] so callers can consult
//! [`Connection::error_code`] and [`Connection::error_msg`].
//!
//! ```rust,ignore
//! use sqlpp_sqlite::{Connection, SqliteConfig};
//!
//! let conn = Connection::open(&SqliteConfig::file("app.db").busy_timeout(500))?;
//! conn.execute("CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT)")
//!     .check(&conn)?;
//! ```

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::result_large_err)] // Error type is defined in sqlpp-core

use std::ffi::{CString, c_int};
use std::ptr;
use std::sync::Mutex;

use sqlpp_core::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, FormatArg, format_sql, quote_ident,
    quote_literal,
};

use crate::config::SqliteConfig;
use crate::ffi;
use crate::hooks::Hooks;
use crate::status::Status;

/// A failed open, remembered so the closed connection can still report it.
#[derive(Debug, Clone)]
struct OpenFailure {
    code: c_int,
    message: String,
}

/// A connection to a SQLite database.
///
/// The connection is move-only. It may be sent to another thread but not
/// shared; statements, transactions and backups borrow it, so the borrow
/// checker keeps them from outliving it.
pub struct Connection {
    db: *mut ffi::sqlite3,
    /// Borrowed handles are never closed by this wrapper.
    owned: bool,
    path: String,
    last_open_failure: Option<OpenFailure>,
    pub(crate) hooks: Hooks,
    pub(crate) txn_lock: Mutex<()>,
}

// SAFETY: the handle is only ever used through `&self`/`&mut self` of a
// single owner; `Connection` is deliberately not `Sync`.
unsafe impl Send for Connection {}

impl Connection {
    /// Create a connection that is not yet attached to any database.
    pub fn new() -> Self {
        Self {
            db: ptr::null_mut(),
            owned: true,
            path: String::new(),
            last_open_failure: None,
            hooks: Hooks::default(),
            txn_lock: Mutex::new(()),
        }
    }

    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let mut conn = Self::new();
        let status = conn.connect(config);
        if !status.is_ok() {
            let (kind, message) = match &conn.last_open_failure {
                Some(failure) if failure.code == ffi::SQLITE_MISUSE => {
                    (ConnectionErrorKind::InvalidPath, failure.message.clone())
                }
                Some(failure) => (ConnectionErrorKind::Connect, failure.message.clone()),
                None => (ConnectionErrorKind::Connect, conn.error_msg()),
            };
            return Err(Error::Connection(ConnectionError {
                kind,
                message: format!("Failed to open database '{}': {}", config.path, message),
                source: None,
            }));
        }
        Ok(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Wrap a handle opened elsewhere without taking ownership of it.
    ///
    /// Dropping or disconnecting the returned connection unregisters any hooks
    /// it installed but never closes the handle.
    ///
    /// # Safety
    /// `db` must be a live connection handle that outlives the returned
    /// `Connection`, and must not be used concurrently from another thread.
    pub unsafe fn borrow_raw(db: *mut ffi::sqlite3) -> Self {
        Self {
            db,
            owned: false,
            path: String::new(),
            last_open_failure: None,
            hooks: Hooks::default(),
            txn_lock: Mutex::new(()),
        }
    }

    /// Open the database described by `config`, closing any open handle first.
    pub fn connect(&mut self, config: &SqliteConfig) -> Status {
        let _ = self.disconnect();
        self.last_open_failure = None;

        let Ok(c_path) = CString::new(config.path.as_str()) else {
            return self.record_open_failure(ffi::SQLITE_MISUSE, "path contains a NUL byte");
        };
        let c_vfs = match config.vfs.as_deref().map(CString::new).transpose() {
            Ok(vfs) => vfs,
            Err(_) => {
                return self
                    .record_open_failure(ffi::SQLITE_MISUSE, "VFS name contains a NUL byte");
            }
        };

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                flags,
                c_vfs.as_ref().map_or(ptr::null(), |v| v.as_ptr()),
            )
        };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is a handle returned by open_v2; it must be closed even on failure
                unsafe {
                    let msg = ffi::errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return self.record_open_failure(rc, &message);
        }

        self.db = db;
        self.owned = true;
        self.path.clone_from(&config.path);
        tracing::debug!(path = %config.path, flags, "Opened database");

        let status = self.apply_config(config);
        if !status.is_ok() {
            let message = self.error_msg();
            let _ = self.disconnect();
            return self.record_open_failure(status.code(), &message);
        }
        Status::OK
    }

    fn record_open_failure(&mut self, code: c_int, message: &str) -> Status {
        tracing::debug!(code, error = message, "Failed to open database");
        self.last_open_failure = Some(OpenFailure {
            code,
            message: message.to_string(),
        });
        Status::from_code(code)
    }

    fn apply_config(&mut self, config: &SqliteConfig) -> Status {
        if config.extended_result_codes {
            let status = self.enable_extended_result_codes(true);
            if !status.is_ok() {
                return status;
            }
        }
        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            let status = self.set_busy_timeout(ms);
            if !status.is_ok() {
                return status;
            }
        }
        if let Some(enable) = config.foreign_keys {
            if self.db_config_toggle(ffi::SQLITE_DBCONFIG_ENABLE_FKEY, enable).is_err() {
                return Status::ERROR;
            }
        }
        if let Some(enable) = config.triggers {
            if self.db_config_toggle(ffi::SQLITE_DBCONFIG_ENABLE_TRIGGER, enable).is_err() {
                return Status::ERROR;
            }
        }
        Status::OK
    }

    /// Close the handle. Closing an already closed connection returns OK.
    pub fn disconnect(&mut self) -> Status {
        if self.db.is_null() {
            return Status::OK;
        }

        self.hooks.unregister_all(self.db);
        let rc = if self.owned {
            // SAFETY: db is valid and owned; close_v2 defers if anything is still open
            unsafe { ffi::sqlite3_close_v2(self.db) }
        } else {
            ffi::SQLITE_OK
        };

        tracing::debug!(path = %self.path, owned = self.owned, "Closed database");
        self.db = ptr::null_mut();
        self.owned = true;
        self.hooks = Hooks::default();
        Status::from_code(rc)
    }

    /// Is a database handle currently open?
    pub fn is_connected(&self) -> bool {
        !self.db.is_null()
    }

    /// Get the path the connection was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw engine handle, or null when disconnected.
    pub fn handle(&self) -> *mut ffi::sqlite3 {
        self.db
    }

    /// Run one or more complete statements with no bound parameters.
    pub fn execute(&self, sql: &str) -> Status {
        if self.db.is_null() {
            return Status::MISUSE;
        }
        let Ok(c_sql) = CString::new(sql) else {
            return Status::MISUSE;
        };

        // SAFETY: db and c_sql are valid; error text is read back via errmsg
        let rc = unsafe {
            ffi::sqlite3_exec(
                self.db,
                c_sql.as_ptr(),
                None,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            tracing::debug!(code = rc, sql = %sql, "Execute failed");
        }
        Status::from_code(rc)
    }

    /// Expand a printf-style template (see [`sqlpp_core::format_sql`]) and run it.
    ///
    /// A malformed template or argument list is reported as `MISUSE`.
    pub fn execute_formatted(&self, template: &str, args: &[FormatArg<'_>]) -> Status {
        match format_sql(template, args) {
            Ok(sql) => self.execute(&sql),
            Err(e) => {
                tracing::warn!(error = %e, template, "Rejected format template");
                Status::MISUSE
            }
        }
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(self.db) }
    }

    /// Get the number of rows changed since the connection was opened.
    pub fn total_changes(&self) -> i32 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_total_changes(self.db) }
    }

    /// The primary result code of the most recent failed call.
    pub fn error_code(&self) -> c_int {
        if self.db.is_null() {
            return self
                .last_open_failure
                .as_ref()
                .map_or(ffi::SQLITE_MISUSE, |f| f.code & 0xff);
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_errcode(self.db) }
    }

    /// The extended result code of the most recent failed call.
    pub fn extended_error_code(&self) -> c_int {
        if self.db.is_null() {
            return self
                .last_open_failure
                .as_ref()
                .map_or(ffi::SQLITE_MISUSE, |f| f.code);
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_extended_errcode(self.db) }
    }

    /// The English message describing the most recent failed call.
    pub fn error_msg(&self) -> String {
        if self.db.is_null() {
            return self.last_open_failure.as_ref().map_or_else(
                || ffi::error_string(ffi::SQLITE_MISUSE).to_string(),
                |f| f.message.clone(),
            );
        }
        // SAFETY: db is valid
        unsafe { ffi::errmsg(self.db) }
    }

    /// Is the connection outside of any explicit transaction?
    pub fn is_autocommit(&self) -> bool {
        if self.db.is_null() {
            return true;
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_get_autocommit(self.db) != 0 }
    }

    /// Sleep-and-retry up to `ms` milliseconds when a table is locked.
    ///
    /// Installing a timeout replaces any busy handler, and vice versa.
    pub fn set_busy_timeout(&self, ms: c_int) -> Status {
        if self.db.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: db is valid
        Status::from_code(unsafe { ffi::sqlite3_busy_timeout(self.db, ms) })
    }

    /// Report extended result codes instead of primary ones.
    pub fn enable_extended_result_codes(&self, enable: bool) -> Status {
        if self.db.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: db is valid
        Status::from_code(unsafe {
            ffi::sqlite3_extended_result_codes(self.db, c_int::from(enable))
        })
    }

    /// Turn foreign key enforcement on or off.
    pub fn enable_foreign_keys(&self, enable: bool) -> Result<(), Error> {
        self.db_config_toggle(ffi::SQLITE_DBCONFIG_ENABLE_FKEY, enable)
    }

    /// Turn trigger execution on or off.
    pub fn enable_triggers(&self, enable: bool) -> Result<(), Error> {
        self.db_config_toggle(ffi::SQLITE_DBCONFIG_ENABLE_TRIGGER, enable)
    }

    fn db_config_toggle(&self, op: c_int, enable: bool) -> Result<(), Error> {
        if self.db.is_null() {
            return Err(disconnected_error());
        }
        let mut state: c_int = -1;
        // SAFETY: db is valid; the op takes (int, int*)
        let rc = unsafe {
            ffi::sqlite3_db_config(self.db, op, c_int::from(enable), ptr::addr_of_mut!(state))
        };
        if rc != ffi::SQLITE_OK {
            return Err(Error::Config(ConfigError {
                message: format!("db_config({}) failed: {}", op, self.error_msg()),
                source: None,
            }));
        }
        if state != c_int::from(enable) {
            return Err(Error::Config(ConfigError {
                message: format!(
                    "db_config({}) left the setting at {} (inside a transaction?)",
                    op, state
                ),
                source: None,
            }));
        }
        Ok(())
    }

    /// Attach another database file under `alias`.
    pub fn attach(&self, path: &str, alias: &str) -> Status {
        self.execute(&format!(
            "ATTACH DATABASE {} AS {}",
            quote_literal(path),
            quote_ident(alias)
        ))
    }

    /// Detach a database previously attached under `alias`.
    pub fn detach(&self, alias: &str) -> Status {
        self.execute(&format!("DETACH DATABASE {}", quote_ident(alias)))
    }

    /// Build an error for `status` with this connection's current message.
    pub(crate) fn error_for(&self, status: Status, sql: Option<&str>) -> Error {
        let mut err = status.into_error(self);
        if let (Error::Query(q), Some(sql)) = (&mut err, sql) {
            q.sql = Some(sql.to_string());
        }
        err
    }
}

pub(crate) fn disconnected_error() -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message: "connection is closed".to_string(),
        source: None,
    })
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("connected", &self.is_connected())
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
