//! Resource-safe access to SQLite.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Every engine object is owned by exactly one Rust value and released when
//! that value goes out of scope: connections, prepared statements, backups,
//! transactions and registered functions. Borrowing keeps dependents from
//! outliving what they were created from.
//!
//! # Features
//!
//! - Connections with configurable open flags, busy timeout and pragmas
//! - Commands that run several `;`-separated statements with shared bindings
//! - Queries with a single-pass row cursor and typed column reads
//! - Scoped transactions that roll back unless committed
//! - Scalar functions and aggregates written as plain Rust closures and types
//! - Busy, commit, rollback, update and authorizer callbacks
//! - Online backup with progress reporting
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlpp_sqlite::{Command, Connection, Query, Transaction};
//!
//! let conn = Connection::open_memory()?;
//! conn.execute("CREATE TABLE contacts (name TEXT, phone TEXT)").check(&conn)?;
//!
//! {
//!     let tx = Transaction::new(&conn)?;
//!     let mut cmd = Command::new(&conn, "INSERT INTO contacts VALUES (:name, :phone)")?;
//!     cmd.bind_named(":name", "Mike").check(&conn)?;
//!     cmd.bind_named(":phone", "555-1234").check(&conn)?;
//!     cmd.execute().check(&conn)?;
//!     tx.commit().check(&conn)?;
//! }
//!
//! let mut q = Query::new(&conn, "SELECT name, phone FROM contacts")?;
//! for row in q.map_rows(|row| row.get_columns::<(String, String)>([0, 1])) {
//!     let (name, phone) = row?;
//!     println!("{name}: {phone}");
//! }
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `i32`, `u32`, `i64` | INTEGER |
//! | `f64` | REAL |
//! | `&str`, `String` | TEXT |
//! | `&[u8]`, `Vec<u8>` | BLOB |
//! | `Option<T>`, `Null` | NULL or T |
//! | `sqlpp_core::Value` | any |
//!
//! Reads never fail: NULL and out-of-range columns read as the zero value of
//! the requested type.
//!
//! # Thread Safety
//!
//! `Connection` is `Send` but not `Sync`. Statements, cursors and
//! transactions borrow it and stay on the thread that owns it.

pub mod backup;
pub mod config;
pub mod connection;
pub mod ext;
pub mod ffi;
pub mod hooks;
pub mod query;
pub mod statement;
pub mod status;
pub mod transaction;
pub mod types;

pub use backup::{Backup, DEFAULT_PAGES_PER_STEP};
pub use config::{OpenFlags, SqliteConfig};
pub use connection::Connection;
pub use ext::{Aggregate, Context, FunctionArgs, FunctionOutput, ScalarFunction};
pub use hooks::{AuthRequest, Authorization, RowChange, UpdateAction};
pub use query::{FromColumns, Getter, MappedRows, Query, Row, RowCursor};
pub use statement::{Binder, Command, Exec, Select, Statement};
pub use status::Status;
pub use transaction::{DropBehavior, Transaction, TransactionBehavior};
pub use types::{ColumnType, FromSql, Ignore, Null, RawValue, ToSql, ValueRef};

pub use sqlpp_core::{Error, Result, Value};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
