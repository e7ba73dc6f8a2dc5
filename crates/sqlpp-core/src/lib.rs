//! Core types for sqlpp.
//!
//! This crate holds the engine-independent pieces shared by the SQLite layer:
//!
//! - `Error` and its per-kind payloads, with the `Result` alias
//! - `Value`, the closed set of SQL value kinds
//! - identifier and literal quoting
//! - printf-style SQL text expansion (`format_sql`)

pub mod error;
pub mod format;
pub mod identifiers;
pub mod value;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, FormatError, FormatErrorKind,
    QueryError, QueryErrorKind, Result, TransactionError, TransactionErrorKind, TypeError,
};
pub use format::{FormatArg, format_sql};
pub use identifiers::{escape_ident, escape_literal, quote_ident, quote_literal};
pub use value::Value;
