//! SQL identifier and literal quoting.
//!
//! These are used wherever a name or path has to be spliced into SQL text
//! (ATTACH/DETACH, formatted execution) instead of being bound as a parameter.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// # Examples
///
/// ```
/// use sqlpp_core::quote_ident;
///
/// assert_eq!(quote_ident("main"), "\"main\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", escape_ident(name))
}

/// Double embedded double-quotes without adding the surrounding quotes.
#[inline]
pub fn escape_ident(name: &str) -> String {
    name.replace('"', "\"\"")
}

/// Quote a string as a SQL text literal using single quotes.
///
/// Embedded single-quotes are escaped by doubling them (`'` → `''`).
///
/// # Examples
///
/// ```
/// use sqlpp_core::quote_literal;
///
/// assert_eq!(quote_literal("test.db"), "'test.db'");
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// ```
#[inline]
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", escape_literal(text))
}

/// Double embedded single-quotes without adding the surrounding quotes.
#[inline]
pub fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}
