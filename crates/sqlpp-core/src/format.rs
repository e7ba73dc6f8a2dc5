//! printf-style SQL text expansion.
//!
//! Implements the subset of SQLite's `sqlite3_mprintf` conversions that are
//! useful for building SQL text by hand:
//!
//! | Specifier | Argument | Output |
//! |-----------|----------|--------|
//! | `%q` | text | text with `'` doubled; NULL prints `(NULL)` |
//! | `%Q` | text | like `%q` wrapped in `'...'`; NULL prints `NULL` |
//! | `%w` | text | text with `"` doubled; NULL prints `(NULL)` |
//! | `%s`, `%z` | text | text verbatim; NULL prints nothing |
//! | `%d`, `%i` | integer | decimal integer (`l`/`ll` modifiers accepted) |
//! | `%f` | real or integer | fixed-point with six decimals |
//! | `%%` | none | a literal `%` |

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{FormatError, FormatErrorKind};
use crate::identifiers::{escape_ident, escape_literal};

const SPECIFIER_PATTERN: &str = r"%(l{0,2})(.?)";

/// An argument consumed by one conversion specifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormatArg<'a> {
    /// Text or NULL
    Text(Option<&'a str>),
    /// Integer
    Int(i64),
    /// Floating point
    Double(f64),
}

impl<'a> From<&'a str> for FormatArg<'a> {
    fn from(v: &'a str) -> Self {
        FormatArg::Text(Some(v))
    }
}

impl<'a> From<&'a String> for FormatArg<'a> {
    fn from(v: &'a String) -> Self {
        FormatArg::Text(Some(v.as_str()))
    }
}

impl<'a> From<Option<&'a str>> for FormatArg<'a> {
    fn from(v: Option<&'a str>) -> Self {
        FormatArg::Text(v)
    }
}

impl From<i32> for FormatArg<'_> {
    fn from(v: i32) -> Self {
        FormatArg::Int(i64::from(v))
    }
}

impl From<i64> for FormatArg<'_> {
    fn from(v: i64) -> Self {
        FormatArg::Int(v)
    }
}

impl From<f64> for FormatArg<'_> {
    fn from(v: f64) -> Self {
        FormatArg::Double(v)
    }
}

impl FormatArg<'_> {
    fn kind_name(&self) -> &'static str {
        match self {
            FormatArg::Text(_) => "text",
            FormatArg::Int(_) => "integer",
            FormatArg::Double(_) => "real",
        }
    }
}

fn specifier_regex() -> Result<&'static Regex, FormatError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SPECIFIER_PATTERN))
        .as_ref()
        .map_err(|e| FormatError {
            kind: FormatErrorKind::UnknownSpecifier,
            position: 0,
            message: format!("specifier pattern failed to compile: {}", e),
        })
}

/// Expand `template` with `args`, returning the SQL text.
///
/// Every specifier consumes exactly one argument (except `%%`), and every
/// argument must be consumed.
///
/// ```
/// use sqlpp_core::{format_sql, FormatArg};
///
/// let sql = format_sql(
///     "INSERT INTO t VALUES (%Q, %d)",
///     &[FormatArg::from("it's"), FormatArg::from(3)],
/// )
/// .unwrap();
/// assert_eq!(sql, "INSERT INTO t VALUES ('it''s', 3)");
/// ```
pub fn format_sql(template: &str, args: &[FormatArg<'_>]) -> Result<String, FormatError> {
    let re = specifier_regex()?;
    let mut out = String::with_capacity(template.len());
    let mut next_arg = args.iter();
    let mut last = 0;

    for caps in re.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        let position = whole.start();
        let has_length = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let conversion = caps.get(2).map_or("", |m| m.as_str());

        if conversion == "%" && !has_length {
            out.push('%');
            continue;
        }

        let spec = conversion.chars().next().ok_or_else(|| FormatError {
            kind: FormatErrorKind::UnknownSpecifier,
            position,
            message: "dangling % at end of template".to_string(),
        })?;

        if has_length && !matches!(spec, 'd' | 'i') {
            return Err(FormatError {
                kind: FormatErrorKind::UnknownSpecifier,
                position,
                message: format!("length modifier not supported for %{}", spec),
            });
        }

        if !matches!(spec, 'q' | 'Q' | 'w' | 's' | 'z' | 'd' | 'i' | 'f') {
            return Err(FormatError {
                kind: FormatErrorKind::UnknownSpecifier,
                position,
                message: format!("unsupported conversion %{}", spec),
            });
        }

        let arg = next_arg.next().ok_or_else(|| FormatError {
            kind: FormatErrorKind::MissingArgument,
            position,
            message: format!("missing argument for %{}", spec),
        })?;

        match (spec, arg) {
            ('q', FormatArg::Text(text)) => match text {
                Some(t) => out.push_str(&escape_literal(t)),
                None => out.push_str("(NULL)"),
            },
            ('Q', FormatArg::Text(text)) => match text {
                Some(t) => {
                    out.push('\'');
                    out.push_str(&escape_literal(t));
                    out.push('\'');
                }
                None => out.push_str("NULL"),
            },
            ('w', FormatArg::Text(text)) => match text {
                Some(t) => out.push_str(&escape_ident(t)),
                None => out.push_str("(NULL)"),
            },
            ('s' | 'z', FormatArg::Text(text)) => out.push_str(text.unwrap_or("")),
            ('d' | 'i', FormatArg::Int(v)) => out.push_str(&v.to_string()),
            ('f', FormatArg::Double(v)) => out.push_str(&format!("{:.6}", v)),
            ('f', FormatArg::Int(v)) => out.push_str(&format!("{:.6}", *v as f64)),
            (spec, other) => {
                return Err(FormatError {
                    kind: FormatErrorKind::Mismatch,
                    position,
                    message: format!("%{} cannot format a {} argument", spec, other.kind_name()),
                });
            }
        }
    }

    out.push_str(&template[last..]);

    if next_arg.next().is_some() {
        return Err(FormatError {
            kind: FormatErrorKind::UnusedArgument,
            position: template.len(),
            message: format!("{} arguments supplied but not all were used", args.len()),
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_template() {
        assert_eq!(format_sql("SELECT 1", &[]).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_percent_escape() {
        assert_eq!(
            format_sql("SELECT '100%%'", &[]).unwrap(),
            "SELECT '100%'"
        );
    }

    #[test]
    fn test_q_doubles_quotes() {
        let sql = format_sql("VALUES ('%q')", &["O'Brien".into()]).unwrap();
        assert_eq!(sql, "VALUES ('O''Brien')");
    }

    #[test]
    fn test_upper_q_wraps_and_handles_null() {
        let sql = format_sql("VALUES (%Q, %Q)", &["a'b".into(), FormatArg::Text(None)]).unwrap();
        assert_eq!(sql, "VALUES ('a''b', NULL)");
    }

    #[test]
    fn test_w_doubles_double_quotes() {
        let sql = format_sql("SELECT * FROM \"%w\"", &["we\"ird".into()]).unwrap();
        assert_eq!(sql, "SELECT * FROM \"we\"\"ird\"");
    }

    #[test]
    fn test_integers_and_reals() {
        let sql = format_sql(
            "VALUES (%d, %lld, %f, %f)",
            &[7.into(), (1_i64 << 40).into(), 2.5.into(), 3.into()],
        )
        .unwrap();
        assert_eq!(sql, "VALUES (7, 1099511627776, 2.500000, 3.000000)");
    }

    #[test]
    fn test_s_is_verbatim() {
        let sql = format_sql("%s", &["DELETE FROM t".into()]).unwrap();
        assert_eq!(sql, "DELETE FROM t");
        assert_eq!(format_sql("[%s]", &[FormatArg::Text(None)]).unwrap(), "[]");
    }

    #[test]
    fn test_missing_argument() {
        let err = format_sql("VALUES (%d, %d)", &[1.into()]).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::MissingArgument);
        assert_eq!(err.position, 12);
    }

    #[test]
    fn test_unused_argument() {
        let err = format_sql("VALUES (%d)", &[1.into(), 2.into()]).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::UnusedArgument);
    }

    #[test]
    fn test_mismatch() {
        let err = format_sql("VALUES (%d)", &["x".into()]).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::Mismatch);
    }

    #[test]
    fn test_unknown_and_dangling() {
        let err = format_sql("VALUES (%x)", &[1.into()]).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::UnknownSpecifier);

        let err = format_sql("100%", &[]).unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::UnknownSpecifier);
    }
}
