//! Prepared statements.
//!
//! A [`Statement`] owns one compiled statement scoped to a [`Connection`].
//! The two flavours share all binding and lifecycle code and differ only in
//! what they do with the compiled form: a [`Command`] is executed for its
//! side effects, a [`Query`](crate::query::Query) is iterated for rows.
//!
//! ```rust,ignore
//! let mut cmd = Command::new(&conn, "INSERT INTO contacts (name, phone) VALUES (:name, :phone)")?;
//! cmd.bind_named(":name", "Mike");
//! cmd.bind_named(":phone", "555-1234");
//! cmd.execute().check(&conn)?;
//! ```

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;
use std::ffi::{CString, c_char, c_int};
use std::marker::PhantomData;
use std::ptr;

use sqlpp_core::{Error, Value};

use crate::connection::{Connection, disconnected_error};
use crate::ffi;
use crate::status::Status;
use crate::types::{Lifetime, ToSql, ValueRef, bind_value_ref};

/// Marker for statements executed for their side effects.
#[derive(Debug)]
pub enum Exec {}

/// Marker for statements iterated for result rows.
#[derive(Debug)]
pub enum Select {}

/// A statement executed for its side effects.
pub type Command<'c> = Statement<'c, Exec>;

/// A value remembered so it can be re-applied to the next statement of a
/// multi-statement text.
#[derive(Debug, Clone)]
enum Retained<'c> {
    Copied(Value),
    Borrowed(ValueRef<'c>),
}

/// A retained value together with the parameter name it was bound under in
/// the statement being replaced.
#[derive(Debug)]
struct Carried<'c> {
    index: c_int,
    name: Option<String>,
    value: Retained<'c>,
}

/// A compiled statement bound to a connection.
pub struct Statement<'c, K> {
    conn: &'c Connection,
    stmt: *mut ffi::sqlite3_stmt,
    sql: CString,
    /// Byte offset of the first character not consumed by the compiled statement.
    tail: usize,
    /// Bindings kept for the statements still waiting in the tail. Empty when
    /// the tail is blank.
    bindings: BTreeMap<c_int, Retained<'c>>,
    retain_bindings: bool,
    _kind: PhantomData<K>,
}

impl<'c, K> Statement<'c, K> {
    /// A statement with no compiled form yet.
    pub fn unprepared(conn: &'c Connection) -> Self {
        Self {
            conn,
            stmt: ptr::null_mut(),
            sql: CString::default(),
            tail: 0,
            bindings: BTreeMap::new(),
            retain_bindings: false,
            _kind: PhantomData,
        }
    }

    /// Compile the first statement of `sql`.
    pub fn new(conn: &'c Connection, sql: &str) -> Result<Self, Error> {
        if !conn.is_connected() {
            return Err(disconnected_error());
        }
        let mut stmt = Self::unprepared(conn);
        let status = stmt.prepare(sql);
        if !status.is_ok() {
            return Err(conn.error_for(status, Some(sql)));
        }
        Ok(stmt)
    }

    /// The connection this statement runs on.
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    /// Compile the first statement of `sql`, finishing any previous one.
    ///
    /// Text after the first complete statement is kept as the tail.
    pub fn prepare(&mut self, sql: &str) -> Status {
        let _ = self.finish();
        let Ok(c_sql) = CString::new(sql) else {
            return Status::MISUSE;
        };
        self.sql = c_sql;
        self.tail = 0;

        let (status, stmt, tail) = self.compile_at(0);
        if status.is_ok() {
            self.stmt = stmt;
            self.tail = tail;
            self.retain_bindings = !is_blank_sql(self.tail());
            tracing::trace!(sql = %self.sql(), "Prepared statement");
        }
        status
    }

    /// Compile the statement starting at byte `offset` of the source text.
    fn compile_at(&self, offset: usize) -> (Status, *mut ffi::sqlite3_stmt, usize) {
        let db = self.conn.handle();
        let len = self.sql.as_bytes().len();
        if db.is_null() {
            return (Status::MISUSE, ptr::null_mut(), offset);
        }
        if offset >= len {
            return (Status::OK, ptr::null_mut(), len);
        }

        let base = self.sql.as_ptr();
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: offset < len so the start pointer lies inside the NUL-terminated buffer
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, base.add(offset), -1, &mut stmt, &mut tail)
        };
        let next = if tail.is_null() {
            len
        } else {
            // SAFETY: the engine returns a tail pointer into the same buffer
            (unsafe { tail.offset_from(base) }).clamp(0, len as isize) as usize
        };
        (Status::from_code(rc), stmt, next)
    }

    /// Has a statement been compiled?
    pub fn is_prepared(&self) -> bool {
        !self.stmt.is_null()
    }

    /// The raw statement handle, or null.
    pub fn handle(&self) -> *mut ffi::sqlite3_stmt {
        self.stmt
    }

    /// The full source text last passed to `prepare`.
    pub fn sql(&self) -> &str {
        self.sql.to_str().unwrap_or("")
    }

    /// Source text not consumed by the compiled statement.
    pub fn tail(&self) -> &str {
        self.sql
            .as_bytes()
            .get(self.tail..)
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or("")
    }

    /// Finalize the compiled statement. Finishing twice is harmless.
    pub fn finish(&mut self) -> Status {
        self.bindings.clear();
        self.retain_bindings = false;
        self.tail = self.sql.as_bytes().len();
        if self.stmt.is_null() {
            return Status::OK;
        }
        // SAFETY: stmt is a live handle owned by this statement
        let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
        self.stmt = ptr::null_mut();
        Status::from_code(rc)
    }

    /// Evaluate the statement once.
    pub fn step(&mut self) -> Status {
        if self.stmt.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: stmt is live
        Status::from_code(unsafe { ffi::sqlite3_step(self.stmt) })
    }

    /// Rewind so the statement can run again. Bindings are kept.
    pub fn reset(&mut self) -> Status {
        if self.stmt.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: stmt is live
        Status::from_code(unsafe { ffi::sqlite3_reset(self.stmt) })
    }

    /// Set every parameter back to NULL.
    pub fn clear_bindings(&mut self) -> Status {
        self.bindings.clear();
        if self.stmt.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: stmt is live
        Status::from_code(unsafe { ffi::sqlite3_clear_bindings(self.stmt) })
    }

    /// Does the statement leave the database unchanged?
    pub fn is_readonly(&self) -> bool {
        if self.stmt.is_null() {
            return true;
        }
        // SAFETY: stmt is live
        unsafe { ffi::sqlite3_stmt_readonly(self.stmt) != 0 }
    }

    /// Number of parameters; for `?NNN` this is the largest index used.
    pub fn parameter_count(&self) -> i32 {
        if self.stmt.is_null() {
            return 0;
        }
        // SAFETY: stmt is live
        unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) }
    }

    /// The index of a named parameter, including its prefix (`:name`,
    /// `@name`, `$name`), or 0 when there is no such parameter.
    pub fn parameter_index(&self, name: &str) -> i32 {
        if self.stmt.is_null() {
            return 0;
        }
        let Ok(c_name) = CString::new(name) else {
            return 0;
        };
        // SAFETY: stmt is live, c_name is NUL-terminated
        unsafe { ffi::sqlite3_bind_parameter_index(self.stmt, c_name.as_ptr()) }
    }

    /// The name of parameter `index`, or `None` for anonymous `?` parameters.
    pub fn parameter_name(&self, index: i32) -> Option<String> {
        parameter_name_of(self.stmt, index)
    }

    /// Bind a copy of `value` to the 1-based parameter `index`.
    pub fn bind<T: ToSql + ?Sized>(&mut self, index: i32, value: &T) -> Status {
        let value = value.to_sql();
        let status = self.bind_raw(index, value, Lifetime::Transient);
        if status.is_ok() && self.retain_bindings {
            self.bindings
                .insert(index, Retained::Copied(value.to_owned_value()));
        }
        status
    }

    /// Bind a copy of `value` to a named parameter.
    ///
    /// An unknown name returns `RANGE` without touching the statement.
    pub fn bind_named<T: ToSql + ?Sized>(&mut self, name: &str, value: &T) -> Status {
        match self.resolve_name(name) {
            Some(index) => self.bind(index, value),
            None => Status::RANGE,
        }
    }

    /// Bind NULL to parameter `index`.
    pub fn bind_null(&mut self, index: i32) -> Status {
        self.bind(index, &crate::types::Null)
    }

    /// Bind text without copying it.
    ///
    /// The borrow lasts as long as the connection borrow, so the text stays
    /// valid for every execution of this statement.
    pub fn bind_text_nocopy(&mut self, index: i32, text: &'c str) -> Status {
        self.bind_borrowed(index, ValueRef::Text(text))
    }

    /// Bind a blob without copying it.
    pub fn bind_blob_nocopy(&mut self, index: i32, blob: &'c [u8]) -> Status {
        self.bind_borrowed(index, ValueRef::Blob(blob))
    }

    /// Bind `values` to parameters 1..=n, stopping at the first failure.
    pub fn bind_values(&mut self, values: &[&dyn ToSql]) -> Status {
        for (i, value) in values.iter().enumerate() {
            let Ok(index) = c_int::try_from(i + 1) else {
                return Status::RANGE;
            };
            let status = self.bind(index, *value);
            if !status.is_ok() {
                return status;
            }
        }
        Status::OK
    }

    /// A bind stream writing to consecutive parameters from `start`.
    pub fn binder(&mut self, start: i32) -> Binder<'_, 'c, K> {
        Binder {
            stmt: self,
            index: start,
        }
    }

    fn bind_borrowed(&mut self, index: i32, value: ValueRef<'c>) -> Status {
        let status = self.bind_raw(index, value, Lifetime::Static);
        if status.is_ok() && self.retain_bindings {
            self.bindings.insert(index, Retained::Borrowed(value));
        }
        status
    }

    fn bind_raw(&mut self, index: i32, value: ValueRef<'_>, lifetime: Lifetime) -> Status {
        if self.stmt.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: stmt is live; Static is only used for data borrowed for 'c,
        // which outlives the statement
        Status::from_code(unsafe { bind_value_ref(self.stmt, index, value, lifetime) })
    }

    fn resolve_name(&self, name: &str) -> Option<c_int> {
        let index = self.parameter_index(name);
        if index == 0 {
            tracing::warn!(parameter = name, sql = %self.sql(), "Unknown named parameter");
            None
        } else {
            Some(index)
        }
    }

    /// Pair each retained value with its parameter name in the current
    /// statement, emptying the retained set.
    fn take_carried(&mut self) -> Vec<Carried<'c>> {
        std::mem::take(&mut self.bindings)
            .into_iter()
            .map(|(index, value)| Carried {
                index,
                name: self.parameter_name(index),
                value,
            })
            .collect()
    }

    /// Re-apply `bindings` to the current statement, matching by name where
    /// the parameter has one and by position otherwise. Parameters the
    /// current statement does not have are skipped.
    fn replay(&mut self, bindings: Vec<Carried<'c>>) -> Status {
        let count = self.parameter_count();
        for binding in bindings {
            let index = match &binding.name {
                Some(name) => self.parameter_index(name),
                None if binding.index <= count => binding.index,
                None => 0,
            };
            if index == 0 {
                continue;
            }
            let status = match binding.value {
                Retained::Copied(value) => {
                    let status = self.bind_raw(index, value.to_sql(), Lifetime::Transient);
                    if status.is_ok() && self.retain_bindings {
                        self.bindings.insert(index, Retained::Copied(value));
                    }
                    status
                }
                Retained::Borrowed(value) => self.bind_borrowed(index, value),
            };
            if !status.is_ok() {
                return status;
            }
        }
        Status::OK
    }

    /// Compile the statement in the tail, carry the current bindings over and
    /// finalize the previous compiled form.
    ///
    /// Returns `OK` with no compiled statement when the tail holds only
    /// whitespace or comments.
    pub(crate) fn advance_to_tail(&mut self) -> Status {
        let (status, next, tail) = self.compile_at(self.tail);
        if !status.is_ok() {
            return status;
        }
        let bindings = self.take_carried();
        if !self.stmt.is_null() {
            // SAFETY: the old handle is live and no longer referenced
            unsafe { ffi::sqlite3_finalize(self.stmt) };
        }
        self.stmt = next;
        self.tail = tail;
        self.retain_bindings = !is_blank_sql(self.tail());
        if next.is_null() {
            return Status::OK;
        }
        tracing::trace!(sql = %self.sql(), offset = tail, "Prepared next statement");
        self.replay(bindings)
    }
}

/// Does `text` hold nothing but whitespace, comments and empty statements?
fn is_blank_sql(text: &str) -> bool {
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        rest = if let Some(after) = rest.strip_prefix("--") {
            after.find('\n').map_or("", |end| &after[end + 1..])
        } else if let Some(after) = rest.strip_prefix("/*") {
            after.find("*/").map_or("", |end| &after[end + 2..])
        } else if let Some(after) = rest.strip_prefix(';') {
            after
        } else {
            return false;
        };
        rest = rest.trim_start();
    }
    true
}

fn parameter_name_of(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    if stmt.is_null() {
        return None;
    }
    // SAFETY: stmt is live; the returned name is owned by the statement
    unsafe { ffi::cstr_to_string(ffi::sqlite3_bind_parameter_name(stmt, index)) }
}

impl<'c> Statement<'c, Exec> {
    /// Run the statement to completion. `DONE` is reported as `OK`; any
    /// other code comes back unchanged.
    pub fn execute(&mut self) -> Status {
        let status = self.step();
        if status.is_done() {
            Status::OK
        } else {
            status
        }
    }

    /// Execute the current statement and then every statement that follows
    /// it in the source text, carrying bindings forward.
    ///
    /// Stops at the first failure and returns its status.
    pub fn execute_all(&mut self) -> Status {
        let status = self.execute();
        if !status.is_ok() {
            return status;
        }
        loop {
            let status = self.advance_to_tail();
            if !status.is_ok() || !self.is_prepared() {
                return status;
            }
            let status = self.execute();
            if !status.is_ok() {
                return status;
            }
        }
    }
}

impl<K> Drop for Statement<'_, K> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

impl<K> std::fmt::Debug for Statement<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql())
            .field("prepared", &self.is_prepared())
            .field("tail", &self.tail())
            .finish_non_exhaustive()
    }
}

/// Binds a sequence of values to consecutive parameters.
///
/// ```rust,ignore
/// cmd.binder(1).push("Mike")?.push(&555_1234_i64)?;
/// ```
pub struct Binder<'s, 'c, K> {
    stmt: &'s mut Statement<'c, K>,
    index: c_int,
}

impl<K> Binder<'_, '_, K> {
    /// Bind `value` at the current position and move to the next one.
    pub fn push<T: ToSql + ?Sized>(&mut self, value: &T) -> Result<&mut Self, Error> {
        let status = self.stmt.bind(self.index, value);
        if !status.is_ok() {
            let sql = self.stmt.sql().to_string();
            return Err(self.stmt.conn.error_for(status, Some(&sql)));
        }
        self.index += 1;
        Ok(self)
    }

    /// The parameter the next `push` writes to.
    pub fn position(&self) -> i32 {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_memory().unwrap();
        assert!(
            conn.execute("CREATE TABLE contacts (name TEXT, phone TEXT)")
                .is_ok()
        );
        conn
    }

    fn count(conn: &Connection) -> i64 {
        let mut q = crate::query::Query::new(conn, "SELECT COUNT(*) FROM contacts").unwrap();
        let cursor = q.begin().unwrap();
        let n = cursor.current().map_or(-1, |row| row.get::<i64>(0));
        n
    }

    #[test]
    fn test_prepare_tracks_tail() {
        let conn = setup();
        let cmd = Command::new(&conn, "INSERT INTO contacts VALUES (1, 2); DELETE FROM contacts")
            .unwrap();
        assert!(cmd.is_prepared());
        assert_eq!(cmd.tail(), " DELETE FROM contacts");
        assert!(cmd.sql().starts_with("INSERT"));
    }

    #[test]
    fn test_prepare_error_raises() {
        let conn = setup();
        let err = Command::new(&conn, "INSERT INTO missing VALUES (1)").unwrap_err();
        assert!(err.to_string().contains("no such table"));
        assert_eq!(err.sql(), Some("INSERT INTO missing VALUES (1)"));
    }

    #[test]
    fn test_unprepared_statement_reports_misuse() {
        let conn = setup();
        let mut cmd = Command::unprepared(&conn);
        assert!(!cmd.is_prepared());
        assert_eq!(cmd.step(), Status::MISUSE);
        assert_eq!(cmd.bind(1, &1), Status::MISUSE);
        assert!(cmd.finish().is_ok());
    }

    #[test]
    fn test_bind_and_execute() {
        let conn = setup();
        let mut cmd = Command::new(&conn, "INSERT INTO contacts VALUES (?, ?)").unwrap();
        assert_eq!(cmd.parameter_count(), 2);
        assert!(cmd.bind(1, "Mike").is_ok());
        assert!(cmd.bind(2, "555-1234").is_ok());
        assert!(cmd.execute().is_ok());
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_reset_and_rebind() {
        let conn = setup();
        let mut cmd = Command::new(&conn, "INSERT INTO contacts VALUES (?, ?)").unwrap();
        assert!(cmd.bind_values(&[&"Mike", &"555-1234"]).is_ok());
        assert!(cmd.execute().is_ok());
        assert!(cmd.reset().is_ok());
        assert!(cmd.bind_values(&[&"Janet", &"555-6789"]).is_ok());
        assert!(cmd.execute().is_ok());
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn test_named_parameters() {
        let conn = setup();
        let mut cmd =
            Command::new(&conn, "INSERT INTO contacts VALUES (:name, :phone)").unwrap();
        assert_eq!(cmd.parameter_index(":phone"), 2);
        assert_eq!(cmd.parameter_name(1).as_deref(), Some(":name"));
        assert!(cmd.bind_named(":name", "Mike").is_ok());
        assert!(cmd.bind_named(":phone", &Some("555")).is_ok());
        assert_eq!(cmd.bind_named(":nope", "x"), Status::RANGE);
        assert!(cmd.execute().is_ok());
    }

    #[test]
    fn test_out_of_range_index() {
        let conn = setup();
        let mut cmd = Command::new(&conn, "INSERT INTO contacts VALUES (?, ?)").unwrap();
        assert_eq!(cmd.bind(3, &1), Status::RANGE);
        assert_eq!(cmd.bind(0, &1), Status::RANGE);
        assert_eq!(cmd.parameter_name(9), None);
    }

    #[test]
    fn test_binder_stream() {
        let conn = setup();
        let mut cmd = Command::new(&conn, "INSERT INTO contacts VALUES (?, ?)").unwrap();
        let mut binder = cmd.binder(1);
        binder.push("Mike").unwrap().push("555").unwrap();
        assert_eq!(binder.position(), 3);
        assert!(binder.push("extra").is_err());
        assert!(cmd.execute().is_ok());
    }

    #[test]
    fn test_execute_all_shares_named_bindings() {
        let conn = setup();
        let mut cmd = Command::new(
            &conn,
            "INSERT INTO contacts (name, phone) VALUES (:user, '1');
             INSERT INTO contacts (name, phone) VALUES (:user, '2');
             INSERT INTO contacts (name, phone) VALUES (:user, '3');",
        )
        .unwrap();
        assert!(cmd.bind_named(":user", "Mike").is_ok());
        assert!(cmd.execute_all().is_ok());
        assert_eq!(count(&conn), 3);
        assert!(!cmd.is_prepared());
    }

    #[test]
    fn test_execute_all_with_differing_parameter_counts() {
        let conn = setup();
        let mut cmd = Command::new(
            &conn,
            "INSERT INTO contacts VALUES (?, ?); DELETE FROM contacts; -- done",
        )
        .unwrap();
        assert!(cmd.bind_values(&[&"Mike", &"555"]).is_ok());
        assert!(cmd.execute_all().is_ok());
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_single_statement_retains_no_bindings() {
        let conn = setup();
        let mut cmd = Command::new(&conn, "INSERT INTO contacts VALUES (:name, :phone); -- one").unwrap();
        assert!(cmd.bind_named(":name", "Mike").is_ok());
        assert!(cmd.bind_named(":phone", b"555".as_slice()).is_ok());
        assert!(cmd.bindings.is_empty());
        assert!(cmd.execute_all().is_ok());
        assert_eq!(count(&conn), 1);

        let mut q = crate::query::Query::new(&conn, "SELECT name FROM contacts WHERE name = ?").unwrap();
        assert!(q.bind(1, "Mike").is_ok());
        assert!(q.bindings.is_empty());
    }

    #[test]
    fn test_multi_statement_retains_until_last() {
        let conn = setup();
        let mut cmd = Command::new(
            &conn,
            "INSERT INTO contacts (name) VALUES (:user); INSERT INTO contacts (name) VALUES (:user);",
        )
        .unwrap();
        assert!(cmd.bind_named(":user", "Mike").is_ok());
        assert!(cmd.bind_named(":user", "Janet").is_ok());
        assert_eq!(cmd.bindings.len(), 1);

        assert!(cmd.execute().is_ok());
        assert!(cmd.advance_to_tail().is_ok());
        // the last statement has nothing left to carry bindings to
        assert!(cmd.bindings.is_empty());
        assert!(cmd.execute().is_ok());

        let mut q = crate::query::Query::new(&conn, "SELECT COUNT(*) FROM contacts WHERE name = 'Janet'").unwrap();
        let cursor = q.begin().unwrap();
        assert_eq!(cursor.current().map(|row| row.get::<i64>(0)), Some(2));
    }

    #[test]
    fn test_blank_sql() {
        assert!(is_blank_sql(""));
        assert!(is_blank_sql("  ;\n -- trailing note\n /* block */ ;"));
        assert!(is_blank_sql("/* unterminated"));
        assert!(!is_blank_sql(" -- note\nDELETE FROM contacts"));
        assert!(!is_blank_sql("/* a */ SELECT 1"));
    }

    #[test]
    fn test_execute_all_stops_at_failure() {
        let conn = setup();
        let mut cmd = Command::new(
            &conn,
            "INSERT INTO contacts VALUES ('a', 'b'); INSERT INTO missing VALUES (1); INSERT INTO contacts VALUES ('c', 'd');",
        )
        .unwrap();
        let status = cmd.execute_all();
        assert_eq!(status, Status::ERROR);
        assert!(conn.error_msg().contains("no such table"));
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_nocopy_binding() {
        let conn = setup();
        let name = String::from("Mike");
        let phone = b"555".to_vec();
        let mut cmd = Command::new(&conn, "INSERT INTO contacts VALUES (?, ?)").unwrap();
        assert!(cmd.bind_text_nocopy(1, &name).is_ok());
        assert!(cmd.bind_blob_nocopy(2, &phone).is_ok());
        assert!(cmd.execute().is_ok());
        drop(cmd);
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let conn = setup();
        let mut cmd = Command::new(&conn, "SELECT 1; SELECT 2").unwrap();
        assert!(cmd.finish().is_ok());
        assert!(!cmd.is_prepared());
        assert_eq!(cmd.tail(), "");
        assert!(cmd.finish().is_ok());
    }

    #[test]
    fn test_is_readonly() {
        let conn = setup();
        let select = Command::new(&conn, "SELECT 1").unwrap();
        assert!(select.is_readonly());
        let insert = Command::new(&conn, "INSERT INTO contacts VALUES (1, 2)").unwrap();
        assert!(!insert.is_readonly());
    }
}
