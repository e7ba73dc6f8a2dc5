//! Result iteration.
//!
//! A [`Query`] is a [`Statement`] read for rows. [`Query::begin`] steps once
//! and hands back a [`RowCursor`]; each [`Row`] it exposes reads straight
//! from the live statement, so the borrow checker keeps a row from being
//! used after the cursor moves on.
//!
//! ```rust,ignore
//! let mut q = Query::new(&conn, "SELECT id, name FROM contacts")?;
//! let mut cursor = q.begin()?;
//! while let Some(row) = cursor.current() {
//!     let (id, name): (i64, &str) = row.get_columns([0, 1]);
//!     println!("{id}: {name}");
//!     cursor.advance()?;
//! }
//! ```

#![allow(clippy::result_large_err)]

use std::ffi::{CString, c_int};
use std::marker::PhantomData;

use sqlpp_core::Error;

use crate::connection::Connection;
use crate::ffi;
use crate::statement::{Select, Statement};
use crate::status::Status;
use crate::types::{ColumnType, FromSql, RawValue};

/// A statement whose result rows are read back.
pub type Query<'c> = Statement<'c, Select>;

impl<'c> Statement<'c, Select> {
    /// Number of columns in the result set.
    pub fn column_count(&self) -> i32 {
        if self.handle().is_null() {
            return 0;
        }
        // SAFETY: stmt is live
        unsafe { ffi::sqlite3_column_count(self.handle()) }
    }

    /// The name of result column `index`.
    pub fn column_name(&self, index: i32) -> Option<&str> {
        if self.handle().is_null() {
            return None;
        }
        // SAFETY: the name lives until the statement is finalized or
        // re-prepared, both of which need `&mut self`
        unsafe { ffi::cstr_to_str(ffi::sqlite3_column_name(self.handle(), index)) }
    }

    /// The declared type of result column `index`, if it comes straight from
    /// a table column.
    pub fn column_decltype(&self, index: i32) -> Option<&str> {
        if self.handle().is_null() {
            return None;
        }
        // SAFETY: see column_name
        unsafe { ffi::cstr_to_str(ffi::sqlite3_column_decltype(self.handle(), index)) }
    }

    /// The index of the first result column called `name`.
    pub fn column_index(&self, name: &str) -> Option<i32> {
        (0..self.column_count()).find(|&i| self.column_name(i) == Some(name))
    }

    /// Step to the first row and return a cursor positioned on it.
    pub fn begin(&mut self) -> Result<RowCursor<'_>, Error> {
        let status = self.step();
        let this: &Self = self;
        let conn = this.connection();
        let has_row = match status {
            Status::ROW => true,
            Status::DONE => false,
            other => return Err(conn.error_for(other, Some(this.sql()))),
        };
        Ok(RowCursor {
            stmt: this.handle(),
            conn: Some(conn),
            sql: this.sql(),
            has_row,
            _borrow: PhantomData,
        })
    }

    /// The exhausted cursor every finished iteration compares equal to.
    pub fn end(&self) -> RowCursor<'static> {
        RowCursor::end()
    }

    /// Iterate the remaining rows, mapping each one through `f`.
    ///
    /// An engine failure is yielded once as `Err`, then iteration stops.
    pub fn map_rows<T, F>(&mut self, f: F) -> MappedRows<'_, F>
    where
        F: FnMut(&Row<'_>) -> T,
    {
        let this: &Self = self;
        MappedRows {
            stmt: this.handle(),
            conn: this.connection(),
            sql: this.sql(),
            done: false,
            f,
        }
    }
}

/// A single-pass cursor over the rows of a [`Query`].
///
/// Two cursors are equal when both are on a row or both are exhausted.
#[derive(Debug)]
pub struct RowCursor<'q> {
    stmt: *mut ffi::sqlite3_stmt,
    conn: Option<&'q Connection>,
    sql: &'q str,
    has_row: bool,
    _borrow: PhantomData<&'q mut ()>,
}

impl<'q> RowCursor<'q> {
    /// A cursor that is already exhausted.
    pub fn end() -> RowCursor<'static> {
        RowCursor {
            stmt: std::ptr::null_mut(),
            conn: None,
            sql: "",
            has_row: false,
            _borrow: PhantomData,
        }
    }

    /// The row the cursor is on, or `None` once exhausted.
    pub fn current(&self) -> Option<Row<'_>> {
        if self.has_row {
            // SAFETY: the statement is on a row and stays there while the
            // returned view borrows the cursor
            Some(unsafe { Row::new(self.stmt) })
        } else {
            None
        }
    }

    /// Move to the next row.
    ///
    /// Advancing an exhausted cursor does nothing. A failed step exhausts the
    /// cursor and raises the connection's error.
    pub fn advance(&mut self) -> Result<(), Error> {
        if !self.has_row {
            return Ok(());
        }
        // SAFETY: a cursor with a row always has a live statement
        let status = Status::from_code(unsafe { ffi::sqlite3_step(self.stmt) });
        match status {
            Status::ROW => Ok(()),
            Status::DONE => {
                self.has_row = false;
                Ok(())
            }
            other => {
                self.has_row = false;
                Err(match self.conn {
                    Some(conn) => conn.error_for(other, Some(self.sql)),
                    None => Error::Query(sqlpp_core::QueryError::from_code(
                        other.code(),
                        other.description(),
                    )),
                })
            }
        }
    }

    /// Is the cursor past the last row?
    pub fn is_end(&self) -> bool {
        !self.has_row
    }
}

impl PartialEq for RowCursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.has_row == other.has_row
    }
}

impl Eq for RowCursor<'_> {}

/// A view of the row a statement is positioned on.
#[derive(Debug, Clone, Copy)]
pub struct Row<'r> {
    stmt: *mut ffi::sqlite3_stmt,
    _row: PhantomData<&'r ()>,
}

impl<'r> Row<'r> {
    /// # Safety
    /// `stmt` must be live and stay on its current row for `'r`.
    pub(crate) unsafe fn new(stmt: *mut ffi::sqlite3_stmt) -> Self {
        Self {
            stmt,
            _row: PhantomData,
        }
    }

    /// Number of columns holding data for this row.
    pub fn data_count(&self) -> i32 {
        // SAFETY: stmt is live for 'r
        unsafe { ffi::sqlite3_data_count(self.stmt) }
    }

    /// Storage class of column `index`; out of range reads as NULL.
    pub fn column_type(&self, index: i32) -> ColumnType {
        self.raw(index).value_type()
    }

    /// Size in bytes of column `index` as text or blob.
    pub fn column_bytes(&self, index: i32) -> i32 {
        self.raw(index).bytes()
    }

    /// Column `index` as an unconverted value.
    pub fn raw(&self, index: i32) -> RawValue<'r> {
        // SAFETY: stmt stays on this row for 'r
        unsafe { RawValue::column(self.stmt, index as c_int) }
    }

    /// Read column `index` as `T`.
    ///
    /// Out-of-range indices and NULL read as the zero value of `T`.
    pub fn get<T: FromSql<'r>>(&self, index: i32) -> T {
        T::from_sql(self.raw(index))
    }

    /// Read a column looked up by name, or `None` if no column has that name.
    pub fn get_by_name<T: FromSql<'r>>(&self, name: &str) -> Option<T> {
        let c_name = CString::new(name).ok()?;
        // SAFETY: stmt is live for 'r
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        (0..count)
            .find(|&i| {
                // SAFETY: stmt is live and i is in range
                let ptr = unsafe { ffi::sqlite3_column_name(self.stmt, i) };
                // SAFETY: the engine returns null or a NUL-terminated name
                !ptr.is_null() && unsafe { std::ffi::CStr::from_ptr(ptr) } == c_name.as_c_str()
            })
            .map(|i| self.get(i))
    }

    /// A stream reading consecutive columns from `start`.
    pub fn getter(&self, start: i32) -> Getter<'r> {
        Getter {
            row: *self,
            index: start,
        }
    }

    /// Read several columns at once into a tuple.
    ///
    /// ```rust,ignore
    /// let (id, name, phone): (i64, &str, Option<&str>) = row.get_columns([0, 1, 2]);
    /// ```
    pub fn get_columns<C: FromColumns<'r>>(&self, indices: C::Indices) -> C {
        C::from_columns(self, indices)
    }
}

/// Reads consecutive columns of a row.
#[derive(Debug, Clone, Copy)]
pub struct Getter<'r> {
    row: Row<'r>,
    index: i32,
}

impl<'r> Getter<'r> {
    /// Read the column at the current position and move past it.
    pub fn read<T: FromSql<'r>>(&mut self) -> T {
        let value = self.row.get(self.index);
        self.index += 1;
        value
    }

    /// Move past `n` columns without reading them.
    pub fn skip(&mut self, n: i32) -> &mut Self {
        self.index += n;
        self
    }

    /// The column the next `read` takes.
    pub fn position(&self) -> i32 {
        self.index
    }
}

/// Tuples of column values readable in one call.
pub trait FromColumns<'r>: Sized {
    /// One column index per tuple element.
    type Indices;

    fn from_columns(row: &Row<'r>, indices: Self::Indices) -> Self;
}

macro_rules! impl_from_columns {
    ($n:literal; $($T:ident $i:tt),+) => {
        impl<'r, $($T: FromSql<'r>),+> FromColumns<'r> for ($($T,)+) {
            type Indices = [i32; $n];

            fn from_columns(row: &Row<'r>, indices: [i32; $n]) -> Self {
                ($(row.get::<$T>(indices[$i]),)+)
            }
        }
    };
}

impl_from_columns!(1; A 0);
impl_from_columns!(2; A 0, B 1);
impl_from_columns!(3; A 0, B 1, C 2);
impl_from_columns!(4; A 0, B 1, C 2, D 3);
impl_from_columns!(5; A 0, B 1, C 2, D 3, E 4);
impl_from_columns!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_from_columns!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_from_columns!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Iterator returned by [`Query::map_rows`].
pub struct MappedRows<'q, F> {
    stmt: *mut ffi::sqlite3_stmt,
    conn: &'q Connection,
    sql: &'q str,
    done: bool,
    f: F,
}

impl<T, F> Iterator for MappedRows<'_, F>
where
    F: FnMut(&Row<'_>) -> T,
{
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.stmt.is_null() {
            self.done = true;
            return Some(Err(self.conn.error_for(Status::MISUSE, Some(self.sql))));
        }
        // SAFETY: stmt is live while the query is mutably borrowed
        let status = Status::from_code(unsafe { ffi::sqlite3_step(self.stmt) });
        match status {
            Status::ROW => {
                // SAFETY: the statement is on a row until the next step
                let row = unsafe { Row::new(self.stmt) };
                Some(Ok((self.f)(&row)))
            }
            Status::DONE => {
                self.done = true;
                None
            }
            other => {
                self.done = true;
                Some(Err(self.conn.error_for(other, Some(self.sql))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlpp_core::Value;

    fn setup() -> Connection {
        let conn = Connection::open_memory().unwrap();
        assert!(
            conn.execute(
                "CREATE TABLE contacts (id INTEGER PRIMARY KEY, name TEXT, phone TEXT, photo BLOB);
                 INSERT INTO contacts (name, phone) VALUES ('Mike', '555-1234');
                 INSERT INTO contacts (name, phone, photo) VALUES ('Janet', NULL, x'0102');"
            )
            .is_ok()
        );
        conn
    }

    #[test]
    fn test_column_metadata() {
        let conn = setup();
        let q = Query::new(&conn, "SELECT id, name AS who, 1 + 1 FROM contacts").unwrap();
        assert_eq!(q.column_count(), 3);
        assert_eq!(q.column_name(1), Some("who"));
        assert_eq!(q.column_decltype(0), Some("INTEGER"));
        assert_eq!(q.column_decltype(2), None);
        assert_eq!(q.column_name(7), None);
        assert_eq!(q.column_index("who"), Some(1));
        assert_eq!(q.column_index("nope"), None);
    }

    #[test]
    fn test_cursor_walks_rows() {
        let conn = setup();
        let mut q = Query::new(&conn, "SELECT id, name, phone FROM contacts ORDER BY id").unwrap();
        let mut cursor = q.begin().unwrap();
        let mut seen = Vec::new();
        while let Some(row) = cursor.current() {
            let (id, name, phone): (i64, String, Option<String>) = row.get_columns([0, 1, 2]);
            seen.push((id, name, phone));
            cursor.advance().unwrap();
        }
        assert_eq!(
            seen,
            vec![
                (1, "Mike".to_string(), Some("555-1234".to_string())),
                (2, "Janet".to_string(), None),
            ]
        );
        assert!(cursor == RowCursor::end());
        assert!(cursor.advance().is_ok());
    }

    #[test]
    fn test_empty_result_equals_end() {
        let conn = setup();
        let mut q = Query::new(&conn, "SELECT * FROM contacts WHERE id > 100").unwrap();
        let end = q.end();
        let cursor = q.begin().unwrap();
        assert!(cursor.is_end());
        assert_eq!(cursor, end);
    }

    #[test]
    fn test_typed_reads() {
        let conn = setup();
        let mut q =
            Query::new(&conn, "SELECT id, name, phone, photo, 2.5 FROM contacts WHERE id = 2")
                .unwrap();
        let cursor = q.begin().unwrap();
        let row = cursor.current().unwrap();
        assert_eq!(row.data_count(), 5);
        assert_eq!(row.get::<i32>(0), 2);
        assert_eq!(row.get::<&str>(1), "Janet");
        assert_eq!(row.get::<Option<&str>>(2), None);
        assert_eq!(row.get::<&str>(2), "");
        assert_eq!(row.get::<&[u8]>(3), &[1, 2]);
        assert_eq!(row.get::<Vec<u8>>(3), vec![1, 2]);
        assert_eq!(row.get::<f64>(4), 2.5);
        assert_eq!(row.get::<Value>(4), Value::Double(2.5));
        assert_eq!(row.column_type(2), ColumnType::Null);
        assert_eq!(row.column_type(3), ColumnType::Blob);
        assert_eq!(row.column_bytes(1), 5);
        assert!(row.get::<bool>(0));
        assert_eq!(row.get_by_name::<String>("name").as_deref(), Some("Janet"));
        assert_eq!(row.get_by_name::<String>("missing"), None);
    }

    #[test]
    fn test_out_of_range_column_reads_as_zero() {
        let conn = setup();
        let mut q = Query::new(&conn, "SELECT id FROM contacts").unwrap();
        let cursor = q.begin().unwrap();
        let row = cursor.current().unwrap();
        assert_eq!(row.get::<i64>(9), 0);
        assert_eq!(row.get::<&str>(9), "");
        assert_eq!(row.get::<Option<i64>>(-1), None);
        assert_eq!(row.column_type(9), ColumnType::Null);
    }

    #[test]
    fn test_getter_stream() {
        let conn = setup();
        let mut q = Query::new(&conn, "SELECT id, name, phone FROM contacts WHERE id = 1").unwrap();
        let cursor = q.begin().unwrap();
        let row = cursor.current().unwrap();
        let mut getter = row.getter(0);
        let id: i64 = getter.read();
        getter.skip(1);
        let phone: &str = getter.read();
        assert_eq!((id, phone), (1, "555-1234"));
        assert_eq!(getter.position(), 3);
    }

    #[test]
    fn test_map_rows() {
        let conn = setup();
        let mut q = Query::new(&conn, "SELECT name FROM contacts ORDER BY id").unwrap();
        let names: Result<Vec<String>, Error> = q.map_rows(|row| row.get::<String>(0)).collect();
        assert_eq!(names.unwrap(), vec!["Mike", "Janet"]);
    }

    #[test]
    fn test_map_rows_yields_error_once() {
        let conn = Connection::open_memory().unwrap();
        let mut q = Query::new(&conn, "SELECT abs(-9223372036854775807 - 1)").unwrap();
        let mut rows = q.map_rows(|row| row.get::<i64>(0));
        let first = rows.next().unwrap();
        assert!(first.unwrap_err().to_string().contains("integer overflow"));
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_begin_raises_step_error() {
        let conn = Connection::open_memory().unwrap();
        let mut q = Query::new(&conn, "SELECT abs(-9223372036854775807 - 1)").unwrap();
        let err = q.begin().unwrap_err();
        assert_eq!(err.code(), Some(ffi::SQLITE_ERROR));
        assert!(err.sql().is_some());
    }

    #[test]
    fn test_requery_after_reset() {
        let conn = setup();
        let mut q = Query::new(&conn, "SELECT COUNT(*) FROM contacts WHERE name = ?").unwrap();
        assert!(q.bind(1, "Mike").is_ok());
        let first: i64 = q.begin().unwrap().current().map_or(-1, |r| r.get(0));
        assert!(q.reset().is_ok());
        assert!(q.bind(1, "Nobody").is_ok());
        let second: i64 = q.begin().unwrap().current().map_or(-1, |r| r.get(0));
        assert_eq!((first, second), (1, 0));
    }
}
