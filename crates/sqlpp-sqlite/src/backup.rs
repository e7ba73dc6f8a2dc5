//! Online backup between two connections.

#![allow(clippy::result_large_err)]

use std::ffi::{CString, c_int};
use std::marker::PhantomData;

use sqlpp_core::{ConfigError, Error};

use crate::connection::{Connection, disconnected_error};
use crate::ffi;
use crate::status::Status;

/// Pages copied per step by [`Connection::backup_to`].
pub const DEFAULT_PAGES_PER_STEP: c_int = 5;

/// A running copy of one database into another.
///
/// The source is borrowed shared, the destination exclusively; the engine
/// object is released on drop if [`finish`](Self::finish) was not called.
pub struct Backup<'a, 'b> {
    handle: *mut ffi::sqlite3_backup,
    dest: &'b mut Connection,
    _source: PhantomData<&'a Connection>,
}

impl<'a, 'b> Backup<'a, 'b> {
    /// Copy the `main` database of `source` into the `main` database of `dest`.
    pub fn new(source: &'a Connection, dest: &'b mut Connection) -> Result<Self, Error> {
        Self::with_names(source, "main", dest, "main")
    }

    /// Copy between named databases (`main`, `temp` or an attached alias).
    pub fn with_names(
        source: &'a Connection,
        source_name: &str,
        dest: &'b mut Connection,
        dest_name: &str,
    ) -> Result<Self, Error> {
        if !source.is_connected() || !dest.is_connected() {
            return Err(disconnected_error());
        }
        let (Ok(c_source), Ok(c_dest)) = (CString::new(source_name), CString::new(dest_name))
        else {
            return Err(Error::Config(ConfigError {
                message: "database name contains a NUL byte".to_string(),
                source: None,
            }));
        };

        // SAFETY: both handles are live and the names are NUL-terminated
        let handle = unsafe {
            ffi::sqlite3_backup_init(
                dest.handle(),
                c_dest.as_ptr(),
                source.handle(),
                c_source.as_ptr(),
            )
        };
        if handle.is_null() {
            // the engine leaves the reason on the destination connection
            let status = Status::from_code(dest.error_code());
            return Err(dest.error_for(status, None));
        }
        tracing::debug!(from = source_name, to = dest_name, "Backup started");
        Ok(Self {
            handle,
            dest,
            _source: PhantomData,
        })
    }

    /// Copy up to `pages` pages; a negative count copies everything left.
    ///
    /// Returns `OK` while pages remain, `DONE` when the copy is complete, or
    /// `BUSY`/`LOCKED` when the step should be retried later.
    pub fn step(&mut self, pages: c_int) -> Status {
        if self.handle.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: handle is live until finish
        let status = Status::from_code(unsafe { ffi::sqlite3_backup_step(self.handle, pages) });
        tracing::trace!(
            %status,
            remaining = self.remaining(),
            page_count = self.page_count(),
            "Backup step"
        );
        status
    }

    /// Pages still to be copied as of the last step.
    pub fn remaining(&self) -> c_int {
        if self.handle.is_null() {
            return 0;
        }
        // SAFETY: handle is live until finish
        unsafe { ffi::sqlite3_backup_remaining(self.handle) }
    }

    /// Total pages in the source as of the last step.
    pub fn page_count(&self) -> c_int {
        if self.handle.is_null() {
            return 0;
        }
        // SAFETY: handle is live until finish
        unsafe { ffi::sqlite3_backup_pagecount(self.handle) }
    }

    /// Step until the copy completes or fails, reporting after every step.
    ///
    /// The loop keeps going on `OK`, `BUSY` and `LOCKED`. It returns the
    /// status of [`finish`](Self::finish) when the copy reached `DONE`, and
    /// the failing step's status otherwise.
    pub fn run<F>(&mut self, pages_per_step: c_int, mut progress: F) -> Status
    where
        F: FnMut(c_int, c_int, Status),
    {
        loop {
            let status = self.step(pages_per_step);
            progress(self.remaining(), self.page_count(), status);
            match status {
                Status::OK | Status::BUSY | Status::LOCKED => continue,
                Status::DONE => return self.finish(),
                failed => {
                    let _ = self.finish();
                    return failed;
                }
            }
        }
    }

    /// Release the engine object. Calling it again returns `OK`.
    pub fn finish(&mut self) -> Status {
        if self.handle.is_null() {
            return Status::OK;
        }
        // SAFETY: handle is live and is not used after this call
        let rc = unsafe { ffi::sqlite3_backup_finish(self.handle) };
        self.handle = std::ptr::null_mut();
        tracing::debug!(path = %self.dest.path(), code = rc, "Backup finished");
        Status::from_code(rc)
    }
}

impl Drop for Backup<'_, '_> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

impl std::fmt::Debug for Backup<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backup")
            .field("active", &!self.handle.is_null())
            .field("remaining", &self.remaining())
            .field("page_count", &self.page_count())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Copy this database into `dest`, calling `progress(remaining,
    /// page_count, status)` after every step.
    ///
    /// Returns `MISUSE` or the engine's code when the backup cannot start.
    pub fn backup_to<F>(&self, dest: &mut Connection, progress: F) -> Status
    where
        F: FnMut(c_int, c_int, Status),
    {
        match Backup::new(self, dest) {
            Ok(mut backup) => backup.run(DEFAULT_PAGES_PER_STEP, progress),
            Err(err) => {
                tracing::debug!(error = %err, "Backup could not start");
                err.code().map_or(Status::MISUSE, Status::from_code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(conn: &Connection) {
        assert!(
            conn.execute(
                "CREATE TABLE t (x INTEGER, pad TEXT);
                 WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 200)
                 INSERT INTO t SELECT i, hex(zeroblob(250)) FROM n;"
            )
            .is_ok()
        );
    }

    fn source() -> Connection {
        let conn = Connection::open_memory().unwrap();
        fill(&conn);
        conn
    }

    fn count(conn: &Connection) -> i64 {
        let mut q = crate::query::Query::new(conn, "SELECT COUNT(*) FROM t").unwrap();
        let n = q.begin().unwrap().current().map_or(-1, |r| r.get(0));
        n
    }

    #[test]
    fn test_backup_to_copies_everything() {
        let src = source();
        let mut dest = Connection::open_memory().unwrap();
        let mut calls = Vec::new();
        let status = src.backup_to(&mut dest, |remaining, page_count, status| {
            calls.push((remaining, page_count, status));
        });
        assert!(status.is_ok());
        assert_eq!(count(&dest), 200);

        // several steps of 5 pages each, ending on DONE with nothing left
        assert!(calls.len() > 1);
        let last = calls.last().copied().unwrap();
        assert_eq!(last.0, 0);
        assert_eq!(last.2, Status::DONE);
        assert!(calls[..calls.len() - 1].iter().all(|c| c.2 == Status::OK));
    }

    #[test]
    fn test_backup_waits_out_a_locked_source() {
        let path = std::env::temp_dir().join(format!("sqlpp_backup_busy_{}.db", std::process::id()));
        let path_str = path.to_string_lossy().into_owned();
        let _ = std::fs::remove_file(&path);

        let src = Connection::open_file(path_str.clone()).unwrap();
        fill(&src);
        let holder = Connection::open_file(path_str).unwrap();
        assert!(holder.execute("BEGIN EXCLUSIVE").is_ok());

        let mut dest = Connection::open_memory().unwrap();
        let mut seen = Vec::new();
        let status = src.backup_to(&mut dest, |_, _, status| {
            seen.push(status);
            if status == Status::BUSY && !holder.is_autocommit() {
                assert!(holder.execute("COMMIT").is_ok());
            }
        });
        assert!(status.is_ok());
        assert_eq!(seen.first().copied(), Some(Status::BUSY));
        assert_eq!(seen.last().copied(), Some(Status::DONE));
        assert_eq!(count(&dest), 200);

        drop(holder);
        drop(src);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_manual_steps() {
        let src = source();
        let mut dest = Connection::open_memory().unwrap();
        let mut backup = Backup::new(&src, &mut dest).unwrap();
        assert_eq!(backup.step(1), Status::OK);
        assert!(backup.page_count() > 1);
        assert_eq!(backup.remaining(), backup.page_count() - 1);
        assert_eq!(backup.step(-1), Status::DONE);
        assert_eq!(backup.remaining(), 0);
        assert!(backup.finish().is_ok());
        assert!(backup.finish().is_ok());
        assert_eq!(backup.step(1), Status::MISUSE);
        drop(backup);
        assert_eq!(count(&dest), 200);
    }

    #[test]
    fn test_backup_from_closed_connection() {
        let src = Connection::new();
        let mut dest = Connection::open_memory().unwrap();
        assert!(Backup::new(&src, &mut dest).is_err());
        assert_eq!(src.backup_to(&mut dest, |_, _, _| {}), Status::MISUSE);
    }

    #[test]
    fn test_unknown_database_name() {
        let src = source();
        let mut dest = Connection::open_memory().unwrap();
        let err = Backup::with_names(&src, "nope", &mut dest, "main").unwrap_err();
        assert!(err.to_string().contains("unknown database"));
    }
}
