//! Per-connection engine callbacks.
//!
//! Each hook kind holds at most one handler. Installing a handler replaces the
//! previous one; clearing it removes the native callback entirely. Handlers
//! are boxed and kept alive by the connection, and the engine receives a thin
//! pointer to the box together with a trampoline monomorphized for the
//! closure type. Panics never unwind into the engine.

use std::any::Any;
use std::ffi::{c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use crate::connection::Connection;
use crate::ffi;
use crate::status::Status;

/// The kind of row change reported to an update handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Insert,
    Update,
    Delete,
    /// A code this crate does not know about.
    Other(i32),
}

impl UpdateAction {
    fn from_code(code: c_int) -> Self {
        match code {
            ffi::SQLITE_INSERT => UpdateAction::Insert,
            ffi::SQLITE_UPDATE => UpdateAction::Update,
            ffi::SQLITE_DELETE => UpdateAction::Delete,
            other => UpdateAction::Other(other),
        }
    }
}

/// A row change observed by an update handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowChange<'a> {
    pub action: UpdateAction,
    pub database: &'a str,
    pub table: &'a str,
    pub rowid: i64,
}

/// An authorization request raised while a statement is being compiled.
///
/// `action` is one of the engine's `SQLITE_*` action codes (for example
/// `SQLITE_READ` or `SQLITE_INSERT`); the meaning of `arg1`/`arg2` depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRequest<'a> {
    pub action: i32,
    pub arg1: Option<&'a str>,
    pub arg2: Option<&'a str>,
    pub database: Option<&'a str>,
    pub trigger_or_view: Option<&'a str>,
}

/// An authorizer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authorization {
    #[default]
    Allow,
    /// Fail compilation of the statement with an authorization error.
    Deny,
    /// Compile the statement but treat the column as NULL / skip the action.
    Ignore,
}

impl Authorization {
    fn to_code(self) -> c_int {
        match self {
            Authorization::Allow => ffi::SQLITE_OK,
            Authorization::Deny => ffi::SQLITE_DENY,
            Authorization::Ignore => ffi::SQLITE_IGNORE,
        }
    }
}

/// Boxed handlers kept alive for as long as they are registered.
#[derive(Default)]
pub(crate) struct Hooks {
    busy: Option<Box<dyn Any + Send>>,
    commit: Option<Box<dyn Any + Send>>,
    rollback: Option<Box<dyn Any + Send>>,
    update: Option<Box<dyn Any + Send>>,
    authorize: Option<Box<dyn Any + Send>>,
}

impl Hooks {
    /// Remove every native callback this wrapper installed.
    pub(crate) fn unregister_all(&mut self, db: *mut ffi::sqlite3) {
        if db.is_null() {
            return;
        }
        // SAFETY: db is live; passing None uninstalls the callback
        unsafe {
            if self.busy.take().is_some() {
                ffi::sqlite3_busy_handler(db, None, ptr::null_mut());
            }
            if self.commit.take().is_some() {
                ffi::sqlite3_commit_hook(db, None, ptr::null_mut());
            }
            if self.rollback.take().is_some() {
                ffi::sqlite3_rollback_hook(db, None, ptr::null_mut());
            }
            if self.update.take().is_some() {
                ffi::sqlite3_update_hook(db, None, ptr::null_mut());
            }
            if self.authorize.take().is_some() {
                ffi::sqlite3_set_authorizer(db, None, ptr::null_mut());
            }
        }
    }
}

/// Store `handler` in `slot` and return a thin pointer to it for the engine.
fn install<F: Any + Send>(slot: &mut Option<Box<dyn Any + Send>>, handler: F) -> *mut c_void {
    let stored = slot.insert(Box::new(handler));
    stored
        .downcast_mut::<F>()
        .map_or(ptr::null_mut(), |f| ptr::from_mut(f).cast::<c_void>())
}

impl Connection {
    /// Called when a table is locked. Receives the number of prior calls for
    /// the same lock event; return `true` to retry, `false` to give up with BUSY.
    ///
    /// Replaces any busy timeout.
    pub fn set_busy_handler<F>(&mut self, handler: F) -> Status
    where
        F: FnMut(i32) -> bool + Send + 'static,
    {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        let data = install(&mut self.hooks.busy, handler);
        // SAFETY: db is live; data points into a box kept until unregistered
        let rc = unsafe { ffi::sqlite3_busy_handler(db, Some(busy_trampoline::<F>), data) };
        Status::from_code(rc)
    }

    pub fn clear_busy_handler(&mut self) -> Status {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: db is live
        let rc = unsafe { ffi::sqlite3_busy_handler(db, None, ptr::null_mut()) };
        self.hooks.busy = None;
        Status::from_code(rc)
    }

    /// Called before a transaction commits. Return `true` to turn the commit
    /// into a rollback.
    pub fn set_commit_handler<F>(&mut self, handler: F) -> Status
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        let data = install(&mut self.hooks.commit, handler);
        // SAFETY: db is live; data points into a box kept until unregistered
        unsafe { ffi::sqlite3_commit_hook(db, Some(commit_trampoline::<F>), data) };
        Status::OK
    }

    pub fn clear_commit_handler(&mut self) -> Status {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: db is live
        unsafe { ffi::sqlite3_commit_hook(db, None, ptr::null_mut()) };
        self.hooks.commit = None;
        Status::OK
    }

    /// Called whenever a transaction rolls back.
    pub fn set_rollback_handler<F>(&mut self, handler: F) -> Status
    where
        F: FnMut() + Send + 'static,
    {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        let data = install(&mut self.hooks.rollback, handler);
        // SAFETY: db is live; data points into a box kept until unregistered
        unsafe { ffi::sqlite3_rollback_hook(db, Some(rollback_trampoline::<F>), data) };
        Status::OK
    }

    pub fn clear_rollback_handler(&mut self) -> Status {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: db is live
        unsafe { ffi::sqlite3_rollback_hook(db, None, ptr::null_mut()) };
        self.hooks.rollback = None;
        Status::OK
    }

    /// Called for every row inserted, updated or deleted in a rowid table.
    pub fn set_update_handler<F>(&mut self, handler: F) -> Status
    where
        F: FnMut(RowChange<'_>) + Send + 'static,
    {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        let data = install(&mut self.hooks.update, handler);
        // SAFETY: db is live; data points into a box kept until unregistered
        unsafe { ffi::sqlite3_update_hook(db, Some(update_trampoline::<F>), data) };
        Status::OK
    }

    pub fn clear_update_handler(&mut self) -> Status {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: db is live
        unsafe { ffi::sqlite3_update_hook(db, None, ptr::null_mut()) };
        self.hooks.update = None;
        Status::OK
    }

    /// Called while statements are compiled to allow, deny or ignore each
    /// access they would perform.
    pub fn set_authorize_handler<F>(&mut self, handler: F) -> Status
    where
        F: FnMut(AuthRequest<'_>) -> Authorization + Send + 'static,
    {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        let data = install(&mut self.hooks.authorize, handler);
        // SAFETY: db is live; data points into a box kept until unregistered
        let rc =
            unsafe { ffi::sqlite3_set_authorizer(db, Some(authorize_trampoline::<F>), data) };
        Status::from_code(rc)
    }

    pub fn clear_authorize_handler(&mut self) -> Status {
        let db = self.handle();
        if db.is_null() {
            return Status::MISUSE;
        }
        // SAFETY: db is live
        let rc = unsafe { ffi::sqlite3_set_authorizer(db, None, ptr::null_mut()) };
        self.hooks.authorize = None;
        Status::from_code(rc)
    }
}

/// # Safety
/// `data` must point to a live `F` owned by `Hooks::busy`.
unsafe extern "C" fn busy_trampoline<F>(data: *mut c_void, count: c_int) -> c_int
where
    F: FnMut(i32) -> bool,
{
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: see function contract
        let f = unsafe { &mut *data.cast::<F>() };
        f(count)
    }));
    match result {
        Ok(retry) => c_int::from(retry),
        Err(_) => {
            tracing::error!("Busy handler panicked; giving up on the lock");
            0
        }
    }
}

/// # Safety
/// `data` must point to a live `F` owned by `Hooks::commit`.
unsafe extern "C" fn commit_trampoline<F>(data: *mut c_void) -> c_int
where
    F: FnMut() -> bool,
{
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: see function contract
        let f = unsafe { &mut *data.cast::<F>() };
        f()
    }));
    match result {
        Ok(veto) => c_int::from(veto),
        Err(_) => {
            tracing::error!("Commit handler panicked; rolling back");
            1
        }
    }
}

/// # Safety
/// `data` must point to a live `F` owned by `Hooks::rollback`.
unsafe extern "C" fn rollback_trampoline<F>(data: *mut c_void)
where
    F: FnMut(),
{
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: see function contract
        let f = unsafe { &mut *data.cast::<F>() };
        f();
    }));
    if result.is_err() {
        tracing::error!("Rollback handler panicked");
    }
}

/// # Safety
/// `data` must point to a live `F` owned by `Hooks::update`; the name
/// pointers must be null or NUL-terminated.
unsafe extern "C" fn update_trampoline<F>(
    data: *mut c_void,
    action: c_int,
    database: *const c_char,
    table: *const c_char,
    rowid: ffi::sqlite3_int64,
) where
    F: FnMut(RowChange<'_>),
{
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: see function contract
        let f = unsafe { &mut *data.cast::<F>() };
        // SAFETY: the engine passes NUL-terminated names valid for this call
        let (database, table) =
            unsafe { (ffi::cstr_to_str(database), ffi::cstr_to_str(table)) };
        f(RowChange {
            action: UpdateAction::from_code(action),
            database: database.unwrap_or(""),
            table: table.unwrap_or(""),
            rowid,
        });
    }));
    if result.is_err() {
        tracing::error!("Update handler panicked");
    }
}

/// # Safety
/// `data` must point to a live `F` owned by `Hooks::authorize`; the string
/// pointers must be null or NUL-terminated.
unsafe extern "C" fn authorize_trampoline<F>(
    data: *mut c_void,
    action: c_int,
    arg1: *const c_char,
    arg2: *const c_char,
    database: *const c_char,
    trigger_or_view: *const c_char,
) -> c_int
where
    F: FnMut(AuthRequest<'_>) -> Authorization,
{
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: see function contract
        let f = unsafe { &mut *data.cast::<F>() };
        // SAFETY: the engine passes NUL-terminated strings valid for this call
        let request = unsafe {
            AuthRequest {
                action,
                arg1: ffi::cstr_to_str(arg1),
                arg2: ffi::cstr_to_str(arg2),
                database: ffi::cstr_to_str(database),
                trigger_or_view: ffi::cstr_to_str(trigger_or_view),
            }
        };
        f(request)
    }));
    match result {
        Ok(verdict) => verdict.to_code(),
        Err(_) => {
            tracing::error!(action, "Authorize handler panicked; denying");
            ffi::SQLITE_DENY
        }
    }
}
