//! The call context handed to user-defined functions.

#![allow(clippy::cast_possible_truncation)]

use std::any::Any;
use std::ffi::{c_char, c_int};
use std::mem;
use std::ptr;

use crate::ffi;
use crate::types::{ColumnType, FromSql, Lifetime, RawValue, ToSql, ValueRef, result_value_ref};

/// Per-group aggregate state, boxed so the engine's zeroed scratch slot only
/// ever holds one thin pointer.
type StateBox = Box<dyn Any>;

/// The arguments and result slot of one function call.
///
/// Argument reads follow the same rules as column reads: out-of-range
/// indices and NULL read as zero values.
pub struct Context<'a> {
    ctx: *mut ffi::sqlite3_context,
    args: &'a [*mut ffi::sqlite3_value],
    aggregate: bool,
}

impl<'a> Context<'a> {
    /// # Safety
    /// `ctx` must be the live context of the current call and `argv` must
    /// point to `argc` protected values that outlive `'a`.
    pub(crate) unsafe fn new(
        ctx: *mut ffi::sqlite3_context,
        argc: c_int,
        argv: *mut *mut ffi::sqlite3_value,
        aggregate: bool,
    ) -> Self {
        let args = if argv.is_null() || argc <= 0 {
            &[][..]
        } else {
            // SAFETY: the engine passes argc valid value pointers
            unsafe { std::slice::from_raw_parts(argv, argc as usize) }
        };
        Self {
            ctx,
            args,
            aggregate,
        }
    }

    /// Number of arguments passed to this call.
    pub fn argument_count(&self) -> usize {
        self.args.len()
    }

    /// Argument `index` as an unconverted value.
    pub fn raw(&self, index: usize) -> RawValue<'a> {
        match self.args.get(index) {
            // SAFETY: argument values are protected for the whole call
            Some(&value) => unsafe { RawValue::argument(value) },
            None => RawValue::missing(),
        }
    }

    /// Storage class of argument `index`.
    pub fn value_type(&self, index: usize) -> ColumnType {
        self.raw(index).value_type()
    }

    /// Read argument `index` as `T`.
    pub fn get<T: FromSql<'a>>(&self, index: usize) -> T {
        T::from_sql(self.raw(index))
    }

    /// Return a copy of `value`.
    pub fn result<T: ToSql + ?Sized>(&mut self, value: &T) {
        // SAFETY: ctx is live for the call; Transient makes the engine copy
        unsafe { result_value_ref(self.ctx, value.to_sql(), Lifetime::Transient) }
    }

    /// Return static text without copying it.
    pub fn result_static_text(&mut self, text: &'static str) {
        // SAFETY: the text lives forever
        unsafe { result_value_ref(self.ctx, ValueRef::Text(text), Lifetime::Static) }
    }

    /// Return a static blob without copying it.
    pub fn result_static_blob(&mut self, blob: &'static [u8]) {
        // SAFETY: the blob lives forever
        unsafe { result_value_ref(self.ctx, ValueRef::Blob(blob), Lifetime::Static) }
    }

    /// Return argument `index` unchanged, or NULL if there is no such argument.
    pub fn result_copy(&mut self, index: usize) {
        match self.args.get(index) {
            // SAFETY: ctx and the argument are live for the call
            Some(&value) => unsafe { ffi::sqlite3_result_value(self.ctx, value) },
            None => self.result_null(),
        }
    }

    /// Return NULL.
    pub fn result_null(&mut self) {
        // SAFETY: ctx is live for the call
        unsafe { ffi::sqlite3_result_null(self.ctx) }
    }

    /// Fail the call; the statement running it stops with `message`.
    pub fn result_error(&mut self, message: &str) {
        // SAFETY: ctx is live; the engine copies the message
        unsafe { set_error(self.ctx, message) }
    }

    /// The state of the current aggregate group, created with
    /// `T::default()` on first use.
    ///
    /// Returns `None` outside an aggregate, when the group already holds
    /// state of another type, or when the engine is out of memory.
    pub fn aggregate_state<T: Default + 'static>(&mut self) -> Option<&mut T> {
        let slot = self.state_slot(mem::size_of::<*mut StateBox>())?;
        // SAFETY: slot points into the engine's zeroed, pointer-aligned
        // scratch area for this group, which only this module writes
        unsafe {
            if (*slot).is_null() {
                let state: StateBox = Box::new(T::default());
                *slot = Box::into_raw(Box::new(state));
            }
            (**slot).downcast_mut::<T>()
        }
    }

    /// Move the state of the current aggregate group out, leaving the group
    /// empty. `None` if no state of type `T` was ever created.
    pub fn take_aggregate_state<T: 'static>(&mut self) -> Option<T> {
        self.take_state()?.downcast::<T>().ok().map(|state| *state)
    }

    pub(crate) fn take_state(&mut self) -> Option<StateBox> {
        // a zero-byte request does not allocate for groups that never stepped
        let slot = self.state_slot(0)?;
        // SAFETY: see aggregate_state
        unsafe {
            let state = mem::replace(&mut *slot, ptr::null_mut());
            if state.is_null() {
                None
            } else {
                Some(*Box::from_raw(state))
            }
        }
    }

    fn state_slot(&mut self, bytes: usize) -> Option<*mut *mut StateBox> {
        if !self.aggregate {
            return None;
        }
        // SAFETY: ctx belongs to an aggregate call
        let slot = unsafe { ffi::sqlite3_aggregate_context(self.ctx, bytes as c_int) };
        if slot.is_null() {
            None
        } else {
            Some(slot.cast::<*mut StateBox>())
        }
    }

    /// The raw engine context.
    pub fn handle(&self) -> *mut ffi::sqlite3_context {
        self.ctx
    }

    /// The connection running this call.
    ///
    /// Wrap it with [`Connection::borrow_raw`](crate::Connection::borrow_raw)
    /// to run statements from inside the function.
    pub fn db_handle(&self) -> *mut ffi::sqlite3 {
        // SAFETY: ctx is live for the call
        unsafe { ffi::sqlite3_context_db_handle(self.ctx) }
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("argument_count", &self.args.len())
            .field("aggregate", &self.aggregate)
            .finish_non_exhaustive()
    }
}

/// Report `message` as the result of the call.
///
/// # Safety
/// `ctx` must be the live context of the current call.
pub(crate) unsafe fn set_error(ctx: *mut ffi::sqlite3_context, message: &str) {
    let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
    // SAFETY: ctx is live; the engine copies at most len bytes
    unsafe { ffi::sqlite3_result_error(ctx, message.as_ptr().cast::<c_char>(), len) }
}
