//! Stepping aggregates.
//!
//! An aggregate is a `Default` state that is fed one row at a time and then
//! turned into a result. The engine keeps one state per group; it is created
//! on the group's first row and consumed by `finish`.
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct Sum(i64);
//!
//! impl Aggregate<(i64,)> for Sum {
//!     type Output = i64;
//!     fn step(&mut self, (value,): (i64,)) {
//!         self.0 += value;
//!     }
//!     fn finish(self) -> i64 {
//!         self.0
//!     }
//! }
//!
//! conn.create_aggregate::<Sum, (i64,)>("mysum").check(&conn)?;
//! ```

use std::ffi::c_int;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::context::{Context, set_error};
use super::function::{FunctionArgs, FunctionOutput};
use super::{panic_message, user_data};
use crate::ffi;

/// A user-defined aggregate over rows of type `Args`.
///
/// A group with no rows finishes a `Default` state.
pub trait Aggregate<Args>: Default + 'static {
    type Output: FunctionOutput;

    fn step(&mut self, args: Args);

    fn finish(self) -> Self::Output;
}

/// What the engine keeps as user data for a typed aggregate.
pub(crate) struct AggregateData {
    pub(crate) name: String,
}

/// What the engine keeps as user data for a raw aggregate.
pub(crate) struct RawAggregateData<S, F> {
    pub(crate) name: String,
    pub(crate) step: S,
    pub(crate) finish: F,
}

pub(crate) unsafe extern "C" fn aggregate_step<A, Args>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) where
    A: Aggregate<Args>,
    Args: FunctionArgs,
{
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: called by the engine with a live context and argc arguments
        let mut context = unsafe { Context::new(ctx, argc, argv, true) };
        let args = Args::from_context(&context);
        match context.aggregate_state::<A>() {
            Some(state) => state.step(args),
            None => context.result_error("aggregate state unavailable"),
        }
    }));
    if let Err(payload) = result {
        // SAFETY: user data was installed as AggregateData
        let name = unsafe { user_data::<AggregateData>(ctx) }.map_or("?", |d| d.name.as_str());
        report_panic(ctx, name, "step", payload.as_ref());
    }
}

pub(crate) unsafe extern "C" fn aggregate_final<A, Args>(ctx: *mut ffi::sqlite3_context)
where
    A: Aggregate<Args>,
    Args: FunctionArgs,
{
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: called by the engine with a live context
        let mut context = unsafe { Context::new(ctx, 0, std::ptr::null_mut(), true) };
        let state = context.take_aggregate_state::<A>().unwrap_or_default();
        state.finish().set_result(&mut context);
    }));
    if let Err(payload) = result {
        // SAFETY: user data was installed as AggregateData
        let name = unsafe { user_data::<AggregateData>(ctx) }.map_or("?", |d| d.name.as_str());
        report_panic(ctx, name, "finish", payload.as_ref());
    }
}

pub(crate) unsafe extern "C" fn raw_aggregate_step<S, F>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) where
    S: Fn(&mut Context<'_>) + Send + 'static,
    F: Fn(&mut Context<'_>) + Send + 'static,
{
    // SAFETY: user data was installed as RawAggregateData<S, F>
    let Some(data) = (unsafe { user_data::<RawAggregateData<S, F>>(ctx) }) else {
        // SAFETY: ctx is live
        unsafe { set_error(ctx, "missing aggregate user data") };
        return;
    };
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: called by the engine with a live context and argc arguments
        let mut context = unsafe { Context::new(ctx, argc, argv, true) };
        (data.step)(&mut context);
    }));
    if let Err(payload) = result {
        report_panic(ctx, &data.name, "step", payload.as_ref());
    }
}

pub(crate) unsafe extern "C" fn raw_aggregate_final<S, F>(ctx: *mut ffi::sqlite3_context)
where
    S: Fn(&mut Context<'_>) + Send + 'static,
    F: Fn(&mut Context<'_>) + Send + 'static,
{
    // SAFETY: user data was installed as RawAggregateData<S, F>
    let Some(data) = (unsafe { user_data::<RawAggregateData<S, F>>(ctx) }) else {
        // SAFETY: ctx is live
        unsafe { set_error(ctx, "missing aggregate user data") };
        return;
    };
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: called by the engine with a live context
        let mut context = unsafe { Context::new(ctx, 0, std::ptr::null_mut(), true) };
        (data.finish)(&mut context);
    }));
    if let Err(payload) = result {
        report_panic(ctx, &data.name, "finish", payload.as_ref());
    }
    // state the callback did not take is dropped with the group
    let leftover = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: ctx is still the live context of this call
        let mut context = unsafe { Context::new(ctx, 0, std::ptr::null_mut(), true) };
        drop(context.take_state());
    }));
    if leftover.is_err() {
        tracing::error!(function = %data.name, "Aggregate state panicked while dropping");
    }
}

fn report_panic(
    ctx: *mut ffi::sqlite3_context,
    name: &str,
    phase: &str,
    payload: &(dyn std::any::Any + Send),
) {
    let detail = panic_message(payload);
    tracing::error!(function = name, phase, panic = %detail, "Aggregate panicked");
    let message = format!("aggregate `{name}` panicked in {phase}: {detail}");
    // SAFETY: ctx is the live context of the current call
    unsafe { set_error(ctx, &message) };
}
