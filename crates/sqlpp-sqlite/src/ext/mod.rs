//! User-defined SQL functions and aggregates.
//!
//! Registration boxes the user callable and hands it to the engine as the
//! function's user data together with a destructor, so the engine owns it
//! until the function is replaced, removed or the connection closes. Every
//! entry point from the engine runs under `catch_unwind`: a panic becomes an
//! error result for that call and is logged.

mod aggregate;
mod context;
mod function;

pub use aggregate::Aggregate;
pub use context::Context;
pub use function::{FunctionArgs, FunctionOutput, ScalarFunction};

use std::any::Any;
use std::ffi::{CString, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use aggregate::{
    AggregateData, RawAggregateData, aggregate_final, aggregate_step, raw_aggregate_final,
    raw_aggregate_step,
};
use context::set_error;

use crate::connection::Connection;
use crate::ffi;
use crate::status::Status;

/// What the engine keeps as user data for a scalar function.
struct FunctionData<F> {
    name: String,
    call: F,
}

impl Connection {
    /// Register a typed scalar function; its arity is the closure's.
    ///
    /// Registering the same name and arity again replaces the previous
    /// function.
    pub fn create_function<Args, F>(&self, name: &str, f: F) -> Status
    where
        F: ScalarFunction<Args>,
    {
        self.create_function_raw(name, F::ARITY, move |ctx: &mut Context<'_>| f.invoke(ctx))
    }

    /// Register a scalar function working directly on the call context.
    ///
    /// An `arity` of -1 accepts any number of arguments.
    pub fn create_function_raw<F>(&self, name: &str, arity: c_int, f: F) -> Status
    where
        F: Fn(&mut Context<'_>) + Send + 'static,
    {
        let Some(c_name) = self.function_name(name) else {
            return Status::MISUSE;
        };
        let data = Box::into_raw(Box::new(FunctionData {
            name: name.to_string(),
            call: f,
        }));
        // SAFETY: db is live; on failure the engine still runs the destructor
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                self.handle(),
                c_name.as_ptr(),
                arity,
                ffi::SQLITE_UTF8,
                data.cast::<c_void>(),
                Some(call_function::<F>),
                None,
                None,
                Some(destroy_boxed::<FunctionData<F>>),
            )
        };
        self.registered(name, arity, rc)
    }

    /// Register a typed aggregate; its arity is the length of `Args`.
    pub fn create_aggregate<A, Args>(&self, name: &str) -> Status
    where
        A: Aggregate<Args>,
        Args: FunctionArgs,
    {
        let Some(c_name) = self.function_name(name) else {
            return Status::MISUSE;
        };
        let data = Box::into_raw(Box::new(AggregateData {
            name: name.to_string(),
        }));
        // SAFETY: db is live; on failure the engine still runs the destructor
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                self.handle(),
                c_name.as_ptr(),
                Args::ARITY,
                ffi::SQLITE_UTF8,
                data.cast::<c_void>(),
                None,
                Some(aggregate_step::<A, Args>),
                Some(aggregate_final::<A, Args>),
                Some(destroy_boxed::<AggregateData>),
            )
        };
        self.registered(name, Args::ARITY, rc)
    }

    /// Register an aggregate from a step and a finish callback working on the
    /// call context. Per-group state is kept with
    /// [`Context::aggregate_state`] and read back with
    /// [`Context::take_aggregate_state`].
    pub fn create_aggregate_raw<S, F>(&self, name: &str, arity: c_int, step: S, finish: F) -> Status
    where
        S: Fn(&mut Context<'_>) + Send + 'static,
        F: Fn(&mut Context<'_>) + Send + 'static,
    {
        let Some(c_name) = self.function_name(name) else {
            return Status::MISUSE;
        };
        let data = Box::into_raw(Box::new(RawAggregateData {
            name: name.to_string(),
            step,
            finish,
        }));
        // SAFETY: db is live; on failure the engine still runs the destructor
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                self.handle(),
                c_name.as_ptr(),
                arity,
                ffi::SQLITE_UTF8,
                data.cast::<c_void>(),
                None,
                Some(raw_aggregate_step::<S, F>),
                Some(raw_aggregate_final::<S, F>),
                Some(destroy_boxed::<RawAggregateData<S, F>>),
            )
        };
        self.registered(name, arity, rc)
    }

    /// Remove the function or aggregate registered as `name` with `arity`.
    pub fn remove_function(&self, name: &str, arity: c_int) -> Status {
        let Some(c_name) = self.function_name(name) else {
            return Status::MISUSE;
        };
        // SAFETY: db is live; null callbacks delete the function
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                self.handle(),
                c_name.as_ptr(),
                arity,
                ffi::SQLITE_UTF8,
                ptr::null_mut(),
                None,
                None,
                None,
                None,
            )
        };
        let status = Status::from_code(rc);
        tracing::debug!(name, arity, %status, "Removed function");
        status
    }

    fn function_name(&self, name: &str) -> Option<CString> {
        if !self.is_connected() {
            return None;
        }
        CString::new(name).ok()
    }

    fn registered(&self, name: &str, arity: c_int, rc: c_int) -> Status {
        let status = Status::from_code(rc);
        if status.is_ok() {
            tracing::debug!(name, arity, "Registered function");
        } else {
            tracing::debug!(name, arity, error = %self.error_msg(), "Function registration failed");
        }
        status
    }
}

/// The user data of the current call, if any.
///
/// # Safety
/// The function must have been registered with a `T` as user data.
pub(crate) unsafe fn user_data<'a, T>(ctx: *mut ffi::sqlite3_context) -> Option<&'a T> {
    // SAFETY: ctx is live; the pointer was created from Box<T>
    unsafe { ffi::sqlite3_user_data(ctx).cast::<T>().as_ref() }
}

/// Destructor handed to the engine for boxed user data.
unsafe extern "C" fn destroy_boxed<T>(data: *mut c_void) {
    if !data.is_null() {
        // SAFETY: data came from Box::<T>::into_raw and is freed exactly once
        drop(unsafe { Box::from_raw(data.cast::<T>()) });
    }
}

unsafe extern "C" fn call_function<F>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) where
    F: Fn(&mut Context<'_>) + Send + 'static,
{
    // SAFETY: registered with FunctionData<F> as user data
    let Some(data) = (unsafe { user_data::<FunctionData<F>>(ctx) }) else {
        // SAFETY: ctx is live
        unsafe { set_error(ctx, "missing function user data") };
        return;
    };
    let result = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: called by the engine with a live context and argc arguments
        let mut context = unsafe { Context::new(ctx, argc, argv, false) };
        (data.call)(&mut context);
    }));
    if let Err(payload) = result {
        let detail = panic_message(payload.as_ref());
        tracing::error!(function = %data.name, panic = %detail, "Function panicked");
        // SAFETY: ctx is live
        unsafe { set_error(ctx, &format!("function `{}` panicked: {}", data.name, detail)) };
    }
}

/// The text of a panic payload, when it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;

    fn scalar(conn: &Connection, sql: &str) -> Result<i64, sqlpp_core::Error> {
        let mut q = Query::new(conn, sql)?;
        let n = q.begin()?.current().map_or(-1, |r| r.get(0));
        Ok(n)
    }

    #[derive(Default)]
    struct Sum(i64);

    impl Aggregate<(i64,)> for Sum {
        type Output = i64;

        fn step(&mut self, (value,): (i64,)) {
            self.0 += value;
        }

        fn finish(self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_typed_function() {
        let conn = Connection::open_memory().unwrap();
        assert!(conn.create_function("plus", |a: i32, b: i32| a + b).is_ok());
        assert_eq!(scalar(&conn, "SELECT plus(2, 3)").unwrap(), 5);
    }

    #[test]
    fn test_arity_is_enforced() {
        let conn = Connection::open_memory().unwrap();
        assert!(conn.create_function("plus", |a: i32, b: i32| a + b).is_ok());
        let err = scalar(&conn, "SELECT plus(1)").unwrap_err();
        assert!(err.to_string().contains("wrong number of arguments"));
    }

    #[test]
    fn test_zero_arity_and_static_text() {
        let conn = Connection::open_memory().unwrap();
        assert!(conn.create_function("hello", || "hello world").is_ok());
        let mut q = Query::new(&conn, "SELECT hello()").unwrap();
        let cursor = q.begin().unwrap();
        assert_eq!(cursor.current().map(|r| r.get::<String>(0)).as_deref(), Some("hello world"));
    }

    #[test]
    fn test_result_error() {
        let conn = Connection::open_memory().unwrap();
        let status = conn.create_function("checked", |v: i64| {
            if v < 0 { Err("negative input") } else { Ok(v * 2) }
        });
        assert!(status.is_ok());
        assert_eq!(scalar(&conn, "SELECT checked(4)").unwrap(), 8);
        let err = scalar(&conn, "SELECT checked(-1)").unwrap_err();
        assert!(err.to_string().contains("negative input"));
    }

    #[test]
    fn test_panic_becomes_error() {
        let conn = Connection::open_memory().unwrap();
        assert!(
            conn.create_function("boom", |_: i64| -> i64 { panic!("kaboom") })
                .is_ok()
        );
        let err = scalar(&conn, "SELECT boom(1)").unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        // the connection is still usable
        assert_eq!(scalar(&conn, "SELECT 7").unwrap(), 7);
    }

    #[test]
    fn test_raw_function() {
        let conn = Connection::open_memory().unwrap();
        let status = conn.create_function_raw("first_non_null", -1, |ctx| {
            for i in 0..ctx.argument_count() {
                if ctx.value_type(i) != crate::types::ColumnType::Null {
                    ctx.result_copy(i);
                    return;
                }
            }
            ctx.result_null();
        });
        assert!(status.is_ok());
        assert_eq!(scalar(&conn, "SELECT first_non_null(NULL, NULL, 9, 10)").unwrap(), 9);
        assert_eq!(scalar(&conn, "SELECT first_non_null() IS NULL").unwrap(), 1);
    }

    #[test]
    fn test_typed_aggregate() {
        let conn = Connection::open_memory().unwrap();
        assert!(conn.create_aggregate::<Sum, (i64,)>("mysum").is_ok());
        assert!(
            conn.execute("CREATE TABLE t (g TEXT, v INTEGER); INSERT INTO t VALUES ('a', 10), ('a', 20), ('b', 30);")
                .is_ok()
        );
        assert_eq!(scalar(&conn, "SELECT mysum(v) FROM t").unwrap(), 60);
        assert_eq!(scalar(&conn, "SELECT mysum(v) FROM t WHERE v > 100").unwrap(), 0);

        let mut q = Query::new(&conn, "SELECT g, mysum(v) FROM t GROUP BY g ORDER BY g").unwrap();
        let groups: Vec<(String, i64)> = q
            .map_rows(|row| row.get_columns::<(String, i64)>([0, 1]))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(groups, vec![("a".to_string(), 30), ("b".to_string(), 30)]);
    }

    #[test]
    fn test_raw_aggregate() {
        let conn = Connection::open_memory().unwrap();
        let status = conn.create_aggregate_raw(
            "count_text",
            1,
            |ctx| {
                let is_text = ctx.value_type(0) == crate::types::ColumnType::Text;
                if let Some(n) = ctx.aggregate_state::<i64>() {
                    *n += i64::from(is_text);
                }
            },
            |ctx| {
                let n = ctx.take_aggregate_state::<i64>().unwrap_or(0);
                ctx.result(&n);
            },
        );
        assert!(status.is_ok());
        assert_eq!(
            scalar(&conn, "SELECT count_text(x) FROM (SELECT 'a' AS x UNION ALL SELECT 1 UNION ALL SELECT 'b')")
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_remove_function() {
        let conn = Connection::open_memory().unwrap();
        assert!(conn.create_function("one", || 1_i32).is_ok());
        assert_eq!(scalar(&conn, "SELECT one()").unwrap(), 1);
        assert!(conn.remove_function("one", 0).is_ok());
        let err = scalar(&conn, "SELECT one()").unwrap_err();
        assert!(err.to_string().contains("no such function"));
    }

    #[test]
    fn test_replacing_function_frees_previous() {
        let conn = Connection::open_memory().unwrap();
        let held = std::sync::Arc::new(());
        let captured = std::sync::Arc::clone(&held);
        assert!(
            conn.create_function("f", move || {
                let _keep = &captured;
                1_i32
            })
            .is_ok()
        );
        assert_eq!(std::sync::Arc::strong_count(&held), 2);
        assert!(conn.create_function("f", || 2_i32).is_ok());
        assert_eq!(std::sync::Arc::strong_count(&held), 1);
        assert_eq!(scalar(&conn, "SELECT f()").unwrap(), 2);
    }

    #[test]
    fn test_registration_on_closed_connection() {
        let conn = Connection::new();
        assert_eq!(conn.create_function("f", || 1_i32), Status::MISUSE);
        assert_eq!(conn.remove_function("f", 0), Status::MISUSE);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
