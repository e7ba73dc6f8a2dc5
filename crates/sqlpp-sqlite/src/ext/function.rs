//! Typed scalar functions.
//!
//! Any `Fn(A1, .., An) -> R` with up to eight arguments can be registered.
//! Arguments are read with [`FromSql`] and the return value is written with
//! [`FunctionOutput`]:
//!
//! ```rust,ignore
//! conn.create_function("plus", |a: i32, b: i32| a + b).check(&conn)?;
//! conn.create_function("greet", |name: String| format!("hello, {name}")).check(&conn)?;
//! ```

use std::ffi::c_int;
use std::fmt::Display;

use sqlpp_core::Value;

use super::context::Context;
use crate::types::{FromSql, Null};

/// A tuple of owned function arguments.
pub trait FunctionArgs: Sized {
    /// Number of arguments the engine must pass.
    const ARITY: c_int;

    fn from_context(ctx: &Context<'_>) -> Self;
}

/// A value a function can return.
pub trait FunctionOutput {
    fn set_result(self, ctx: &mut Context<'_>);
}

/// Callables registrable with [`create_function`](crate::Connection::create_function).
///
/// Implemented for every `Fn(A1, .., An) -> R` where each `Ai` reads with
/// [`FromSql`] and `R` is a [`FunctionOutput`].
pub trait ScalarFunction<Args>: Send + 'static {
    /// Number of arguments the function takes.
    const ARITY: c_int;

    fn invoke(&self, ctx: &mut Context<'_>);
}

macro_rules! impl_function_args {
    ($n:literal; $($A:ident $i:tt),*) => {
        impl<$($A),*> FunctionArgs for ($($A,)*)
        where
            $($A: for<'a> FromSql<'a>,)*
        {
            const ARITY: c_int = $n;

            #[allow(unused_variables)]
            fn from_context(ctx: &Context<'_>) -> Self {
                ($(ctx.get::<$A>($i),)*)
            }
        }

        impl<Func, R, $($A),*> ScalarFunction<($($A,)*)> for Func
        where
            Func: Fn($($A),*) -> R + Send + 'static,
            R: FunctionOutput,
            $($A: for<'a> FromSql<'a>,)*
        {
            const ARITY: c_int = $n;

            #[allow(non_snake_case)]
            fn invoke(&self, ctx: &mut Context<'_>) {
                let ($($A,)*) = <($($A,)*) as FunctionArgs>::from_context(ctx);
                (self)($($A),*).set_result(ctx);
            }
        }
    };
}

impl_function_args!(0;);
impl_function_args!(1; A 0);
impl_function_args!(2; A 0, B 1);
impl_function_args!(3; A 0, B 1, C 2);
impl_function_args!(4; A 0, B 1, C 2, D 3);
impl_function_args!(5; A 0, B 1, C 2, D 3, E 4);
impl_function_args!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_function_args!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_function_args!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

macro_rules! impl_output_by_copy {
    ($($t:ty),*) => {
        $(
            impl FunctionOutput for $t {
                fn set_result(self, ctx: &mut Context<'_>) {
                    ctx.result(&self);
                }
            }
        )*
    };
}

impl_output_by_copy!(i32, u32, i64, f64, bool, String, Vec<u8>, Value, Null);

impl FunctionOutput for () {
    fn set_result(self, ctx: &mut Context<'_>) {
        ctx.result_null();
    }
}

impl FunctionOutput for &'static str {
    fn set_result(self, ctx: &mut Context<'_>) {
        ctx.result_static_text(self);
    }
}

impl FunctionOutput for &'static [u8] {
    fn set_result(self, ctx: &mut Context<'_>) {
        ctx.result_static_blob(self);
    }
}

impl<T: FunctionOutput> FunctionOutput for Option<T> {
    fn set_result(self, ctx: &mut Context<'_>) {
        match self {
            Some(value) => value.set_result(ctx),
            None => ctx.result_null(),
        }
    }
}

impl<T: FunctionOutput, E: Display> FunctionOutput for Result<T, E> {
    fn set_result(self, ctx: &mut Context<'_>) {
        match self {
            Ok(value) => value.set_result(ctx),
            Err(err) => ctx.result_error(&err.to_string()),
        }
    }
}
