//! Type encoding and decoding between Rust and SQLite.
//!
//! SQLite has a simple type system with 5 storage classes:
//! - INTEGER: Signed integer (1, 2, 3, 4, 6, or 8 bytes)
//! - REAL: 8-byte IEEE floating point
//! - TEXT: UTF-8 or UTF-16 string
//! - BLOB: Binary data
//! - NULL: The NULL value
//!
//! Writing goes through [`ToSql`], which lowers a Rust value to a borrowed
//! [`ValueRef`]; the same lowering feeds statement parameters and function
//! results. Reading goes through [`FromSql`], which lifts a [`RawValue`]
//! (either a result column or a function argument) into a Rust value. Reads
//! never fail: a NULL or out-of-range source yields the engine's zero value,
//! and `Option<T>` is the way to observe NULL.

#![allow(clippy::cast_possible_truncation)]

use std::ffi::{c_int, c_void};
use std::marker::PhantomData;

use sqlpp_core::Value;

use crate::ffi;

/// The storage class of a value as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Blob,
    Null,
}

impl ColumnType {
    pub(crate) fn from_code(code: c_int) -> Self {
        match code {
            ffi::SQLITE_INTEGER => ColumnType::Integer,
            ffi::SQLITE_FLOAT => ColumnType::Float,
            ffi::SQLITE_TEXT => ColumnType::Text,
            ffi::SQLITE_BLOB => ColumnType::Blob,
            _ => ColumnType::Null,
        }
    }
}

/// A borrowed value ready to be handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(&'a str),
    Blob(&'a [u8]),
}

impl ValueRef<'_> {
    /// Copy the referenced data into an owned [`Value`].
    pub fn to_owned_value(&self) -> Value {
        match *self {
            ValueRef::Null => Value::Null,
            ValueRef::Int(v) => Value::Int(v),
            ValueRef::BigInt(v) => Value::BigInt(v),
            ValueRef::Double(v) => Value::Double(v),
            ValueRef::Text(s) => Value::Text(s.to_string()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

/// Marker for binding or returning SQL NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Null;

/// Marker that skips a column without reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ignore;

/// Types that can be written to the engine.
pub trait ToSql {
    fn to_sql(&self) -> ValueRef<'_>;
}

impl ToSql for ValueRef<'_> {
    fn to_sql(&self) -> ValueRef<'_> {
        *self
    }
}

impl ToSql for Null {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Null
    }
}

impl ToSql for () {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Null
    }
}

impl ToSql for bool {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Int(i32::from(*self))
    }
}

impl ToSql for i32 {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Int(*self)
    }
}

impl ToSql for u32 {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::BigInt(i64::from(*self))
    }
}

impl ToSql for i64 {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::BigInt(*self)
    }
}

impl ToSql for f64 {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Double(*self)
    }
}

impl ToSql for str {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Text(self)
    }
}

impl ToSql for String {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Text(self)
    }
}

impl ToSql for [u8] {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Blob(self)
    }
}

impl ToSql for Vec<u8> {
    fn to_sql(&self) -> ValueRef<'_> {
        ValueRef::Blob(self)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> ValueRef<'_> {
        match self {
            Value::Null => ValueRef::Null,
            Value::Int(v) => ValueRef::Int(*v),
            Value::BigInt(v) => ValueRef::BigInt(*v),
            Value::Double(v) => ValueRef::Double(*v),
            Value::Text(s) => ValueRef::Text(s),
            Value::Blob(b) => ValueRef::Blob(b),
        }
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> ValueRef<'_> {
        match self {
            Some(v) => v.to_sql(),
            None => ValueRef::Null,
        }
    }
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn to_sql(&self) -> ValueRef<'_> {
        (**self).to_sql()
    }
}

/// How the engine should treat text and blob memory it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifetime {
    /// The engine copies the bytes before the call returns.
    Transient,
    /// The bytes outlive every use the engine makes of them.
    Static,
}

impl Lifetime {
    fn destructor(self) -> ffi::sqlite3_destructor_type {
        match self {
            Lifetime::Transient => ffi::SQLITE_TRANSIENT(),
            Lifetime::Static => ffi::SQLITE_STATIC(),
        }
    }
}

/// Bind `value` to the 1-based parameter `index`.
///
/// # Safety
/// `stmt` must be a live prepared statement. With `Lifetime::Static` the
/// text/blob memory must stay valid until it is rebound, cleared or the
/// statement is finalized.
pub(crate) unsafe fn bind_value_ref(
    stmt: *mut ffi::sqlite3_stmt,
    index: c_int,
    value: ValueRef<'_>,
    lifetime: Lifetime,
) -> c_int {
    // SAFETY: stmt is live per contract; pointers and lengths come from slices
    unsafe {
        match value {
            ValueRef::Null => ffi::sqlite3_bind_null(stmt, index),
            ValueRef::Int(v) => ffi::sqlite3_bind_int(stmt, index, v),
            ValueRef::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, v),
            ValueRef::Double(v) => ffi::sqlite3_bind_double(stmt, index, v),
            ValueRef::Text(s) => {
                let Ok(len) = c_int::try_from(s.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_text(stmt, index, s.as_ptr().cast(), len, lifetime.destructor())
            }
            ValueRef::Blob(b) => {
                let Ok(len) = c_int::try_from(b.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_blob(
                    stmt,
                    index,
                    b.as_ptr().cast::<c_void>(),
                    len,
                    lifetime.destructor(),
                )
            }
        }
    }
}

/// Store `value` as the result of a function call.
///
/// # Safety
/// `ctx` must be the live context of the current call. With
/// `Lifetime::Static` the memory must be `'static`.
pub(crate) unsafe fn result_value_ref(
    ctx: *mut ffi::sqlite3_context,
    value: ValueRef<'_>,
    lifetime: Lifetime,
) {
    // SAFETY: ctx is live per contract; pointers and lengths come from slices
    unsafe {
        match value {
            ValueRef::Null => ffi::sqlite3_result_null(ctx),
            ValueRef::Int(v) => ffi::sqlite3_result_int(ctx, v),
            ValueRef::BigInt(v) => ffi::sqlite3_result_int64(ctx, v),
            ValueRef::Double(v) => ffi::sqlite3_result_double(ctx, v),
            ValueRef::Text(s) => match c_int::try_from(s.len()) {
                Ok(len) => {
                    ffi::sqlite3_result_text(ctx, s.as_ptr().cast(), len, lifetime.destructor());
                }
                Err(_) => ffi::sqlite3_result_error_toobig(ctx),
            },
            ValueRef::Blob(b) => match c_int::try_from(b.len()) {
                Ok(len) => ffi::sqlite3_result_blob(
                    ctx,
                    b.as_ptr().cast::<c_void>(),
                    len,
                    lifetime.destructor(),
                ),
                Err(_) => ffi::sqlite3_result_error_toobig(ctx),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Column(*mut ffi::sqlite3_stmt, c_int),
    Argument(*mut ffi::sqlite3_value),
    Missing,
}

/// A value the engine is currently exposing: a result column of the row a
/// statement is positioned on, or an argument of a function call.
///
/// Borrowed data read through it is valid for `'a`, which never outlives the
/// row or the call.
#[derive(Debug, Clone, Copy)]
pub struct RawValue<'a> {
    source: Source,
    _marker: PhantomData<&'a ()>,
}

impl<'a> RawValue<'a> {
    /// # Safety
    /// `stmt` must be live and stay on the same row for `'a`.
    pub(crate) unsafe fn column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Self {
        Self {
            source: Source::Column(stmt, index),
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// `value` must be a protected function argument valid for `'a`.
    pub(crate) unsafe fn argument(value: *mut ffi::sqlite3_value) -> Self {
        Self {
            source: Source::Argument(value),
            _marker: PhantomData,
        }
    }

    /// A value that reads as NULL, used for absent function arguments.
    pub(crate) fn missing() -> Self {
        Self {
            source: Source::Missing,
            _marker: PhantomData,
        }
    }

    /// The storage class of the value.
    pub fn value_type(&self) -> ColumnType {
        // SAFETY: sources are live for 'a per constructor contracts
        let code = unsafe {
            match self.source {
                Source::Column(stmt, i) => ffi::sqlite3_column_type(stmt, i),
                Source::Argument(v) => ffi::sqlite3_value_type(v),
                Source::Missing => ffi::SQLITE_NULL,
            }
        };
        ColumnType::from_code(code)
    }

    pub fn is_null(&self) -> bool {
        self.value_type() == ColumnType::Null
    }

    pub fn as_i32(&self) -> i32 {
        // SAFETY: see value_type
        unsafe {
            match self.source {
                Source::Column(stmt, i) => ffi::sqlite3_column_int(stmt, i),
                Source::Argument(v) => ffi::sqlite3_value_int(v),
                Source::Missing => 0,
            }
        }
    }

    pub fn as_i64(&self) -> i64 {
        // SAFETY: see value_type
        unsafe {
            match self.source {
                Source::Column(stmt, i) => ffi::sqlite3_column_int64(stmt, i),
                Source::Argument(v) => ffi::sqlite3_value_int64(v),
                Source::Missing => 0,
            }
        }
    }

    pub fn as_f64(&self) -> f64 {
        // SAFETY: see value_type
        unsafe {
            match self.source {
                Source::Column(stmt, i) => ffi::sqlite3_column_double(stmt, i),
                Source::Argument(v) => ffi::sqlite3_value_double(v),
                Source::Missing => 0.0,
            }
        }
    }

    /// The value's UTF-8 text bytes, or `None` for NULL.
    pub fn as_text_bytes(&self) -> Option<&'a [u8]> {
        // SAFETY: the pointer/length pair stays valid until the row moves or
        // the call returns, both of which end 'a
        unsafe {
            let (ptr, len) = match self.source {
                Source::Column(stmt, i) => {
                    let ptr = ffi::sqlite3_column_text(stmt, i);
                    (ptr, ffi::sqlite3_column_bytes(stmt, i))
                }
                Source::Argument(v) => {
                    let ptr = ffi::sqlite3_value_text(v);
                    (ptr, ffi::sqlite3_value_bytes(v))
                }
                Source::Missing => return None,
            };
            if ptr.is_null() {
                None
            } else {
                Some(std::slice::from_raw_parts(ptr, len.max(0) as usize))
            }
        }
    }

    /// The value's text, or `None` for NULL or invalid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        self.as_text_bytes()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// The value's bytes, or `None` for NULL.
    pub fn as_blob(&self) -> Option<&'a [u8]> {
        if self.is_null() {
            return None;
        }
        // SAFETY: see as_text_bytes
        unsafe {
            let (ptr, len) = match self.source {
                Source::Column(stmt, i) => {
                    let ptr = ffi::sqlite3_column_blob(stmt, i);
                    (ptr, ffi::sqlite3_column_bytes(stmt, i))
                }
                Source::Argument(v) => {
                    let ptr = ffi::sqlite3_value_blob(v);
                    (ptr, ffi::sqlite3_value_bytes(v))
                }
                Source::Missing => return None,
            };
            if ptr.is_null() || len <= 0 {
                Some(&[])
            } else {
                Some(std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize))
            }
        }
    }

    /// Size in bytes of the text or blob representation.
    pub fn bytes(&self) -> i32 {
        // SAFETY: see value_type
        unsafe {
            match self.source {
                Source::Column(stmt, i) => ffi::sqlite3_column_bytes(stmt, i),
                Source::Argument(v) => ffi::sqlite3_value_bytes(v),
                Source::Missing => 0,
            }
        }
    }

    /// Copy the value out with its storage class preserved.
    pub fn to_value(&self) -> Value {
        match self.value_type() {
            ColumnType::Null => Value::Null,
            ColumnType::Integer => Value::BigInt(self.as_i64()),
            ColumnType::Float => Value::Double(self.as_f64()),
            ColumnType::Text => Value::Text(
                self.as_text_bytes()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default(),
            ),
            ColumnType::Blob => Value::Blob(self.as_blob().map(<[u8]>::to_vec).unwrap_or_default()),
        }
    }
}

/// Types that can be read from a column or a function argument.
pub trait FromSql<'a>: Sized {
    fn from_sql(value: RawValue<'a>) -> Self;
}

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(value: RawValue<'a>) -> Self {
        value
    }
}

impl FromSql<'_> for Ignore {
    fn from_sql(_: RawValue<'_>) -> Self {
        Ignore
    }
}

impl FromSql<'_> for i32 {
    fn from_sql(value: RawValue<'_>) -> Self {
        value.as_i32()
    }
}

impl FromSql<'_> for i64 {
    fn from_sql(value: RawValue<'_>) -> Self {
        value.as_i64()
    }
}

impl FromSql<'_> for f64 {
    fn from_sql(value: RawValue<'_>) -> Self {
        value.as_f64()
    }
}

impl FromSql<'_> for bool {
    fn from_sql(value: RawValue<'_>) -> Self {
        value.as_i64() != 0
    }
}

impl<'a> FromSql<'a> for &'a str {
    fn from_sql(value: RawValue<'a>) -> Self {
        value.as_str().unwrap_or("")
    }
}

impl FromSql<'_> for String {
    fn from_sql(value: RawValue<'_>) -> Self {
        value
            .as_text_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

impl<'a> FromSql<'a> for &'a [u8] {
    fn from_sql(value: RawValue<'a>) -> Self {
        value.as_blob().unwrap_or(&[])
    }
}

impl FromSql<'_> for Vec<u8> {
    fn from_sql(value: RawValue<'_>) -> Self {
        value.as_blob().map(<[u8]>::to_vec).unwrap_or_default()
    }
}

impl FromSql<'_> for Value {
    fn from_sql(value: RawValue<'_>) -> Self {
        value.to_value()
    }
}

impl<'a, T: FromSql<'a>> FromSql<'a> for Option<T> {
    fn from_sql(value: RawValue<'a>) -> Self {
        if value.is_null() {
            None
        } else {
            Some(T::from_sql(value))
        }
    }
}
