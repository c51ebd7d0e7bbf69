//! Runtime member values.
//!
//! [`Value`] is what member accessors hand to the engine and what modifiers
//! rewrite. Primitive variants are compared by value; [`Value::List`] and
//! [`Value::Model`] are shared handles and are the only reference-trackable kinds.
//!
//! ```rust
//! use serde_graph::{Number, Value};
//!
//! let count = Value::from(3);
//! assert_eq!(count.as_i64(), Some(3));
//!
//! let list = Value::list(vec![Value::from(1), Value::from(2)]);
//! assert!(list.is_trackable());
//! assert_eq!(Value::from(1.5), Value::Number(Number::Float(1.5)));
//! ```

use crate::{Error, Model, ModelRef, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A list whose identity is tracked across the graph.
pub type SharedList = Rc<RefCell<Vec<Value>>>;

/// A runtime member value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    DateTime(DateTime<Utc>),
    BigInt(BigInt),
    Pair(Box<Value>, Box<Value>),
    Map(IndexMap<String, Value>),
    List(SharedList),
    Model(ModelRef),
}

/// A numeric value, either integral or floating-point.
///
/// # Examples
///
/// ```rust
/// use serde_graph::Number;
///
/// assert_eq!(Number::Integer(42).as_i64(), Some(42));
/// assert_eq!(Number::Float(42.0).as_i64(), Some(42));
/// assert_eq!(Number::Float(42.5).as_i64(), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    #[inline]
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Number::Integer(_))
    }

    /// Converts to `i64` when no precision is lost.
    #[inline]
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Integer(i) => Some(*i),
            Number::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{}", i),
            Number::Float(fl) if fl.is_nan() => write!(f, "NaN"),
            Number::Float(fl) if fl.is_infinite() => {
                write!(f, "{}", if *fl > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Number::Float(fl) => write!(f, "{:?}", fl),
        }
    }
}

impl Value {
    /// Creates a new shared list.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Wraps a new model instance.
    pub fn model<T: Model>(model: T) -> Self {
        Value::Model(ModelRef::new(model))
    }

    #[must_use]
    pub fn pair(key: Value, value: Value) -> Self {
        Value::Pair(Box::new(key), Box::new(value))
    }

    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for values whose identity the reference manager tracks.
    #[inline]
    #[must_use]
    pub const fn is_trackable(&self) -> bool {
        matches!(self, Value::List(_) | Value::Model(_))
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(Number::Integer(_)) => "integer",
            Value::Number(Number::Float(_)) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::BigInt(_) => "bigint",
            Value::Pair(..) => "pair",
            Value::Map(_) => "map",
            Value::List(_) => "list",
            Value::Model(_) => "model",
        }
    }

    /// Address of the shared allocation for trackable values.
    #[must_use]
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::List(list) => Some(Rc::as_ptr(list) as *const () as usize),
            Value::Model(model) => Some(model.identity()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&SharedList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_model(&self) -> Option<&ModelRef> {
        match self {
            Value::Model(model) => Some(model),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts into an optional typed model; `Null` becomes `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value is not a model of type `T`.
    pub fn into_model<T: Model>(self) -> Result<Option<Rc<RefCell<T>>>> {
        match self {
            Value::Null => Ok(None),
            Value::Model(model) => model.downcast::<T>().map(Some).ok_or_else(|| {
                Error::type_mismatch("", std::any::type_name::<T>(), model.rust_type_name())
            }),
            other => Err(Error::type_mismatch("", "model", other.kind())),
        }
    }

    /// Converts into an optional shared list; `Null` becomes `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value is not a list.
    pub fn into_list(self) -> Result<Option<SharedList>> {
        match self {
            Value::Null => Ok(None),
            Value::List(list) => Ok(Some(list)),
            other => Err(Error::type_mismatch("", "list", other.kind())),
        }
    }

    /// Converts into an optional key/value pair; `Null` becomes `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value is not a pair.
    pub fn into_pair(self) -> Result<Option<(Value, Value)>> {
        match self {
            Value::Null => Ok(None),
            Value::Pair(key, value) => Ok(Some((*key, *value))),
            other => Err(Error::type_mismatch("", "pair", other.kind())),
        }
    }
}

impl PartialEq for Value {
    /// Primitives compare by value; lists compare by content unless they are the
    /// same list; models compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Pair(ak, av), Value::Pair(bk, bv)) => ak == bk && av == bv,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Model(a), Value::Model(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::BigInt(big) => write!(f, "{}", big),
            Value::Pair(k, v) => write!(f, "[{}, {}]", k, v),
            Value::Map(map) => write!(f, "{{map with {} entries}}", map.len()),
            Value::List(list) => write!(f, "[list with {} items]", list.borrow().len()),
            Value::Model(model) => write!(f, "<{}>", model.rust_type_name()),
        }
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Number(Number::Integer(value as i64))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(Number::Float(value as f64))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(Number::Float(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Value::BigInt(value)
    }
}

impl From<ModelRef> for Value {
    fn from(value: ModelRef) -> Self {
        Value::Model(value)
    }
}

impl From<SharedList> for Value {
    fn from(value: SharedList) -> Self {
        Value::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value
            .as_bool()
            .ok_or_else(|| Error::type_mismatch("", "bool", value.kind()))
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value
            .as_i64()
            .ok_or_else(|| Error::type_mismatch("", "i64", value.kind()))
    }
}

impl TryFrom<Value> for i32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .ok_or_else(|| Error::type_mismatch("", "i32", value.kind()))
    }
}

impl TryFrom<Value> for u32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value
            .as_i64()
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| Error::type_mismatch("", "u32", value.kind()))
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| Error::type_mismatch("", "f64", value.kind()))
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(Error::type_mismatch("", "String", other.kind())),
        }
    }
}

impl TryFrom<Value> for DateTime<Utc> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(Error::type_mismatch("", "DateTime", other.kind())),
        }
    }
}

impl TryFrom<Value> for BigInt {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::BigInt(big) => Ok(big),
            Value::Number(Number::Integer(i)) => Ok(BigInt::from(i)),
            other => Err(Error::type_mismatch("", "BigInt", other.kind())),
        }
    }
}
