//! The [`value!`](crate::value!) macro.

/// Builds a [`Value`](crate::Value) from JSON-like syntax.
///
/// Arrays become shared lists, objects become string-keyed maps and any other
/// expression goes through `Value::from`.
///
/// ```rust
/// use serde_graph::{value, Value};
///
/// let settings = value!({
///     "name": "primary",
///     "retries": 3,
///     "ports": [80, 443]
/// });
///
/// let map = settings.as_map().unwrap();
/// assert_eq!(map.get("retries").and_then(Value::as_i64), Some(3));
/// assert_eq!(map.get("ports").unwrap().as_list().unwrap().borrow().len(), 2);
/// ```
#[macro_export]
macro_rules! value {
    (null) => {
        $crate::Value::Null
    };

    (true) => {
        $crate::Value::Bool(true)
    };

    (false) => {
        $crate::Value::Bool(false)
    };

    ([]) => {
        $crate::Value::list(::std::vec::Vec::new())
    };

    ([ $($elem:tt),* $(,)? ]) => {
        $crate::Value::list(::std::vec![$($crate::value!($elem)),*])
    };

    ({}) => {
        $crate::Value::Map(::std::iter::Iterator::collect(::std::iter::empty()))
    };

    ({ $($key:literal : $value:tt),* $(,)? }) => {
        $crate::Value::Map(::std::iter::Iterator::collect(
            ::std::vec![$((::std::string::ToString::to_string(&$key), $crate::value!($value))),*]
                .into_iter(),
        ))
    };

    ($other:expr) => {
        $crate::Value::from($other)
    };
}
