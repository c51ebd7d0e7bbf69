//! Error types for object graph serialization and deserialization.
//!
//! ## Error Categories
//!
//! - **Argument errors**: invalid registrations or configuration, reported at the entry point
//! - **Type resolution errors**: a type name in the input cannot be resolved
//! - **Reference integrity errors**: a reference marker points at an id that was never registered
//! - **Format errors**: malformed XML, JSON or binary input (XML errors carry line/column)
//! - **I/O errors**: reading from or writing to the underlying stream failed
//!
//! Errors raised by serializer modifiers are propagated unchanged.
//!
//! ## Examples
//!
//! ```rust
//! use serde_graph::Error;
//!
//! let err = Error::type_not_found("Missing");
//! assert!(err.to_string().contains("Missing"));
//! ```

use std::fmt;
use thiserror::Error;

/// Represents all possible errors that can occur while (de)serializing an object graph.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// IO error during reading or writing
    #[error("IO error: {0}")]
    Io(String),

    /// Syntax error in a text format, with position
    #[error("Syntax error at line {line}, column {col}: {msg}")]
    Syntax { line: usize, col: usize, msg: String },

    /// Structurally valid input that does not describe an object graph
    #[error("Invalid {format} document: {msg}")]
    InvalidFormat { format: &'static str, msg: String },

    /// Contract violation at a public entry point
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A type name in the input cannot be resolved
    #[error("Cannot find type '{type_name}'")]
    TypeNotFound { type_name: String },

    /// A model instance whose Rust type was never registered
    #[error("Type '{0}' is not registered for serialization")]
    UnregisteredType(String),

    /// Two members of one model type share a name
    #[error("Member '{member}' is registered twice on type '{type_name}'")]
    DuplicateMember { type_name: String, member: String },

    /// A value does not fit the declared member type
    #[error("Type mismatch for member '{member}': expected {expected}, found {found}")]
    TypeMismatch {
        member: String,
        expected: String,
        found: String,
    },

    /// A reference marker points at an id that was never registered
    #[error("Reference id {id} does not resolve to a previously read instance")]
    UnknownReference { id: u32 },

    /// Two instances claim the same graph id
    #[error("Graph id {id} is registered more than once")]
    DuplicateReference { id: u32 },

    /// A cycle was found while graph ids are disabled
    #[error("Circular reference to an instance of '{type_name}' while graph ids are disabled")]
    CircularReference { type_name: String },

    /// A value the engine cannot put on the wire
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    /// Custom error
    #[error("Error: {0}")]
    Custom(String),
}

impl Error {
    /// Creates a syntax error with line and column information.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde_graph::Error;
    ///
    /// let err = Error::syntax(10, 5, "unexpected token");
    /// assert!(err.to_string().contains("line 10"));
    /// ```
    pub fn syntax(line: usize, col: usize, msg: &str) -> Self {
        Error::Syntax {
            line,
            col,
            msg: msg.to_string(),
        }
    }

    /// Creates an invalid format error for a given backend.
    pub fn invalid_format(format: &'static str, msg: impl fmt::Display) -> Self {
        Error::InvalidFormat {
            format,
            msg: msg.to_string(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(msg: impl fmt::Display) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    /// Creates the "cannot find type" error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde_graph::Error;
    ///
    /// let err = Error::type_not_found("Unknown.Type");
    /// assert_eq!(err.to_string(), "Cannot find type 'Unknown.Type'");
    /// ```
    pub fn type_not_found(type_name: &str) -> Self {
        Error::TypeNotFound {
            type_name: type_name.to_string(),
        }
    }

    /// Creates a type mismatch error for a member.
    pub fn type_mismatch(member: &str, expected: &str, found: &str) -> Self {
        Error::TypeMismatch {
            member: member.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Creates an unsupported value error.
    pub fn unsupported_value(msg: impl fmt::Display) -> Self {
        Error::UnsupportedValue(msg.to_string())
    }

    /// Creates a custom error with a display message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde_graph::Error;
    ///
    /// let err = Error::custom("something went wrong");
    /// assert!(err.to_string().contains("something went wrong"));
    /// ```
    pub fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }

    /// Creates an I/O error for stream failures.
    pub fn io(msg: &str) -> Self {
        Error::Io(msg.to_string())
    }

    /// Returns `true` for errors that point at broken references in the input.
    #[must_use]
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownReference { .. }
                | Error::DuplicateReference { .. }
                | Error::CircularReference { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::Io(err.to_string())
        } else {
            Error::Syntax {
                line: err.line(),
                col: err.column(),
                msg: err.to_string(),
            }
        }
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Error::invalid_format("binary", err)
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::invalid_format("binary", err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
