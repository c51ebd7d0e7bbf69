//! Wire formats.
//!
//! A [`Format`] only moves [`Node`] documents in and out of byte streams; the
//! graph semantics (identity, hooks, modifiers) live in the engine. Three
//! backends ship with the crate:
//!
//! | Format | Layout |
//! |--------|--------|
//! | [`XmlFormat`] | `<graph knownTypes="..">` with typed value elements |
//! | [`JsonFormat`] | `$type` / `$graph_id` / `$graph_ref_id` annotated JSON |
//! | [`BinaryFormat`] | `SGB1` magic, tag bytes, bincode varint payloads |

mod binary;
mod json;
mod xml;

pub use binary::BinaryFormat;
pub use json::JsonFormat;
pub use xml::XmlFormat;

use crate::{Error, Node, Result, SerializationConfiguration};
use std::io::{Read, Write};

/// Deepest node nesting a reader accepts, the same limit `serde_json` applies.
pub(crate) const MAX_DEPTH: usize = 128;

pub(crate) fn check_depth(format: &'static str, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::invalid_format(
            format,
            format!("nesting deeper than {} levels", MAX_DEPTH),
        ));
    }
    Ok(())
}

/// A codec between [`Node`] documents and bytes.
pub trait Format: Default + Send + Sync {
    /// Short name used in logs and error messages.
    const NAME: &'static str;

    fn write_document(
        &self,
        document: &Node,
        writer: &mut dyn Write,
        configuration: &SerializationConfiguration,
    ) -> Result<()>;

    fn read_document(&self, reader: &mut dyn Read, configuration: &SerializationConfiguration) -> Result<Node>;
}
