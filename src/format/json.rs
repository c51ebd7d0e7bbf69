//! JSON backend.
//!
//! Writing goes through the `Serialize` impl of [`Node`]. Reading parses into
//! a `serde_json::Value` (with `preserve_order`, so member order survives) and
//! recognizes the reserved keys:
//!
//! ```json
//! {"$type": "B", "$graph_id": 1, "Item": {"$graph_id": 2, "Count": 3}}
//! {"$graph_ref_id": 2}
//! {"$graph_id": 3, "$values": [1, 2, 3]}
//! {"$kind": "DateTime", "$value": "2024-01-15T10:30:00+00:00"}
//! {"$kind": "Pair", "$key": 1, "$value": "x"}
//! ```
//!
//! Map keys that start with `$` are written with a second `$` in front, so a
//! key never reads back as an annotation.

use super::Format;
use crate::node::{
    unescape_key, BIGINT_KIND, DATETIME_KIND, GRAPH_ID_KEY, GRAPH_REF_ID_KEY, KEY_KEY, KIND_KEY,
    PAIR_KIND, TYPE_KEY, VALUES_KEY, VALUE_KEY,
};
use crate::{Error, Node, NodeMap, Number, Result, SerializationConfiguration};
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::Serialize;
use std::io::{Read, Write};

const NAME: &str = "json";

/// JSON codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFormat;

impl Format for JsonFormat {
    const NAME: &'static str = NAME;

    fn write_document(
        &self,
        document: &Node,
        writer: &mut dyn Write,
        configuration: &SerializationConfiguration,
    ) -> Result<()> {
        if configuration.pretty {
            let indent = vec![b' '; configuration.indent];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
            let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
            document.serialize(&mut serializer)?;
        } else {
            serde_json::to_writer(writer, document)?;
        }
        Ok(())
    }

    fn read_document(&self, reader: &mut dyn Read, _configuration: &SerializationConfiguration) -> Result<Node> {
        let value: serde_json::Value = serde_json::from_reader(reader)?;
        from_json(value)
    }
}

fn from_json(value: serde_json::Value) -> Result<Node> {
    use serde_json::Value as Json;

    match value {
        Json::Null => Ok(Node::Null),
        Json::Bool(b) => Ok(Node::Bool(b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Node::Number(Number::Integer(i))),
            None => n
                .as_f64()
                .map(|f| Node::Number(Number::Float(f)))
                .ok_or_else(|| Error::invalid_format(NAME, format!("number {} is out of range", n))),
        },
        Json::String(s) => Ok(Node::Text(s)),
        Json::Array(items) => Ok(Node::list(
            None,
            items.into_iter().map(from_json).collect::<Result<_>>()?,
        )),
        Json::Object(map) => from_json_object(map),
    }
}

fn from_json_object(map: serde_json::Map<String, serde_json::Value>) -> Result<Node> {
    if map.contains_key(KIND_KEY) {
        return from_json_kind(map);
    }
    if let Some(id) = map.get(GRAPH_REF_ID_KEY) {
        if map.len() != 1 {
            return Err(Error::invalid_format(
                NAME,
                format!("'{}' must be the only key of a reference", GRAPH_REF_ID_KEY),
            ));
        }
        return Ok(Node::Reference(graph_id(id)?));
    }

    let is_list = map.contains_key(VALUES_KEY);
    let mut type_name = None;
    let mut id = None;
    let mut values = None;
    let mut members = NodeMap::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            GRAPH_ID_KEY => id = Some(graph_id(&value)?),
            TYPE_KEY => match value {
                serde_json::Value::String(name) => type_name = Some(name),
                other => {
                    return Err(Error::invalid_format(
                        NAME,
                        format!("'{}' must be a string, found {}", TYPE_KEY, other),
                    ))
                }
            },
            VALUES_KEY => match value {
                serde_json::Value::Array(items) => values = Some(items),
                _ => {
                    return Err(Error::invalid_format(
                        NAME,
                        format!("'{}' must be an array", VALUES_KEY),
                    ))
                }
            },
            _ if is_list => {
                return Err(Error::invalid_format(
                    NAME,
                    format!("tracked list has an extra key '{}'", key),
                ))
            }
            escaped => match unescape_key(escaped) {
                Some(name) => {
                    members.insert(name.to_string(), from_json(value)?);
                }
                None => {
                    return Err(Error::invalid_format(
                        NAME,
                        format!("unexpected reserved key '{}'", escaped),
                    ))
                }
            },
        }
    }

    match values {
        Some(items) => Ok(Node::list(
            id,
            items.into_iter().map(from_json).collect::<Result<_>>()?,
        )),
        None => Ok(Node::Object {
            type_name,
            graph_id: id,
            members,
        }),
    }
}

/// Reads a `{"$kind": ..}` object: a typed scalar or a pair.
fn from_json_kind(mut map: serde_json::Map<String, serde_json::Value>) -> Result<Node> {
    let kind = match map.remove(KIND_KEY) {
        Some(serde_json::Value::String(kind)) => kind,
        _ => {
            return Err(Error::invalid_format(
                NAME,
                format!("'{}' must be a string", KIND_KEY),
            ))
        }
    };
    let node = match kind.as_str() {
        DATETIME_KIND => {
            let text = kind_text(&mut map)?;
            let dt = DateTime::parse_from_rfc3339(&text).map_err(|e| {
                Error::invalid_format(NAME, format!("invalid date '{}': {}", text, e))
            })?;
            Node::DateTime(dt.with_timezone(&Utc))
        }
        BIGINT_KIND => {
            let text = kind_text(&mut map)?;
            let big = text.parse::<BigInt>().map_err(|_| {
                Error::invalid_format(NAME, format!("invalid big integer '{}'", text))
            })?;
            Node::BigInt(big)
        }
        PAIR_KIND => {
            let (Some(key), Some(value)) = (map.remove(KEY_KEY), map.remove(VALUE_KEY)) else {
                return Err(Error::invalid_format(
                    NAME,
                    format!("a pair needs both '{}' and '{}'", KEY_KEY, VALUE_KEY),
                ));
            };
            Node::Pair(Box::new(from_json(key)?), Box::new(from_json(value)?))
        }
        other => {
            return Err(Error::invalid_format(NAME, format!("unknown kind '{}'", other)));
        }
    };
    if let Some(extra) = map.keys().next() {
        return Err(Error::invalid_format(
            NAME,
            format!("{} has an extra key '{}'", kind, extra),
        ));
    }
    Ok(node)
}

fn kind_text(map: &mut serde_json::Map<String, serde_json::Value>) -> Result<String> {
    match map.remove(VALUE_KEY) {
        Some(serde_json::Value::String(text)) => Ok(text),
        _ => Err(Error::invalid_format(
            NAME,
            format!("'{}' must be a string", VALUE_KEY),
        )),
    }
}

fn graph_id(value: &serde_json::Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| Error::invalid_format(NAME, format!("invalid graph id {}", value)))
}
