//! Binary backend.
//!
//! A document is the magic `SGB1` followed by one encoded node. Each node is a
//! tag byte and its payload; integers, lengths and ids use bincode's standard
//! configuration (varint), strings are length-prefixed UTF-8. Graph id `0`
//! stands for "no id".
//!
//! | Tag | Node | Payload |
//! |-----|------|---------|
//! | 0 | null | |
//! | 1 | bool | `bool` |
//! | 2 | integer | `i64` |
//! | 3 | float | `f64` |
//! | 4 | text | `String` |
//! | 5 | list | id, count, nodes |
//! | 6 | object | id, `Option<String>` type, count, (name, node) pairs |
//! | 7 | reference | id |
//! | 8 | date | `i64` seconds, `u32` nanoseconds since the Unix epoch |
//! | 9 | big integer | signed little-endian bytes |
//! | 10 | pair | key node, value node |
//!
//! Nesting deeper than 128 nodes is rejected on read.

use super::{check_depth, Format};
use crate::{Error, Node, NodeMap, Number, Result, SerializationConfiguration};
use bincode::config;
use bincode::{Decode, Encode};
use chrono::DateTime;
use num_bigint::BigInt;
use std::io::{Read, Write};

const NAME: &str = "binary";
const MAGIC: &[u8; 4] = b"SGB1";

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INTEGER: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_TEXT: u8 = 4;
const TAG_LIST: u8 = 5;
const TAG_OBJECT: u8 = 6;
const TAG_REFERENCE: u8 = 7;
const TAG_DATETIME: u8 = 8;
const TAG_BIGINT: u8 = 9;
const TAG_PAIR: u8 = 10;

/// Binary codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryFormat;

impl Format for BinaryFormat {
    const NAME: &'static str = NAME;

    fn write_document(
        &self,
        document: &Node,
        mut writer: &mut dyn Write,
        _configuration: &SerializationConfiguration,
    ) -> Result<()> {
        writer.write_all(MAGIC)?;
        write_node(document, &mut writer)
    }

    fn read_document(&self, mut reader: &mut dyn Read, _configuration: &SerializationConfiguration) -> Result<Node> {
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| Error::invalid_format(NAME, "missing header"))?;
        if &magic != MAGIC {
            return Err(Error::invalid_format(NAME, "bad magic number"));
        }
        read_node(&mut reader, 0)
    }
}

fn encode<E: Encode, W: Write>(value: E, writer: &mut W) -> Result<()> {
    bincode::encode_into_std_write(value, writer, config::standard())?;
    Ok(())
}

fn decode<D: Decode<()>, R: Read>(reader: &mut R) -> Result<D> {
    Ok(bincode::decode_from_std_read(reader, config::standard())?)
}

fn write_node<W: Write>(node: &Node, writer: &mut W) -> Result<()> {
    match node {
        Node::Null => writer.write_all(&[TAG_NULL])?,
        Node::Bool(b) => {
            writer.write_all(&[TAG_BOOL])?;
            encode(*b, writer)?;
        }
        Node::Number(Number::Integer(i)) => {
            writer.write_all(&[TAG_INTEGER])?;
            encode(*i, writer)?;
        }
        Node::Number(Number::Float(f)) => {
            writer.write_all(&[TAG_FLOAT])?;
            encode(*f, writer)?;
        }
        Node::Text(s) => {
            writer.write_all(&[TAG_TEXT])?;
            encode(s.as_str(), writer)?;
        }
        Node::DateTime(dt) => {
            writer.write_all(&[TAG_DATETIME])?;
            encode(dt.timestamp(), writer)?;
            encode(dt.timestamp_subsec_nanos(), writer)?;
        }
        Node::BigInt(big) => {
            writer.write_all(&[TAG_BIGINT])?;
            encode(big.to_signed_bytes_le(), writer)?;
        }
        Node::Pair(key, value) => {
            writer.write_all(&[TAG_PAIR])?;
            write_node(key, writer)?;
            write_node(value, writer)?;
        }
        Node::List { graph_id, items } => {
            writer.write_all(&[TAG_LIST])?;
            encode(graph_id.unwrap_or(0), writer)?;
            encode(items.len() as u64, writer)?;
            for item in items {
                write_node(item, writer)?;
            }
        }
        Node::Object {
            type_name,
            graph_id,
            members,
        } => {
            writer.write_all(&[TAG_OBJECT])?;
            encode(graph_id.unwrap_or(0), writer)?;
            encode(type_name.as_deref(), writer)?;
            encode(members.len() as u64, writer)?;
            for (name, member) in members {
                encode(name.as_str(), writer)?;
                write_node(member, writer)?;
            }
        }
        Node::Reference(id) => {
            writer.write_all(&[TAG_REFERENCE])?;
            encode(*id, writer)?;
        }
    }
    Ok(())
}

fn read_count<R: Read>(reader: &mut R) -> Result<usize> {
    let count: u64 = decode(reader)?;
    usize::try_from(count).map_err(|_| Error::invalid_format(NAME, format!("count {} is too large", count)))
}

fn read_graph_id<R: Read>(reader: &mut R) -> Result<Option<u32>> {
    let id: u32 = decode(reader)?;
    Ok((id != 0).then_some(id))
}

fn read_node<R: Read>(reader: &mut R, depth: usize) -> Result<Node> {
    check_depth(NAME, depth)?;
    let mut tag = [0u8; 1];
    reader
        .read_exact(&mut tag)
        .map_err(|_| Error::invalid_format(NAME, "unexpected end of input"))?;

    match tag[0] {
        TAG_NULL => Ok(Node::Null),
        TAG_BOOL => Ok(Node::Bool(decode(reader)?)),
        TAG_INTEGER => Ok(Node::Number(Number::Integer(decode(reader)?))),
        TAG_FLOAT => Ok(Node::Number(Number::Float(decode(reader)?))),
        TAG_TEXT => Ok(Node::Text(decode(reader)?)),
        TAG_DATETIME => {
            let seconds: i64 = decode(reader)?;
            let nanos: u32 = decode(reader)?;
            DateTime::from_timestamp(seconds, nanos)
                .map(Node::DateTime)
                .ok_or_else(|| Error::invalid_format(NAME, "date out of range"))
        }
        TAG_BIGINT => {
            let bytes: Vec<u8> = decode(reader)?;
            Ok(Node::BigInt(BigInt::from_signed_bytes_le(&bytes)))
        }
        TAG_PAIR => {
            let key = read_node(reader, depth + 1)?;
            let value = read_node(reader, depth + 1)?;
            Ok(Node::Pair(Box::new(key), Box::new(value)))
        }
        TAG_LIST => {
            let graph_id = read_graph_id(reader)?;
            let count = read_count(reader)?;
            // the count is untrusted, so it does not size the allocation
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(read_node(reader, depth + 1)?);
            }
            Ok(Node::list(graph_id, items))
        }
        TAG_OBJECT => {
            let graph_id = read_graph_id(reader)?;
            let type_name: Option<String> = decode(reader)?;
            let count = read_count(reader)?;
            let mut members = NodeMap::new();
            for _ in 0..count {
                let name: String = decode(reader)?;
                let member = read_node(reader, depth + 1)?;
                if members.insert(name, member).is_some() {
                    return Err(Error::invalid_format(NAME, "duplicate member name"));
                }
            }
            Ok(Node::Object {
                type_name,
                graph_id,
                members,
            })
        }
        TAG_REFERENCE => {
            let id = read_graph_id(reader)?
                .ok_or_else(|| Error::invalid_format(NAME, "reference without an id"))?;
            Ok(Node::Reference(id))
        }
        other => Err(Error::invalid_format(NAME, format!("unknown tag {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MAX_DEPTH;

    fn write(node: &Node) -> Vec<u8> {
        let mut out = Vec::new();
        BinaryFormat
            .write_document(node, &mut out, &SerializationConfiguration::default())
            .unwrap();
        out
    }

    fn read(bytes: &[u8]) -> Result<Node> {
        BinaryFormat.read_document(&mut &bytes[..], &SerializationConfiguration::default())
    }

    #[test]
    fn test_layout_of_small_object() {
        let mut members = NodeMap::new();
        members.insert("N".to_string(), Node::from(3));
        let node = Node::object(Some("A"), Some(1), members);
        assert_eq!(
            write(&node),
            vec![
                b'S', b'G', b'B', b'1', // magic
                TAG_OBJECT, 1, // id
                1, 1, b'A', // Some("A")
                1, // member count
                1, b'N', TAG_INTEGER, 6, // zigzag 3
            ]
        );
    }

    #[test]
    fn test_read_back() {
        let mut members = NodeMap::new();
        members.insert("Text".to_string(), Node::from("héllo"));
        members.insert("Ratio".to_string(), Node::from(f64::INFINITY));
        members.insert(
            "Items".to_string(),
            Node::list(Some(2), vec![Node::Null, Node::Bool(true), Node::from(-40)]),
        );
        members.insert("Again".to_string(), Node::Reference(2));
        let node = Node::object(Some("Holder"), Some(1), members);
        assert_eq!(read(&write(&node)).unwrap(), node);
    }

    #[test]
    fn test_typed_scalars_and_pairs() {
        let when = DateTime::from_timestamp(1_705_314_600, 250).unwrap();
        let node = Node::Pair(
            Box::new(Node::DateTime(when)),
            Box::new(Node::BigInt("-98765432109876543210".parse().unwrap())),
        );
        assert_eq!(read(&write(&node)).unwrap(), node);
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut bytes = MAGIC.to_vec();
        for _ in 0..100_000 {
            bytes.extend_from_slice(&[TAG_LIST, 0, 1]);
        }
        bytes.push(TAG_NULL);
        assert!(matches!(read(&bytes), Err(Error::InvalidFormat { .. })));

        let mut shallow = MAGIC.to_vec();
        for _ in 0..MAX_DEPTH {
            shallow.extend_from_slice(&[TAG_LIST, 0, 1]);
        }
        shallow.push(TAG_NULL);
        assert!(read(&shallow).is_ok());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(read(b"XXXX\x00"), Err(Error::InvalidFormat { .. })));
        assert!(matches!(read(b"SGB1\x09"), Err(Error::InvalidFormat { .. })));
        assert!(matches!(read(b"SGB1\x05\x00\x03\x00"), Err(Error::InvalidFormat { .. })));
        assert!(matches!(read(b"SGB1\x07\x00"), Err(Error::InvalidFormat { .. })));
    }
}
