//! XML backend.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <graph knownTypes="B;A">
//!   <object type="0" id="1">
//!     <member name="Item"><object type="1" id="2">
//!       <member name="Count"><int>3</int></member>
//!     </object></member>
//!   </object>
//! </graph>
//! ```
//!
//! Type names are written once, in the `knownTypes` attribute of the root, in
//! the order they are first used; `object` elements refer to them by index.
//! Objects whose type follows from the declared member type have no `type`
//! attribute. Documents are parsed with `roxmltree`; syntax errors and
//! malformed elements are reported with line and column.

use super::{check_depth, Format};
use crate::{Error, Node, NodeMap, Number, Result, SerializationConfiguration};
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use num_bigint::BigInt;
use roxmltree::Document;
use std::io::{Read, Write};

const NAME: &str = "xml";

const ROOT: &str = "graph";
const KNOWN_TYPES: &str = "knownTypes";
const NULL: &str = "null";
const BOOL: &str = "bool";
const INT: &str = "int";
const FLOAT: &str = "float";
const TEXT: &str = "text";
const DATETIME: &str = "datetime";
const BIGINT: &str = "bigint";
const PAIR: &str = "pair";
const LIST: &str = "list";
const OBJECT: &str = "object";
const MEMBER: &str = "member";
const REF: &str = "ref";
const ID: &str = "id";
const TYPE: &str = "type";
const NAME_ATTR: &str = "name";

const DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

type Element<'a, 'input> = roxmltree::Node<'a, 'input>;

/// XML codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct XmlFormat;

impl Format for XmlFormat {
    const NAME: &'static str = NAME;

    fn write_document(
        &self,
        document: &Node,
        writer: &mut dyn Write,
        configuration: &SerializationConfiguration,
    ) -> Result<()> {
        let mut body = XmlWriter::new(configuration);
        body.break_line(1);
        body.write_node(document, 1)?;
        body.break_line(0);

        // the header depends on the types collected from the body
        let mut output = String::with_capacity(body.output.len() + 128);
        if configuration.xml_declaration {
            output.push_str(DECLARATION);
            if configuration.pretty {
                output.push('\n');
            }
        }
        output.push('<');
        output.push_str(ROOT);
        if !body.known_types.is_empty() {
            let known: Vec<&str> = body.known_types.iter().map(String::as_str).collect();
            push_attribute(&mut output, KNOWN_TYPES, &known.join(";"))?;
        }
        output.push('>');
        output.push_str(&body.output);
        output.push_str("</");
        output.push_str(ROOT);
        output.push('>');

        writer.write_all(output.as_bytes())?;
        Ok(())
    }

    fn read_document(&self, reader: &mut dyn Read, _configuration: &SerializationConfiguration) -> Result<Node> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;
        let document = Document::parse(&input).map_err(|e| {
            let pos = e.pos();
            Error::syntax(pos.row as usize, pos.col as usize, &e.to_string())
        })?;
        XmlReader::new(&document).read_document()
    }
}

/// Element name and text content of a primitive node.
pub fn write_primitive(node: &Node) -> Option<(&'static str, String)> {
    match node {
        Node::Bool(b) => Some((BOOL, b.to_string())),
        Node::Number(Number::Integer(i)) => Some((INT, i.to_string())),
        Node::Number(n) => Some((FLOAT, n.to_string())),
        Node::Text(s) => Some((TEXT, s.clone())),
        Node::DateTime(dt) => Some((DATETIME, dt.to_rfc3339())),
        Node::BigInt(big) => Some((BIGINT, big.to_string())),
        _ => None,
    }
}

/// Parses the text content of a primitive element.
///
/// Returns `None` if `element` is not a primitive element, and the parse
/// failure message if the text does not fit it.
pub fn read_primitive(element: &str, text: String) -> Option<std::result::Result<Node, String>> {
    let parsed = match element {
        BOOL => match text.trim() {
            "true" => Ok(Node::Bool(true)),
            "false" => Ok(Node::Bool(false)),
            other => Err(format!("'{}' is not a boolean", other)),
        },
        INT => text
            .trim()
            .parse::<i64>()
            .map(Node::from)
            .map_err(|_| format!("'{}' is not an integer", text.trim())),
        FLOAT => text
            .trim()
            .parse::<f64>()
            .map(Node::from)
            .map_err(|_| format!("'{}' is not a float", text.trim())),
        TEXT => Ok(Node::Text(text)),
        DATETIME => DateTime::parse_from_rfc3339(text.trim())
            .map(|dt| Node::DateTime(dt.with_timezone(&Utc)))
            .map_err(|_| format!("'{}' is not an RFC 3339 date", text.trim())),
        BIGINT => text
            .trim()
            .parse::<BigInt>()
            .map(Node::BigInt)
            .map_err(|_| format!("'{}' is not an integer", text.trim())),
        _ => return None,
    };
    Some(parsed)
}

// -----------------------------------------------------------------------------
// Writer

struct XmlWriter<'c> {
    output: String,
    configuration: &'c SerializationConfiguration,
    known_types: IndexSet<String>,
}

impl<'c> XmlWriter<'c> {
    fn new(configuration: &'c SerializationConfiguration) -> Self {
        XmlWriter {
            output: String::with_capacity(256),
            configuration,
            known_types: IndexSet::new(),
        }
    }

    fn break_line(&mut self, depth: usize) {
        if self.configuration.pretty {
            self.output.push('\n');
            for _ in 0..depth * self.configuration.indent {
                self.output.push(' ');
            }
        }
    }

    fn open(&mut self, element: &str) {
        self.output.push('<');
        self.output.push_str(element);
    }

    fn close(&mut self, element: &str) {
        self.output.push_str("</");
        self.output.push_str(element);
        self.output.push('>');
    }

    fn write_node(&mut self, node: &Node, depth: usize) -> Result<()> {
        if let Some((element, text)) = write_primitive(node) {
            self.open(element);
            self.output.push('>');
            escape_into(&mut self.output, &text, false)?;
            self.close(element);
            return Ok(());
        }

        match node {
            Node::Null => self.output.push_str("<null/>"),
            Node::Reference(id) => {
                self.open(REF);
                push_attribute(&mut self.output, ID, &id.to_string())?;
                self.output.push_str("/>");
            }
            Node::Pair(key, value) => {
                self.open(PAIR);
                self.output.push('>');
                for item in [key, value] {
                    self.break_line(depth + 1);
                    self.write_node(item, depth + 1)?;
                }
                self.break_line(depth);
                self.close(PAIR);
            }
            Node::List { graph_id, items } => {
                self.open(LIST);
                if let Some(id) = graph_id {
                    push_attribute(&mut self.output, ID, &id.to_string())?;
                }
                self.output.push('>');
                for item in items {
                    self.break_line(depth + 1);
                    self.write_node(item, depth + 1)?;
                }
                if !items.is_empty() {
                    self.break_line(depth);
                }
                self.close(LIST);
            }
            Node::Object {
                type_name,
                graph_id,
                members,
            } => {
                self.open(OBJECT);
                if let Some(type_name) = type_name {
                    let (index, _) = self.known_types.insert_full(type_name.clone());
                    push_attribute(&mut self.output, TYPE, &index.to_string())?;
                }
                if let Some(id) = graph_id {
                    push_attribute(&mut self.output, ID, &id.to_string())?;
                }
                self.output.push('>');
                for (name, value) in members {
                    self.break_line(depth + 1);
                    self.open(MEMBER);
                    push_attribute(&mut self.output, NAME_ATTR, name)?;
                    self.output.push('>');
                    self.write_node(value, depth + 1)?;
                    self.close(MEMBER);
                }
                if !members.is_empty() {
                    self.break_line(depth);
                }
                self.close(OBJECT);
            }
            Node::Bool(_) | Node::Number(_) | Node::Text(_) | Node::DateTime(_) | Node::BigInt(_) => {}
        }
        Ok(())
    }
}

fn push_attribute(output: &mut String, name: &str, value: &str) -> Result<()> {
    output.push(' ');
    output.push_str(name);
    output.push_str("=\"");
    escape_into(output, value, true)?;
    output.push('"');
    Ok(())
}

/// Characters XML 1.0 can carry at all, escaped or not.
fn is_xml_char(ch: char) -> bool {
    matches!(ch,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Escapes `text` into `output`. Whitespace other than a plain space is
/// written as a character reference inside attributes, where parsers would
/// otherwise normalize it.
fn escape_into(output: &mut String, text: &str, attribute: bool) -> Result<()> {
    for ch in text.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&apos;"),
            '\n' | '\t' if !attribute => output.push(ch),
            '\t' | '\n' | '\r' => {
                output.push_str("&#");
                output.push_str(&(ch as u32).to_string());
                output.push(';');
            }
            c if is_xml_char(c) => output.push(c),
            c => {
                return Err(Error::unsupported_value(format!(
                    "character U+{:04X} cannot be written to XML",
                    c as u32
                )))
            }
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Reader

struct XmlReader<'d, 'input> {
    document: &'d Document<'input>,
    known_types: Vec<String>,
}

impl<'d, 'input> XmlReader<'d, 'input> {
    fn new(document: &'d Document<'input>) -> Self {
        XmlReader {
            document,
            known_types: Vec::new(),
        }
    }

    /// A syntax error positioned at the start tag of `element`.
    fn error(&self, element: Element<'_, '_>, msg: &str) -> Error {
        let pos = self.document.text_pos_at(element.range().start);
        Error::syntax(pos.row as usize, pos.col as usize, msg)
    }

    /// Child elements of a container; comments and whitespace are skipped.
    fn children<'a>(&self, element: Element<'a, 'input>) -> Result<Vec<Element<'a, 'input>>> {
        let mut children = Vec::new();
        for child in element.children() {
            if child.is_element() {
                children.push(child);
            } else if child.is_text() && !child.text().unwrap_or_default().trim().is_empty() {
                return Err(self.error(
                    child,
                    &format!("unexpected text inside <{}>", element.tag_name().name()),
                ));
            }
        }
        Ok(children)
    }

    /// Concatenated text content of a primitive element.
    fn text(&self, element: Element<'_, '_>) -> Result<String> {
        let mut text = String::new();
        for child in element.children() {
            if child.is_element() {
                return Err(self.error(
                    child,
                    &format!("unexpected element inside <{}>", element.tag_name().name()),
                ));
            }
            if child.is_text() {
                text.push_str(child.text().unwrap_or_default());
            }
        }
        Ok(text)
    }

    fn id_attribute(&self, element: Element<'_, '_>) -> Result<Option<u32>> {
        let Some(raw) = element.attribute(ID) else {
            return Ok(None);
        };
        match raw.parse::<u32>() {
            Ok(id) if id > 0 => Ok(Some(id)),
            _ => Err(self.error(element, &format!("invalid id '{}'", raw))),
        }
    }

    fn read_document(mut self) -> Result<Node> {
        let root = self.document.root_element();
        let name = root.tag_name().name();
        if name != ROOT {
            return Err(self.error(
                root,
                &format!("expected <{}> root element, found <{}>", ROOT, name),
            ));
        }
        if let Some(known) = root.attribute(KNOWN_TYPES) {
            self.known_types = known
                .split(';')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        match self.children(root)?.as_slice() {
            [value] => self.read_value(*value, 0),
            [] => Err(self.error(root, "document has no root object")),
            [_, extra, ..] => Err(self.error(*extra, "more than one value inside the root element")),
        }
    }

    fn read_value(&self, element: Element<'_, 'input>, depth: usize) -> Result<Node> {
        check_depth(NAME, depth)?;
        match element.tag_name().name() {
            NULL => {
                self.expect_empty(element)?;
                Ok(Node::Null)
            }
            REF => {
                let id = self
                    .id_attribute(element)?
                    .ok_or_else(|| self.error(element, "<ref> without an id"))?;
                self.expect_empty(element)?;
                Ok(Node::Reference(id))
            }
            PAIR => match self.children(element)?.as_slice() {
                [key, value] => Ok(Node::Pair(
                    Box::new(self.read_value(*key, depth + 1)?),
                    Box::new(self.read_value(*value, depth + 1)?),
                )),
                _ => Err(self.error(element, "<pair> needs exactly two values")),
            },
            LIST => {
                let graph_id = self.id_attribute(element)?;
                let items = self
                    .children(element)?
                    .into_iter()
                    .map(|item| self.read_value(item, depth + 1))
                    .collect::<Result<_>>()?;
                Ok(Node::list(graph_id, items))
            }
            OBJECT => self.read_object(element, depth),
            name => {
                let text = self.text(element)?;
                match read_primitive(name, text) {
                    Some(parsed) => parsed.map_err(|msg| self.error(element, &msg)),
                    None => Err(self.error(element, &format!("unexpected element <{}>", name))),
                }
            }
        }
    }

    fn expect_empty(&self, element: Element<'_, '_>) -> Result<()> {
        match self.children(element)?.first() {
            Some(child) => Err(self.error(
                *child,
                &format!("<{}> must be empty", element.tag_name().name()),
            )),
            None => Ok(()),
        }
    }

    fn read_object(&self, element: Element<'_, 'input>, depth: usize) -> Result<Node> {
        let type_name = match element.attribute(TYPE) {
            Some(raw) => {
                let name = raw
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.known_types.get(index))
                    .ok_or_else(|| {
                        let pos = self.document.text_pos_at(element.range().start);
                        Error::invalid_format(
                            NAME,
                            format!(
                                "type index '{}' at line {}, column {} is not a known type",
                                raw, pos.row, pos.col
                            ),
                        )
                    })?;
                Some(name.clone())
            }
            None => None,
        };
        let graph_id = self.id_attribute(element)?;

        let mut members = NodeMap::new();
        for member in self.children(element)? {
            if member.tag_name().name() != MEMBER {
                return Err(self.error(
                    member,
                    &format!(
                        "expected <{}> inside <{}>, found <{}>",
                        MEMBER,
                        OBJECT,
                        member.tag_name().name()
                    ),
                ));
            }
            let name = member
                .attribute(NAME_ATTR)
                .ok_or_else(|| self.error(member, "<member> without a name"))?
                .to_string();
            let value = match self.children(member)?.as_slice() {
                [] => Node::Null,
                [value] => self.read_value(*value, depth + 1)?,
                [_, extra, ..] => return Err(self.error(*extra, "more than one value inside <member>")),
            };
            if members.insert(name, value).is_some() {
                return Err(self.error(member, "duplicate member"));
            }
        }

        Ok(Node::Object {
            type_name,
            graph_id,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MAX_DEPTH;

    fn write(node: &Node, configuration: &SerializationConfiguration) -> String {
        let mut out = Vec::new();
        XmlFormat.write_document(node, &mut out, configuration).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn read(text: &str) -> Result<Node> {
        XmlFormat.read_document(&mut text.as_bytes(), &SerializationConfiguration::default())
    }

    fn sample() -> Node {
        let mut inner = NodeMap::new();
        inner.insert("Count".to_string(), Node::from(3));
        inner.insert("Label".to_string(), Node::from(" <a & b> "));
        let mut outer = NodeMap::new();
        outer.insert("Item".to_string(), Node::object(Some("A"), Some(2), inner));
        outer.insert("Again".to_string(), Node::Reference(2));
        outer.insert(
            "Values".to_string(),
            Node::list(Some(3), vec![Node::from(1.5), Node::Null, Node::from(f64::NAN)]),
        );
        Node::object(Some("B"), Some(1), outer)
    }

    #[test]
    fn test_compact_layout() {
        let mut members = NodeMap::new();
        members.insert("Count".to_string(), Node::from(3));
        let node = Node::object(Some("A"), Some(1), members);
        let configuration = SerializationConfiguration::new().with_xml_declaration(false);
        assert_eq!(
            write(&node, &configuration),
            r#"<graph knownTypes="A"><object type="0" id="1"><member name="Count"><int>3</int></member></object></graph>"#
        );
    }

    #[test]
    fn test_known_types_in_first_use_order() {
        let text = write(&sample(), &SerializationConfiguration::default());
        assert!(text.starts_with(DECLARATION));
        assert!(text.contains(r#"<graph knownTypes="B;A">"#));
        assert!(text.contains(r#"<object type="1" id="2">"#));
        assert!(text.contains(r#"<ref id="2"/>"#));
    }

    #[test]
    fn test_read_back_compact_and_pretty() {
        let node = sample();
        for configuration in [SerializationConfiguration::default(), SerializationConfiguration::pretty()] {
            let read_back = read(&write(&node, &configuration)).unwrap();
            assert_eq!(read_back.get("Item"), node.get("Item"));
            assert_eq!(read_back.get("Again"), Some(&Node::Reference(2)));
            match read_back.get("Values") {
                Some(Node::List { graph_id, items }) => {
                    assert_eq!(*graph_id, Some(3));
                    assert_eq!(items[0], Node::from(1.5));
                    assert!(matches!(items[2], Node::Number(Number::Float(f)) if f.is_nan()));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_syntax_error_position() {
        let text = "<graph>\n  <object>\n    <member name=\"A\"><int>1</int></mmber>\n</object></graph>";
        match read(text) {
            Err(Error::Syntax { line, col, .. }) => {
                assert_eq!(line, 3);
                assert!(col > 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_primitive_reports_element_position() {
        let text = "<graph>\n<int>three</int></graph>";
        match read(text) {
            Err(Error::Syntax { line, col, msg }) => {
                assert_eq!((line, col), (2, 1));
                assert!(msg.contains("three"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_index() {
        let err = read(r#"<graph knownTypes="A"><object type="4"/></graph>"#).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { format: "xml", .. }));
    }

    #[test]
    fn test_comments_and_entities() {
        let node = read("<!-- saved --><graph><text>&#65;&#x42;&lt;</text></graph>").unwrap();
        assert_eq!(node, Node::from("AB<"));
    }

    #[test]
    fn test_trailing_content_rejected() {
        assert!(matches!(read("<graph><null/></graph><x/>"), Err(Error::Syntax { .. })));
        assert!(matches!(read("<graph><null/><null/></graph>"), Err(Error::Syntax { .. })));
        assert!(matches!(read("<graph><int>1</int> stray </graph>"), Err(Error::Syntax { .. })));
    }

    #[test]
    fn test_typed_scalars_and_pairs() {
        let when = DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let node = Node::list(
            None,
            vec![
                Node::DateTime(when),
                Node::Pair(
                    Box::new(Node::BigInt("123456789012345678901234567890".parse().unwrap())),
                    Box::new(Node::Null),
                ),
            ],
        );
        let compact = write(&node, &SerializationConfiguration::new().with_xml_declaration(false));
        assert_eq!(
            compact,
            "<graph><list><datetime>2024-01-15T10:30:00+00:00</datetime>\
             <pair><bigint>123456789012345678901234567890</bigint><null/></pair></list></graph>"
        );
        for configuration in [SerializationConfiguration::default(), SerializationConfiguration::pretty()] {
            assert_eq!(read(&write(&node, &configuration)).unwrap(), node);
        }
        assert!(matches!(read("<graph><pair><null/></pair></graph>"), Err(Error::Syntax { .. })));
    }

    #[test]
    fn test_whitespace_survives_in_text_and_names() {
        let mut members = NodeMap::new();
        members.insert("line\nbreak\tand tab".to_string(), Node::from("  a\r\nb\t "));
        let node = Node::object(None, None, members);
        for configuration in [SerializationConfiguration::default(), SerializationConfiguration::pretty()] {
            assert_eq!(read(&write(&node, &configuration)).unwrap(), node);
        }
    }

    #[test]
    fn test_characters_outside_xml_are_rejected() {
        let mut out = Vec::new();
        let err = XmlFormat
            .write_document(&Node::from("nul\u{0}"), &mut out, &SerializationConfiguration::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedValue(_)));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("<graph>{}<null/>{}</graph>", "<list>".repeat(10_000), "</list>".repeat(10_000));
        assert!(matches!(read(&deep), Err(Error::InvalidFormat { format: "xml", .. })));

        let shallow = format!(
            "<graph>{}<null/>{}</graph>",
            "<list>".repeat(MAX_DEPTH),
            "</list>".repeat(MAX_DEPTH)
        );
        assert!(read(&shallow).is_ok());
    }
}
