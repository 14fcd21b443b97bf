//! XML document → nested value decoding
//!
//! Conventions:
//! - an element becomes a map entry keyed by its qualified tag name (prefix kept)
//! - repeated sibling elements collapse into a list
//! - attributes become `@name` entries, text next to children becomes `#text`
//! - a text-only element becomes a string, an empty element becomes null
//!
//! The result is always a single-entry map holding the root element.

use crate::error::RemoteCallError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

struct Frame {
    name: String,
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, RemoteCallError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Map::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| parse_error(format!("bad attribute in <{}>: {}", name, e)))?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            let value = attr
                .unescape_value()
                .map_err(|e| parse_error(format!("bad attribute value in <{}>: {}", name, e)))?;
            attributes.insert(key, Value::String(value.into_owned()));
        }

        Ok(Self {
            name,
            attributes,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn into_entry(self) -> (String, Value) {
        let text = self.text.trim().to_string();

        if self.attributes.is_empty() && self.children.is_empty() {
            let value = if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            };
            return (self.name, value);
        }

        let mut map = self.attributes;
        map.extend(self.children);
        if !text.is_empty() {
            map.insert("#text".to_string(), Value::String(text));
        }
        (self.name, Value::Object(map))
    }
}

fn parse_error(msg: impl Into<String>) -> RemoteCallError {
    RemoteCallError::Parse(msg.into())
}

/// Insert a child, turning repeated keys into a list
fn insert_child(children: &mut Map<String, Value>, key: String, value: Value) {
    match children.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(key, value);
        }
    }
}

/// Decode an XML document into a nested value
pub fn decode_document(text: &str) -> Result<Value, RemoteCallError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let finished = match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(Frame::open(&start)?);
                None
            }
            Ok(Event::Empty(start)) => Some(Frame::open(&start)?),
            Ok(Event::End(_)) => Some(
                stack
                    .pop()
                    .ok_or_else(|| parse_error("closing tag without an open element"))?,
            ),
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let unescaped = t.unescape().map_err(|e| parse_error(e.to_string()))?;
                    top.text.push_str(&unescaped);
                }
                None
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
                None
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions, doctype
            Ok(_) => None,
            Err(e) => {
                return Err(parse_error(format!(
                    "malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        };

        if let Some(frame) = finished {
            let (key, value) = frame.into_entry();
            match stack.last_mut() {
                Some(parent) => insert_child(&mut parent.children, key, value),
                None if root.is_none() => root = Some((key, value)),
                None => return Err(parse_error("document has more than one root element")),
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(parse_error(format!("unclosed element <{}>", open.name)));
    }

    let (key, value) = root.ok_or_else(|| parse_error("document has no root element"))?;
    let mut document = Map::new();
    document.insert(key, value);
    Ok(Value::Object(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_elements_become_strings() {
        let doc = decode_document("<a><b>1</b><c>two</c></a>").unwrap();
        assert_eq!(doc, json!({"a": {"b": "1", "c": "two"}}));
    }

    #[test]
    fn test_repeated_siblings_become_list() {
        let doc = decode_document("<r><item>1</item><item>2</item><item>3</item></r>").unwrap();
        assert_eq!(doc, json!({"r": {"item": ["1", "2", "3"]}}));
    }

    #[test]
    fn test_empty_elements_are_null() {
        let doc = decode_document("<r><x/><y></y></r>").unwrap();
        assert_eq!(doc, json!({"r": {"x": null, "y": null}}));
    }

    #[test]
    fn test_attributes_and_mixed_text() {
        let doc = decode_document(r#"<r><v type="int">5</v></r>"#).unwrap();
        assert_eq!(doc, json!({"r": {"v": {"@type": "int", "#text": "5"}}}));
    }

    #[test]
    fn test_prefixes_are_kept_and_entities_unescaped() {
        let doc = decode_document(
            r#"<?xml version="1.0"?><SOAP-ENV:Envelope><SOAP-ENV:Body><ns1:x>a &amp; b</ns1:x></SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
        )
        .unwrap();
        assert_eq!(
            doc,
            json!({"SOAP-ENV:Envelope": {"SOAP-ENV:Body": {"ns1:x": "a & b"}}})
        );
    }

    #[test]
    fn test_key_order_preserved() {
        let doc = decode_document("<r><z>1</z><a>2</a><m>3</m></r>").unwrap();
        let keys: Vec<_> = doc["r"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_cdata_is_text() {
        let doc = decode_document("<r><![CDATA[<raw>]]></r>").unwrap();
        assert_eq!(doc, json!({"r": "<raw>"}));
    }

    #[test]
    fn test_malformed_documents_rejected() {
        assert!(decode_document("<a><b></a>").is_err());
        assert!(decode_document("<a>").is_err());
        assert!(decode_document("").is_err());
        assert!(decode_document("not xml at all").is_err());
    }
}
