//! XML wire format: request building and response decoding.
//!
//! Requests are assembled from [`Element`] trees (the gateway requires
//! namespace attributes on the envelope element); responses are decoded
//! into the loosely structured [`Node`] tree every stage reads through
//! the null-safe extractor.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::doc::Node;
use crate::errors::ConnectorError;

/// One XML element of an outgoing request body.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Leaf element holding a text value.
    pub fn text(name: &str, value: impl ToString) -> Self {
        let mut elem = Element::new(name);
        elem.text = Some(value.to_string());
        elem
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> std::io::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Start(start))?;
        if let Some(text) = &self.text {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

/// Serializes a request body, headless (no XML declaration) as the
/// gateway expects.
pub fn encode(root: &Element) -> Result<String, ConnectorError> {
    let mut writer = Writer::new(Vec::new());
    root.write(&mut writer)
        .map_err(|e| ConnectorError::Parse(format!("Failed to build request XML: {}", e)))?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| ConnectorError::Parse(format!("Request XML is not UTF-8: {}", e)))
}

/// Decodes a response body into a [`Node`] tree.
///
/// Every child element lands in a sequence under its tag name (repeated
/// tags append), and an element with no children collapses to its text —
/// the map-of-sequences shape the extractor expects. Attributes carry
/// only namespace noise and are dropped.
pub fn decode(xml: &str) -> Result<Node, ConnectorError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // (tag name, accumulated children, accumulated text)
    let mut stack: Vec<(String, Node, String)> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push((name, Node::map(), String::new()));
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                attach(&mut stack, &mut root, &name, Node::Text(String::new()));
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| ConnectorError::Parse(format!("Invalid XML text: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.2.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.2.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(_)) => {
                let (name, node, text) = stack
                    .pop()
                    .ok_or_else(|| ConnectorError::Parse("Unbalanced XML".to_string()))?;
                let finished = match &node {
                    Node::Map(m) if m.is_empty() => Node::Text(text),
                    _ => node,
                };
                attach(&mut stack, &mut root, &name, finished);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ConnectorError::Parse(format!("Invalid XML response: {}", e)))
            }
        }
    }

    root.ok_or_else(|| ConnectorError::Parse("Empty XML response".to_string()))
}

fn attach(stack: &mut [(String, Node, String)], root: &mut Option<Node>, name: &str, node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.1.push(name, node);
    } else {
        let mut wrapper = Node::map();
        wrapper.push(name, node);
        *root = Some(wrapper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{extract_text, Node};

    #[test]
    fn encode_nested_with_attributes() {
        let body = Element::new("tns:msgRequete")
            .attr("xmlns:tns", "http://example.com/v3")
            .child(Element::new("tns:corpsEntree").child(Element::text("tns:idAppelant", "jon")));
        let xml = encode(&body).unwrap();
        assert_eq!(
            xml,
            "<tns:msgRequete xmlns:tns=\"http://example.com/v3\">\
             <tns:corpsEntree><tns:idAppelant>jon</tns:idAppelant></tns:corpsEntree>\
             </tns:msgRequete>"
        );
    }

    #[test]
    fn encode_escapes_text() {
        let xml = encode(&Element::text("tns:password", "a<b&c")).unwrap();
        assert_eq!(xml, "<tns:password>a&lt;b&amp;c</tns:password>");
    }

    #[test]
    fn decode_leaves_become_single_element_sequences() {
        let tree = decode(
            "<tns:msgReponse><tns:corpsSortie><tns:jeton>TOK</tns:jeton></tns:corpsSortie></tns:msgReponse>",
        )
        .unwrap();
        assert_eq!(
            extract_text(&tree, &["tns:msgReponse", "tns:corpsSortie", "tns:jeton"]),
            Some("TOK")
        );
    }

    #[test]
    fn decode_repeated_tags_accumulate() {
        let tree = decode(
            "<r><item><n>1</n></item><item><n>2</n></item></r>",
        )
        .unwrap();
        let root = extract_root(&tree);
        assert_eq!(root.children("item").len(), 2);
    }

    fn extract_root(tree: &Node) -> &Node {
        crate::doc::extract(tree, &["r"]).unwrap()
    }

    #[test]
    fn decode_empty_element_is_empty_text() {
        let tree = decode("<r><a/></r>").unwrap();
        assert_eq!(extract_text(&tree, &["r", "a"]), Some(""));
    }

    #[test]
    fn decode_garbage_is_parse_error() {
        assert!(decode("<r><unclosed></r>").is_err());
        assert!(decode("").is_err());
    }
}
