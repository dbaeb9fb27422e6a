use std::collections::BTreeMap;

/// Loosely structured response tree produced by the transport layer.
///
/// The gateway wraps every leaf in a one-element sequence, omits fields
/// freely and sometimes nests maps where a scalar is expected, so all
/// access goes through the null-safe [`extract`] lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Map(BTreeMap<String, Node>),
    Seq(Vec<Node>),
    Text(String),
}

impl Node {
    pub fn map() -> Node {
        Node::Map(BTreeMap::new())
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Node::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// All children stored under `key`, in document order. Empty when the
    /// key is absent or this node is not a map.
    pub fn children(&self, key: &str) -> &[Node] {
        match self {
            Node::Map(m) => match m.get(key) {
                Some(Node::Seq(items)) => items.as_slice(),
                Some(other) => std::slice::from_ref(other),
                None => &[],
            },
            _ => &[],
        }
    }

    /// Inserts `value` under `key`, appending when the key already exists.
    pub fn push(&mut self, key: &str, value: Node) {
        if let Node::Map(m) = self {
            match m.get_mut(key) {
                Some(Node::Seq(items)) => items.push(value),
                Some(existing) => {
                    let prev = existing.clone();
                    *existing = Node::Seq(vec![prev, value]);
                }
                None => {
                    m.insert(key.to_string(), Node::Seq(vec![value]));
                }
            }
        }
    }
}

/// Null-safe nested lookup: each path segment indexes into a map and
/// unwraps a one-element sequence. Any missing segment or shape mismatch
/// yields `None`; this never panics.
pub fn extract<'a>(node: &'a Node, path: &[&str]) -> Option<&'a Node> {
    let mut cur = node;
    for segment in path {
        let child = match cur {
            Node::Map(m) => m.get(*segment)?,
            _ => return None,
        };
        cur = match child {
            Node::Seq(items) => items.first()?,
            other => other,
        };
    }
    Some(cur)
}

/// [`extract`] down to a text leaf.
pub fn extract_text<'a>(node: &'a Node, path: &[&str]) -> Option<&'a str> {
    extract(node, path).and_then(|n| n.text())
}
