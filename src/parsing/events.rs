//! Streaming YAML event source.
//!
//! Wraps the `yaml-rust2` event parser and rebuilds the value tree while
//! reporting every node-close as a typed [`ParseEvent`]. Each event carries
//! the node's parsed value together with the position where the node
//! started, which is what the document parser needs to recover scalar
//! locations.

use std::collections::HashMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, ScanError, TScalarStyle};

/// A parsed YAML value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YamlValue {
    Null,
    Scalar(String),
    Sequence(Vec<YamlValue>),
    Mapping(Vec<(String, YamlValue)>),
}

impl YamlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&YamlValue> {
        match self {
            Self::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Text used when a node appears in key position.
    fn to_key(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Scalar(s) => s.clone(),
            Self::Sequence(_) | Self::Mapping(_) => "<complex-key>".to_string(),
        }
    }
}

/// Kind of node that was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    Mapping,
    Sequence,
}

/// Payload shared by every close event.
#[derive(Debug)]
pub struct ClosedNode<'a> {
    pub value: &'a YamlValue,
    /// Zero-based line where the node starts.
    pub line: usize,
    /// Zero-based character column where the node starts.
    pub column: usize,
    /// Leading whitespace of the node's line.
    pub indent: usize,
    /// Number of enclosing collections.
    pub depth: usize,
    /// Kind of the directly enclosing collection, `None` for a document root.
    pub parent: Option<NodeKind>,
    /// Whether the node is a mapping key.
    pub is_key: bool,
}

/// Structural event emitted when a node closes.
#[derive(Debug)]
pub enum ParseEvent<'a> {
    ScalarClosed(ClosedNode<'a>),
    MappingClosed(ClosedNode<'a>),
    SequenceClosed(ClosedNode<'a>),
}

impl<'a> ParseEvent<'a> {
    pub fn node(&self) -> &ClosedNode<'a> {
        match self {
            Self::ScalarClosed(n) | Self::MappingClosed(n) | Self::SequenceClosed(n) => n,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::ScalarClosed(_) => NodeKind::Scalar,
            Self::MappingClosed(_) => NodeKind::Mapping,
            Self::SequenceClosed(_) => NodeKind::Sequence,
        }
    }
}

enum Frame {
    Sequence {
        items: Vec<YamlValue>,
        start: Marker,
        anchor: usize,
        opaque: bool,
    },
    Mapping {
        entries: Vec<(String, YamlValue)>,
        pending_key: Option<String>,
        start: Marker,
        anchor: usize,
    },
}

impl Frame {
    fn kind(&self) -> NodeKind {
        match self {
            Frame::Sequence { .. } => NodeKind::Sequence,
            Frame::Mapping { .. } => NodeKind::Mapping,
        }
    }

    /// Whether the next node pushed into this frame lands in key position.
    fn expects_key(&self) -> bool {
        matches!(self, Frame::Mapping { pending_key: None, .. })
    }
}

struct Receiver<'t, F> {
    lines: Vec<&'t str>,
    opaque_tags: &'t [String],
    stack: Vec<Frame>,
    anchors: HashMap<usize, YamlValue>,
    /// Depth of opaque sequences currently open; scalars inside are not reported.
    opaque_depth: usize,
    callback: F,
}

fn tag_name(tag: &Tag) -> String {
    format!("{}{}", tag.handle, tag.suffix)
}

fn is_null(value: &str, style: TScalarStyle) -> bool {
    style == TScalarStyle::Plain && matches!(value, "" | "~" | "null" | "Null" | "NULL")
}

impl<'t, F> Receiver<'t, F>
where
    F: FnMut(ParseEvent<'_>),
{
    fn is_opaque(&self, tag: &Option<Tag>) -> bool {
        tag.as_ref()
            .is_some_and(|t| self.opaque_tags.iter().any(|o| *o == tag_name(t)))
    }

    fn indent_of(&self, line: usize) -> usize {
        self.lines
            .get(line)
            .map(|text| text.chars().take_while(|c| *c == ' ' || *c == '\t').count())
            .unwrap_or(0)
    }

    fn emit(&mut self, kind: NodeKind, value: &YamlValue, start: Marker, is_key: bool) {
        if self.opaque_depth > 0 {
            return;
        }
        let line = start.line().saturating_sub(1);
        let node = ClosedNode {
            value,
            line,
            column: start.col(),
            indent: self.indent_of(line),
            depth: self.stack.len(),
            parent: self.stack.last().map(Frame::kind),
            is_key,
        };
        let event = match kind {
            NodeKind::Scalar => ParseEvent::ScalarClosed(node),
            NodeKind::Mapping => ParseEvent::MappingClosed(node),
            NodeKind::Sequence => ParseEvent::SequenceClosed(node),
        };
        (self.callback)(event);
    }

    /// Attach a finished node to the enclosing collection.
    fn attach(&mut self, value: YamlValue) {
        match self.stack.last_mut() {
            Some(Frame::Sequence { items, .. }) => items.push(value),
            Some(Frame::Mapping {
                entries,
                pending_key,
                ..
            }) => match pending_key.take() {
                Some(key) => entries.push((key, value)),
                None => *pending_key = Some(value.to_key()),
            },
            None => {}
        }
    }

    fn close(&mut self, kind: NodeKind, value: YamlValue, start: Marker, anchor: usize) {
        let is_key = self.stack.last().is_some_and(Frame::expects_key);
        self.emit(kind, &value, start, is_key);
        if anchor > 0 {
            self.anchors.insert(anchor, value.clone());
        }
        self.attach(value);
    }
}

impl<'t, F> MarkedEventReceiver for Receiver<'t, F>
where
    F: FnMut(ParseEvent<'_>),
{
    fn on_event(&mut self, ev: Event, mark: Marker) {
        match ev {
            Event::Scalar(value, style, anchor, tag) => {
                let node = if self.is_opaque(&tag) {
                    YamlValue::Sequence(vec![YamlValue::Scalar(value)])
                } else if is_null(&value, style) {
                    YamlValue::Null
                } else {
                    YamlValue::Scalar(value)
                };
                let kind = match node {
                    YamlValue::Sequence(_) => NodeKind::Sequence,
                    _ => NodeKind::Scalar,
                };
                self.close(kind, node, mark, anchor);
            }
            Event::SequenceStart(anchor, tag) => {
                let opaque = self.is_opaque(&tag);
                if opaque {
                    self.opaque_depth += 1;
                }
                self.stack.push(Frame::Sequence {
                    items: Vec::new(),
                    start: mark,
                    anchor,
                    opaque,
                });
            }
            Event::SequenceEnd => {
                if let Some(Frame::Sequence {
                    items,
                    start,
                    anchor,
                    opaque,
                }) = self.stack.pop()
                {
                    if opaque {
                        self.opaque_depth -= 1;
                    }
                    self.close(NodeKind::Sequence, YamlValue::Sequence(items), start, anchor);
                }
            }
            Event::MappingStart(anchor, _tag) => {
                self.stack.push(Frame::Mapping {
                    entries: Vec::new(),
                    pending_key: None,
                    start: mark,
                    anchor,
                });
            }
            Event::MappingEnd => {
                if let Some(Frame::Mapping {
                    entries,
                    start,
                    anchor,
                    ..
                }) = self.stack.pop()
                {
                    self.close(NodeKind::Mapping, YamlValue::Mapping(entries), start, anchor);
                }
            }
            Event::Alias(id) => {
                let value = self.anchors.get(&id).cloned().unwrap_or(YamlValue::Null);
                self.attach(value);
            }
            Event::DocumentEnd => {
                self.stack.clear();
                self.anchors.clear();
                self.opaque_depth = 0;
            }
            _ => {}
        }
    }
}

/// Stream `text` through the YAML parser, invoking `callback` on every
/// node-close event. All documents in the stream are visited.
///
/// Nodes tagged with one of `opaque_tags` are materialised as sequences and
/// their contents are not reported.
pub fn stream_events<F>(text: &str, opaque_tags: &[String], callback: F) -> Result<(), ScanError>
where
    F: FnMut(ParseEvent<'_>),
{
    let mut receiver = Receiver {
        lines: text.lines().collect(),
        opaque_tags,
        stack: Vec::new(),
        anchors: HashMap::new(),
        opaque_depth: 0,
        callback,
    };
    let mut parser = Parser::new_from_str(text);
    parser.load(&mut receiver, true)
}

/// Parse `text` into the value of each document.
pub fn load_values(text: &str, opaque_tags: &[String]) -> Result<Vec<YamlValue>, ScanError> {
    let mut roots = Vec::new();
    stream_events(text, opaque_tags, |event| {
        let node = event.node();
        if node.depth == 0 {
            roots.push(node.value.clone());
        }
    })?;
    Ok(roots)
}
