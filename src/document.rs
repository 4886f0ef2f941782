//! Document loading: file path in, owned read-only XML tree out.
//!
//! The query engine never touches XML syntax itself; `quick-xml` does the
//! parsing and this module folds its pull events into an owned [`XmlNode`]
//! tree. Namespace prefixes are stripped (queries address local names),
//! entities are unescaped, and whitespace-only text is dropped.

use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Error loading or parsing a source document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML: {0}")]
    Malformed(String),

    #[error("document has no root element")]
    Empty,
}

/// One element of a parsed document.
///
/// The tree is immutable once built; the engine only ever reads it, and
/// result rows copy values out, so row lifetimes are independent of the
/// document's.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    /// Local tag name (namespace prefix stripped)
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Direct text content, entity-unescaped and trimmed
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        XmlNode {
            tag: tag.into(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Value of the named attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Parses a standalone XML string into its root element.
    pub fn parse(text: &str) -> Result<XmlNode, LoadError> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(element_from(&start)?),
                Event::Empty(start) => {
                    let node = element_from(&start)?;
                    attach(&mut stack, &mut root, node);
                }
                Event::Text(text) => {
                    let content = text.unescape()?;
                    let trimmed = content.trim();
                    if !trimmed.is_empty() {
                        if let Some(open) = stack.last_mut() {
                            open.text.push_str(trimmed);
                        }
                    }
                }
                Event::CData(data) => {
                    let content = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    if let Some(open) = stack.last_mut() {
                        open.text.push_str(content.trim());
                    }
                }
                Event::End(_) => match stack.pop() {
                    Some(node) => attach(&mut stack, &mut root, node),
                    None => {
                        return Err(LoadError::Malformed(
                            "closing tag without a matching opening tag".into(),
                        ));
                    }
                },
                Event::Eof => break,
                // Declarations, comments, processing instructions
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(LoadError::Malformed(format!(
                "unclosed element <{}>",
                open.tag
            )));
        }
        root.ok_or(LoadError::Empty)
    }
}

/// A loaded document: the parsed tree plus the source file's base name,
/// which backs the synthetic `FILE_NAME` column.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub root: XmlNode,
    pub file_name: String,
}

impl XmlDocument {
    /// Loads and parses one file.
    pub fn load(path: &Path) -> Result<XmlDocument, LoadError> {
        let text = fs::read_to_string(path)?;
        let root = XmlNode::parse(&text)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(XmlDocument { root, file_name })
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlNode, LoadError> {
    let tag = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut node = XmlNode::new(tag);
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_none() {
        *root = Some(node);
    }
    // Content after the root element is ignored
}
