//! Driver abstraction
//!
//! This module defines the abstract interface Wayfinder consumes a browser
//! through, plus the wire-adjacent types it trades in: opaque node handles,
//! element kinds, and attribute selectors.

use async_trait::async_trait;
use regex::Regex;

use crate::{Error, Result};

/// Opaque reference to a located UI node
///
/// Valid until the underlying node is removed or replaced; after that any
/// operation on it surfaces [`Error::StaleHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Driver-specific node identity (CDP node id, mock instance id, ...)
    pub id: String,
}

impl Handle {
    /// Create a handle from a driver-specific node identity
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self { id: id.into() }
    }
}

/// The locatable element roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Button,
    Link,
    TextField,
    TextArea,
    Checkbox,
    Radio,
    SelectList,
    Form,
    Div,
    Span,
    List,
    ListItem,
    Table,
    Image,
    /// Matches any element; prefer a concrete kind where one is known
    Any,
}

impl ElementKind {
    /// True for kinds that take typed text
    pub fn is_text_entry(&self) -> bool {
        matches!(self, ElementKind::TextField | ElementKind::TextArea)
    }

    /// True for kinds toggled on rather than written to
    pub fn is_toggle(&self) -> bool {
        matches!(self, ElementKind::Checkbox | ElementKind::Radio)
    }

    /// CSS tag expression for this kind
    pub fn css(&self) -> &'static str {
        match self {
            ElementKind::Button => "button",
            ElementKind::Link => "a",
            ElementKind::TextField => "input",
            ElementKind::TextArea => "textarea",
            ElementKind::Checkbox => "input[type=\"checkbox\"]",
            ElementKind::Radio => "input[type=\"radio\"]",
            ElementKind::SelectList => "select",
            ElementKind::Form => "form",
            ElementKind::Div => "div",
            ElementKind::Span => "span",
            ElementKind::List => "ul,ol",
            ElementKind::ListItem => "li",
            ElementKind::Table => "table",
            ElementKind::Image => "img",
            ElementKind::Any => "*",
        }
    }
}

/// How a single attribute is matched
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Attribute value equals this string
    Exact(String),
    /// Attribute value matches this pattern
    Pattern(Regex),
}

impl Matcher {
    /// Apply this matcher to an attribute value
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(expected) => value == expected,
            Matcher::Pattern(re) => re.is_match(value),
        }
    }
}

/// Attribute selector for element queries
///
/// An ordered conjunction of `(attribute, matcher)` parts. The
/// pseudo-attribute `"text"` matches the node's rendered text.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    parts: Vec<(String, Matcher)>,
}

impl Selector {
    /// Select by `id` attribute
    pub fn id<S: Into<String>>(value: S) -> Self {
        Self::attr("id", value)
    }

    /// Select by an exact attribute value
    pub fn attr<S: Into<String>>(name: &str, value: S) -> Self {
        Self {
            parts: vec![(name.to_string(), Matcher::Exact(value.into()))],
        }
    }

    /// Select by `class` attribute
    pub fn css_class<S: Into<String>>(value: S) -> Self {
        Self::attr("class", value)
    }

    /// Select by rendered text
    pub fn text<S: Into<String>>(value: S) -> Self {
        Self::attr("text", value)
    }

    /// Select by an attribute pattern
    pub fn matching(name: &str, pattern: &str) -> Result<Self> {
        Ok(Self {
            parts: vec![(name.to_string(), Matcher::Pattern(compile(pattern)?))],
        })
    }

    /// Add an exact attribute requirement
    pub fn and<S: Into<String>>(mut self, name: &str, value: S) -> Self {
        self.parts.push((name.to_string(), Matcher::Exact(value.into())));
        self
    }

    /// Add an attribute pattern requirement
    pub fn and_pattern(mut self, name: &str, pattern: &str) -> Result<Self> {
        self.parts.push((name.to_string(), Matcher::Pattern(compile(pattern)?)));
        Ok(self)
    }

    /// The `(attribute, matcher)` parts, in insertion order
    pub fn parts(&self) -> &[(String, Matcher)] {
        &self.parts
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::configuration(format!("Invalid selector pattern `{}`: {}", pattern, e)))
}

/// Browser driver trait
///
/// The capability Wayfinder consumes a browser through. Every operation may
/// surface [`Error::StaleHandle`] for a detached node or [`Error::Protocol`]
/// for a transient driver failure.
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Current URL of the live document
    async fn current_url(&self) -> Result<String>;

    /// Current document title
    async fn current_title(&self) -> Result<String>;

    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// All nodes matching kind + selector, scoped under `scope` when given
    async fn find_all(
        &self,
        kind: ElementKind,
        selector: &Selector,
        scope: Option<&Handle>,
    ) -> Result<Vec<Handle>>;

    /// Click a node
    async fn click(&self, handle: &Handle) -> Result<()>;

    /// Write a text value into a node
    async fn set_value(&self, handle: &Handle, text: &str) -> Result<()>;

    /// Turn a toggle-like node on
    async fn select(&self, handle: &Handle) -> Result<()>;

    /// Effective value of a node
    async fn read_value(&self, handle: &Handle) -> Result<String>;

    /// Rendered text of a node
    async fn read_text(&self, handle: &Handle) -> Result<String>;

    /// True if the node is attached to the live document
    async fn is_present(&self, handle: &Handle) -> Result<bool>;

    /// True if the node is rendered visibly
    async fn is_visible(&self, handle: &Handle) -> Result<bool>;

    /// True if a toggle-like node is on
    async fn is_selected(&self, handle: &Handle) -> Result<bool>;

    /// Capture a screenshot of the live document
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Serialized source of the live document
    async fn page_source(&self) -> Result<String>;

    /// Close any open modal dialog; true if one was present
    async fn dismiss_dialog(&self, accept: bool) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_helpers() {
        assert!(ElementKind::TextField.is_text_entry());
        assert!(ElementKind::TextArea.is_text_entry());
        assert!(!ElementKind::Button.is_text_entry());

        assert!(ElementKind::Checkbox.is_toggle());
        assert!(ElementKind::Radio.is_toggle());
        assert!(!ElementKind::SelectList.is_toggle());

        assert_eq!(ElementKind::Link.css(), "a");
        assert_eq!(ElementKind::Any.css(), "*");
    }

    #[test]
    fn test_selector_builders() {
        let sel = Selector::id("email").and("type", "text");
        assert_eq!(sel.parts().len(), 2);
        assert_eq!(sel.parts()[0].0, "id");
        assert!(sel.parts()[0].1.matches("email"));
        assert!(!sel.parts()[0].1.matches("password"));
    }

    #[test]
    fn test_pattern_matcher() {
        let sel = Selector::matching("href", r"^/repos/\d+$").unwrap();
        assert!(sel.parts()[0].1.matches("/repos/42"));
        assert!(!sel.parts()[0].1.matches("/repos/latest"));
    }

    #[test]
    fn test_bad_pattern_is_configuration_error() {
        let result = Selector::matching("href", "([unclosed");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
