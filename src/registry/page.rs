//! Page descriptors
//!
//! A page descriptor names one logical state of the remote UI: the URL
//! patterns that identify it, an optional entry URL, its elements, and the
//! signals that prove it has fully loaded. Shared element sets are composed
//! in by value at build time; there is no runtime ancestor walking.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::driver::Driver;
use crate::registry::element::ElementDescriptor;
use crate::{Error, Result};

/// Custom validator predicate over live driver state
pub type ValidatorFn =
    Arc<dyn for<'a> Fn(&'a dyn Driver) -> BoxFuture<'a, Result<bool>> + Send + Sync>;

/// One URL-matching pattern
///
/// `Exact` matches when the URL contains the literal string; `Pattern`
/// holds a regex source compiled once at session construction, after
/// `{base_url}` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPattern {
    Exact(String),
    Pattern(String),
}

/// Expected-title matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleMatcher {
    Exact(String),
    Pattern(String),
}

/// Static description of one page
#[derive(Clone)]
pub struct PageDescriptor {
    name: String,
    url_patterns: Vec<UrlPattern>,
    entry_url: Option<String>,
    expected_title: Option<TitleMatcher>,
    elements: Vec<ElementDescriptor>,
    custom_validators: Vec<(String, ValidatorFn)>,
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("name", &self.name)
            .field("url_patterns", &self.url_patterns)
            .field("entry_url", &self.entry_url)
            .field("expected_title", &self.expected_title)
            .field("elements", &self.elements)
            .field(
                "custom_validators",
                &self
                    .custom_validators
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PageDescriptor {
    /// Start building a descriptor
    pub fn builder<S: Into<String>>(name: S) -> PageDescriptorBuilder {
        PageDescriptorBuilder {
            name: name.into(),
            url_patterns: Vec::new(),
            entry_url: None,
            expected_title: None,
            base_elements: Vec::new(),
            elements: Vec::new(),
            custom_validators: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url_patterns(&self) -> &[UrlPattern] {
        &self.url_patterns
    }

    pub fn entry_url(&self) -> Option<&str> {
        self.entry_url.as_deref()
    }

    pub fn expected_title(&self) -> Option<&TitleMatcher> {
        self.expected_title.as_ref()
    }

    /// Element descriptors, in insertion order
    pub fn elements(&self) -> &[ElementDescriptor] {
        &self.elements
    }

    /// Look an element up by name
    pub fn element(&self, name: &str) -> Option<&ElementDescriptor> {
        self.elements.iter().find(|e| e.name() == name)
    }

    /// Names of the elements whose presence proves the page has loaded
    pub fn validator_elements(&self) -> impl Iterator<Item = &str> {
        self.elements
            .iter()
            .filter(|e| e.is_validator())
            .map(|e| e.name())
    }

    /// Named custom validator predicates
    pub fn custom_validators(&self) -> &[(String, ValidatorFn)] {
        &self.custom_validators
    }
}

/// Builder for [`PageDescriptor`]
pub struct PageDescriptorBuilder {
    name: String,
    url_patterns: Vec<UrlPattern>,
    entry_url: Option<String>,
    expected_title: Option<TitleMatcher>,
    base_elements: Vec<ElementDescriptor>,
    elements: Vec<ElementDescriptor>,
    custom_validators: Vec<(String, ValidatorFn)>,
}

impl PageDescriptorBuilder {
    /// Compose a shared descriptor's elements and custom validators in,
    /// by value. Page-specific elements added later override base
    /// elements of the same name.
    pub fn base(mut self, shared: &PageDescriptor) -> Self {
        self.base_elements.extend(shared.elements.iter().cloned());
        self.custom_validators
            .extend(shared.custom_validators.iter().cloned());
        self
    }

    /// Add a literal URL pattern (matches when the URL contains it)
    pub fn url<S: Into<String>>(mut self, url: S) -> Self {
        self.url_patterns.push(UrlPattern::Exact(url.into()));
        self
    }

    /// Add a regex URL pattern
    pub fn url_matching<S: Into<String>>(mut self, pattern: S) -> Self {
        self.url_patterns.push(UrlPattern::Pattern(pattern.into()));
        self
    }

    /// URL template the page can be entered through directly
    pub fn entry_url<S: Into<String>>(mut self, url: S) -> Self {
        self.entry_url = Some(url.into());
        self
    }

    /// Exact expected document title
    pub fn expected_title<S: Into<String>>(mut self, title: S) -> Self {
        self.expected_title = Some(TitleMatcher::Exact(title.into()));
        self
    }

    /// Expected document title pattern
    pub fn title_matching<S: Into<String>>(mut self, pattern: S) -> Self {
        self.expected_title = Some(TitleMatcher::Pattern(pattern.into()));
        self
    }

    /// Add an element descriptor
    ///
    /// Replaces a base element of the same name; a duplicate among the
    /// page's own additions is a configuration error, caught at build.
    pub fn element(mut self, descriptor: ElementDescriptor) -> Self {
        self.elements.push(descriptor);
        self
    }

    /// Add a named custom validator predicate
    pub fn validate_with<S, F>(mut self, name: S, predicate: F) -> Self
    where
        S: Into<String>,
        F: for<'a> Fn(&'a dyn Driver) -> BoxFuture<'a, Result<bool>> + Send + Sync + 'static,
    {
        self.custom_validators
            .push((name.into(), Arc::new(predicate)));
        self
    }

    /// Finish the descriptor
    ///
    /// Page-specific elements override base elements of the same name; a
    /// name appearing twice among the page's own additions is a duplicate.
    pub fn build(self) -> Result<PageDescriptor> {
        let mut elements = self.base_elements;
        let mut page_level: Vec<String> = Vec::new();
        for descriptor in self.elements {
            if page_level.iter().any(|n| n == descriptor.name()) {
                return Err(Error::configuration(format!(
                    "page `{}` declares element `{}` more than once",
                    self.name,
                    descriptor.name()
                )));
            }
            page_level.push(descriptor.name().to_string());
            match elements.iter().position(|e| e.name() == descriptor.name()) {
                Some(idx) => elements[idx] = descriptor,
                None => elements.push(descriptor),
            }
        }
        Ok(PageDescriptor {
            name: self.name,
            url_patterns: self.url_patterns,
            entry_url: self.entry_url,
            expected_title: self.expected_title,
            elements,
            custom_validators: self.custom_validators,
        })
    }
}
