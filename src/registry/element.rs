//! Element descriptors
//!
//! An element descriptor is the static specification of how to locate one
//! logical UI component on a page: a kind, a resolution strategy, scoping
//! rules, and the policies that govern caching and click destinations.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::driver::{Driver, ElementKind, Handle, Selector};
use crate::registry::Destination;
use crate::session::Resolution;
use crate::{Error, Result};

/// Context handed to a custom resolver function
pub struct ResolverCx<'a> {
    /// The live driver
    pub driver: &'a dyn Driver,
    /// Name of the page being resolved on
    pub page: &'a str,
    /// Resolved parent scope, when the descriptor declares one
    pub scope: Option<&'a Handle>,
    /// Call arguments the element was referenced with
    pub args: &'a [String],
}

/// Custom resolver callback
///
/// Responsible for its own visibility handling; its result is returned
/// directly by element resolution.
pub type ResolverFn =
    Arc<dyn for<'a> Fn(ResolverCx<'a>) -> BoxFuture<'a, Result<Resolution>> + Send + Sync>;

/// How an element is located; exactly one strategy is active
#[derive(Clone)]
pub enum Strategy {
    /// Query by kind + selector
    Locate(Selector),
    /// Call a custom resolver function
    Resolver(ResolverFn),
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Locate(selector) => f.debug_tuple("Locate").field(selector).finish(),
            Strategy::Resolver(_) => f.debug_tuple("Resolver").field(&"<fn>").finish(),
        }
    }
}

/// Element handle caching policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Use the session-wide default
    #[default]
    Inherit,
    On,
    Off,
}

/// Whether resolution yields one node or a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    #[default]
    Single,
    Collection,
}

/// A child that must exist under a candidate node for it to match
#[derive(Debug, Clone)]
pub struct ChildConstraint {
    pub kind: ElementKind,
    pub selector: Selector,
}

/// Static description of one element on a page
#[derive(Debug, Clone)]
pub struct ElementDescriptor {
    name: String,
    kind: ElementKind,
    strategy: Strategy,
    parent: Option<String>,
    children: Vec<ChildConstraint>,
    click_destination: Option<Destination>,
    cache: CachePolicy,
    unique: bool,
    cardinality: Cardinality,
    validator: bool,
}

impl ElementDescriptor {
    /// Start building a descriptor
    pub fn builder<S: Into<String>>(name: S, kind: ElementKind) -> ElementDescriptorBuilder {
        ElementDescriptorBuilder {
            name: name.into(),
            kind,
            selector: None,
            resolver: None,
            parent: None,
            children: Vec::new(),
            click_destination: None,
            cache: CachePolicy::Inherit,
            unique: false,
            cardinality: Cardinality::Single,
            validator: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> &[ChildConstraint] {
        &self.children
    }

    pub fn click_destination(&self) -> Option<&Destination> {
        self.click_destination.as_ref()
    }

    pub fn cache(&self) -> CachePolicy {
        self.cache
    }

    pub fn unique(&self) -> bool {
        self.unique
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_validator(&self) -> bool {
        self.validator
    }
}

/// Builder for [`ElementDescriptor`]
pub struct ElementDescriptorBuilder {
    name: String,
    kind: ElementKind,
    selector: Option<Selector>,
    resolver: Option<ResolverFn>,
    parent: Option<String>,
    children: Vec<ChildConstraint>,
    click_destination: Option<Destination>,
    cache: CachePolicy,
    unique: bool,
    cardinality: Cardinality,
    validator: bool,
}

impl ElementDescriptorBuilder {
    /// Locate by kind + selector
    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Locate through a custom resolver function
    pub fn resolver<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(ResolverCx<'a>) -> BoxFuture<'a, Result<Resolution>> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(f));
        self
    }

    /// Scope queries under the named element of the same page
    pub fn parent<S: Into<String>>(mut self, name: S) -> Self {
        self.parent = Some(name.into());
        self
    }

    /// Require a matching child under every candidate node
    pub fn child(mut self, kind: ElementKind, selector: Selector) -> Self {
        self.children.push(ChildConstraint { kind, selector });
        self
    }

    /// Declare where clicking this element is expected to lead
    pub fn click_destination<D: Into<Destination>>(mut self, destination: D) -> Self {
        self.click_destination = Some(destination.into());
        self
    }

    /// Override the session-wide caching default
    pub fn cache(mut self, on: bool) -> Self {
        self.cache = if on { CachePolicy::On } else { CachePolicy::Off };
        self
    }

    /// Fail resolution if the selector matches more than one node
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Resolve to the full collection of matches
    pub fn collection(mut self) -> Self {
        self.cardinality = Cardinality::Collection;
        self
    }

    /// The element's presence is required proof the page has loaded
    pub fn validator(mut self) -> Self {
        self.validator = true;
        self
    }

    /// Finish the descriptor
    ///
    /// When neither a selector nor a resolver is given the selector
    /// defaults to `id == name`. Giving both is a configuration error.
    pub fn build(self) -> Result<ElementDescriptor> {
        let strategy = match (self.selector, self.resolver) {
            (Some(_), Some(_)) => {
                return Err(Error::configuration(format!(
                    "element `{}` declares both a selector and a resolver",
                    self.name
                )))
            }
            (Some(selector), None) => Strategy::Locate(selector),
            (None, Some(resolver)) => Strategy::Resolver(resolver),
            (None, None) => Strategy::Locate(Selector::id(self.name.clone())),
        };
        Ok(ElementDescriptor {
            name: self.name,
            kind: self.kind,
            strategy,
            parent: self.parent,
            children: self.children,
            click_destination: self.click_destination,
            cache: self.cache,
            unique: self.unique,
            cardinality: self.cardinality,
            validator: self.validator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selector_is_id_equals_name() {
        let desc = ElementDescriptor::builder("email_field", ElementKind::TextField)
            .build()
            .unwrap();
        match desc.strategy() {
            Strategy::Locate(selector) => {
                assert_eq!(selector.parts().len(), 1);
                assert_eq!(selector.parts()[0].0, "id");
                assert!(selector.parts()[0].1.matches("email_field"));
            }
            Strategy::Resolver(_) => panic!("expected a selector strategy"),
        }
    }

    #[test]
    fn test_both_strategies_is_configuration_error() {
        let result = ElementDescriptor::builder("row", ElementKind::Div)
            .selector(Selector::css_class("row"))
            .resolver(|_cx| Box::pin(async { Ok(Resolution::Missing) }))
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_builder_accumulates_policies() {
        let desc = ElementDescriptor::builder("submit_button", ElementKind::Button)
            .selector(Selector::attr("type", "submit"))
            .parent("login_form")
            .child(ElementKind::Span, Selector::css_class("label"))
            .click_destination("home_page")
            .cache(false)
            .unique()
            .validator()
            .build()
            .unwrap();

        assert_eq!(desc.parent(), Some("login_form"));
        assert_eq!(desc.children().len(), 1);
        assert!(desc.click_destination().is_some());
        assert_eq!(desc.cache(), CachePolicy::Off);
        assert!(desc.unique());
        assert!(desc.is_validator());
        assert_eq!(desc.cardinality(), Cardinality::Single);
    }
}
