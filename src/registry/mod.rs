//! Static page model
//!
//! Descriptors are built by calling code at startup, registered into an
//! explicit [`PageRegistry`], and handed to the session at construction.
//! Everything here is immutable after registration.

pub mod element;
pub mod page;

use std::collections::HashMap;
use std::sync::Arc;

use crate::{Error, Result};

pub use element::{
    CachePolicy, Cardinality, ChildConstraint, ElementDescriptor, ElementDescriptorBuilder,
    ResolverCx, ResolverFn, Strategy,
};
pub use page::{PageDescriptor, PageDescriptorBuilder, TitleMatcher, UrlPattern, ValidatorFn};

/// Dense identity of a registered page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(usize);

impl PageId {
    /// Index into the registry's page table
    pub fn index(self) -> usize {
        self.0
    }
}

/// Explicit page registry handed to the session at construction
#[derive(Debug, Default)]
pub struct PageRegistry {
    pages: Vec<Arc<PageDescriptor>>,
    by_name: HashMap<String, PageId>,
}

impl PageRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page descriptor; duplicate names are rejected
    pub fn register(&mut self, descriptor: PageDescriptor) -> Result<PageId> {
        let name = descriptor.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(Error::configuration(format!(
                "page `{}` is already registered",
                name
            )));
        }
        let id = PageId(self.pages.len());
        self.pages.push(Arc::new(descriptor));
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Descriptor for a registered page
    pub fn get(&self, id: PageId) -> Option<&Arc<PageDescriptor>> {
        self.pages.get(id.0)
    }

    /// Look a page up by name
    pub fn lookup(&self, name: &str) -> Option<PageId> {
        self.by_name.get(name).copied()
    }

    /// Name of a registered page
    pub fn name_of(&self, id: PageId) -> &str {
        self.pages[id.0].name()
    }

    /// All registered page ids, in registration order
    pub fn ids(&self) -> impl Iterator<Item = PageId> + '_ {
        (0..self.pages.len()).map(PageId)
    }

    /// Number of registered pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// True if no pages are registered
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Where a click or transition is expected to lead
///
/// Resolves to a set of page ids: a single page is a singleton set, a name
/// looks the page up in the registry, and a list is the recursive union.
/// An unknown name is a configuration error, reported immediately.
#[derive(Debug, Clone)]
pub enum Destination {
    Page(PageId),
    Named(String),
    Many(Vec<Destination>),
}

impl Destination {
    /// Resolve to a deduplicated list of page ids, in declaration order
    pub fn resolve(&self, registry: &PageRegistry) -> Result<Vec<PageId>> {
        let mut out = Vec::new();
        self.collect(registry, &mut out)?;
        Ok(out)
    }

    fn collect(&self, registry: &PageRegistry, out: &mut Vec<PageId>) -> Result<()> {
        match self {
            Destination::Page(id) => {
                if registry.get(*id).is_none() {
                    return Err(Error::configuration(format!(
                        "destination page id {:?} is not registered",
                        id
                    )));
                }
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Destination::Named(name) => {
                let id = registry.lookup(name).ok_or_else(|| {
                    Error::configuration(format!("destination page `{}` is not registered", name))
                })?;
                if !out.contains(&id) {
                    out.push(id);
                }
            }
            Destination::Many(items) => {
                for item in items {
                    item.collect(registry, out)?;
                }
            }
        }
        Ok(())
    }
}

impl From<PageId> for Destination {
    fn from(id: PageId) -> Self {
        Destination::Page(id)
    }
}

impl From<&str> for Destination {
    fn from(name: &str) -> Self {
        Destination::Named(name.to_string())
    }
}

impl From<String> for Destination {
    fn from(name: String) -> Self {
        Destination::Named(name)
    }
}

impl<T: Into<Destination>> From<Vec<T>> for Destination {
    fn from(items: Vec<T>) -> Self {
        Destination::Many(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> (PageRegistry, Vec<PageId>) {
        let mut registry = PageRegistry::new();
        let ids = names
            .iter()
            .map(|name| {
                registry
                    .register(PageDescriptor::builder(*name).url("https://example.com").build().unwrap())
                    .unwrap()
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_register_rejects_duplicate_names() {
        let (mut registry, _) = registry_with(&["login_page"]);
        let result =
            registry.register(PageDescriptor::builder("login_page").build().unwrap());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_lookup_by_name() {
        let (registry, ids) = registry_with(&["login_page", "home_page"]);
        assert_eq!(registry.lookup("home_page"), Some(ids[1]));
        assert_eq!(registry.lookup("missing_page"), None);
        assert_eq!(registry.name_of(ids[0]), "login_page");
    }

    #[test]
    fn test_destination_singleton() {
        let (registry, ids) = registry_with(&["login_page"]);
        let dest: Destination = ids[0].into();
        assert_eq!(dest.resolve(&registry).unwrap(), vec![ids[0]]);
    }

    #[test]
    fn test_destination_named() {
        let (registry, ids) = registry_with(&["login_page", "home_page"]);
        let dest: Destination = "home_page".into();
        assert_eq!(dest.resolve(&registry).unwrap(), vec![ids[1]]);
    }

    #[test]
    fn test_destination_unknown_name_fails_immediately() {
        let (registry, _) = registry_with(&["login_page"]);
        let dest: Destination = "nope_page".into();
        assert!(matches!(
            dest.resolve(&registry),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_destination_nested_union_deduplicates() {
        let (registry, ids) = registry_with(&["a_page", "b_page", "c_page"]);
        let dest = Destination::Many(vec![
            Destination::Named("b_page".to_string()),
            Destination::Many(vec![
                Destination::Page(ids[0]),
                Destination::Named("b_page".to_string()),
            ]),
            Destination::Page(ids[2]),
        ]);
        assert_eq!(
            dest.resolve(&registry).unwrap(),
            vec![ids[1], ids[0], ids[2]]
        );
    }

    #[test]
    fn test_destination_from_vec() {
        let (registry, ids) = registry_with(&["a_page", "b_page"]);
        let dest: Destination = vec!["a_page", "b_page"].into();
        assert_eq!(dest.resolve(&registry).unwrap(), ids);
    }
}
