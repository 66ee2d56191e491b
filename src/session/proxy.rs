//! Element resolution and resilience proxy
//!
//! Lazily resolves an element descriptor to a live handle, caches the
//! handle across repeated use, detects when a cached handle has gone stale,
//! and transparently re-resolves and retries the failed operation exactly
//! once before giving up. Text and toggle writes are polled to convergence
//! because remote automation protocols silently drop keystrokes.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::driver::{Driver, Handle};
use crate::registry::{CachePolicy, Cardinality, ElementDescriptor, ResolverCx, Strategy};
use crate::replay::ReplaySink;
use crate::{Error, Result};

/// Outcome of resolving an element descriptor
///
/// `Missing` and `NotUnique` are valid placeholder results: presence-style
/// probes on them answer `false`, interaction operations fail with a
/// resolution error naming the condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one live node
    One(Handle),
    /// A collection of live nodes
    Many(Vec<Handle>),
    /// Nothing matched
    Missing,
    /// More than one node matched a descriptor declared unique
    NotUnique(usize),
}

/// The enumerated operation set a proxy can run against an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementOp {
    Click,
    SetText(String),
    Select,
    ReadText,
    ReadValue,
    IsPresent,
    IsVisible,
    IsSelected,
    Count,
}

impl ElementOp {
    /// Operation name for logs and error text; never exposes payloads
    pub fn name(&self) -> &'static str {
        match self {
            ElementOp::Click => "click",
            ElementOp::SetText(_) => "set_text",
            ElementOp::Select => "select",
            ElementOp::ReadText => "read_text",
            ElementOp::ReadValue => "read_value",
            ElementOp::IsPresent => "is_present",
            ElementOp::IsVisible => "is_visible",
            ElementOp::IsSelected => "is_selected",
            ElementOp::Count => "count",
        }
    }
}

/// Result of an element operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpValue {
    None,
    Text(String),
    Flag(bool),
    Count(usize),
}

impl OpValue {
    /// The text payload, or empty for non-text results
    pub fn into_text(self) -> String {
        match self {
            OpValue::Text(text) => text,
            _ => String::new(),
        }
    }

    /// The boolean payload, or false for non-flag results
    pub fn as_flag(&self) -> bool {
        matches!(self, OpValue::Flag(true))
    }

    /// The count payload, or zero for non-count results
    pub fn as_count(&self) -> usize {
        match self {
            OpValue::Count(n) => *n,
            _ => 0,
        }
    }
}

/// Format an element reference for logs, hiding credential-smelling data
pub(crate) fn describe_payload(name: &str, args: &[String]) -> String {
    let blob = format!("{} {:?}", name, args).to_lowercase();
    if blob.contains("password") || blob.contains("login") {
        format!("`{}` [redacted]", name)
    } else if args.is_empty() {
        format!("`{}`", name)
    } else {
        format!("`{}` with args {:?}", name, args)
    }
}

type ProxyKey = (String, Vec<String>);

#[derive(Debug, Default)]
struct ProxyState {
    cached: Option<Resolution>,
    /// Set after a successful stale recovery; caching stays off for good
    broken: bool,
}

/// Per-page table of proxy instances, keyed by (element name, call args)
#[derive(Debug, Default)]
pub(crate) struct ProxyTable {
    map: HashMap<ProxyKey, ProxyState>,
}

impl ProxyTable {
    /// Discard every cached resolution
    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }
}

/// Borrowing facade over one page's element table and the live driver
pub struct ElementProxy<'a> {
    driver: &'a dyn Driver,
    sink: &'a dyn ReplaySink,
    config: &'a Config,
    page: &'a crate::registry::PageDescriptor,
    table: &'a mut ProxyTable,
}

impl<'a> ElementProxy<'a> {
    pub(crate) fn new(
        driver: &'a dyn Driver,
        sink: &'a dyn ReplaySink,
        config: &'a Config,
        page: &'a crate::registry::PageDescriptor,
        table: &'a mut ProxyTable,
    ) -> Self {
        Self {
            driver,
            sink,
            config,
            page,
            table,
        }
    }

    fn descriptor(&self, name: &str) -> Result<ElementDescriptor> {
        self.page.element(name).cloned().ok_or_else(|| {
            Error::configuration(format!(
                "page `{}` has no element `{}`",
                self.page.name(),
                name
            ))
        })
    }

    /// Effective cache flag for this proxy instance
    fn cache_enabled(&self, descriptor: &ElementDescriptor, key: &ProxyKey) -> bool {
        let policy = match descriptor.cache() {
            CachePolicy::On => true,
            CachePolicy::Off => false,
            CachePolicy::Inherit => self.config.cache_elements,
        };
        policy && !self.table.map.get(key).map(|s| s.broken).unwrap_or(false)
    }

    /// Resolve an element to a live handle
    ///
    /// With `use_cache` a previously resolved handle is returned as-is;
    /// without it the query always runs. Transient protocol failures retry
    /// the whole resolution before surfacing a resolution error.
    pub fn resolve<'s>(
        &'s mut self,
        name: &'s str,
        args: &'s [String],
        use_cache: bool,
    ) -> BoxFuture<'s, Result<Resolution>> {
        Box::pin(async move {
            let descriptor = self.descriptor(name)?;
            let key: ProxyKey = (name.to_string(), args.to_vec());
            let cacheable = self.cache_enabled(&descriptor, &key);

            if use_cache && cacheable {
                if let Some(hit) = self.table.map.get(&key).and_then(|s| s.cached.clone()) {
                    debug!(
                        "ElementProxy: cache hit for {}",
                        describe_payload(name, args)
                    );
                    return Ok(hit);
                }
            }

            // Parent-first recursive scoping
            let scope = match descriptor.parent() {
                Some(parent) => {
                    let parent_name = parent.to_string();
                    match self.resolve(&parent_name, &[], use_cache).await? {
                        Resolution::One(handle) => Some(handle),
                        Resolution::Many(handles) => match handles.into_iter().next() {
                            Some(handle) => Some(handle),
                            None => return Ok(Resolution::Missing),
                        },
                        Resolution::Missing | Resolution::NotUnique(_) => {
                            debug!(
                                "ElementProxy: parent `{}` of `{}` did not resolve",
                                parent_name, name
                            );
                            return Ok(Resolution::Missing);
                        }
                    }
                }
                None => None,
            };

            let attempts = self.config.resolve_retries.max(1);
            let mut last_err = None;
            for attempt in 1..=attempts {
                match self.resolve_once(&descriptor, scope.as_ref(), args).await {
                    Ok(resolution) => {
                        if cacheable {
                            if let Resolution::One(_) | Resolution::Many(_) = resolution {
                                self.table
                                    .map
                                    .entry(key)
                                    .or_default()
                                    .cached = Some(resolution.clone());
                            }
                        }
                        return Ok(resolution);
                    }
                    Err(err) if err.is_transient() => {
                        warn!(
                            "ElementProxy: resolution attempt {}/{} for `{}` failed: {}",
                            attempt, attempts, name, err
                        );
                        last_err = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }

            if self.config.debug {
                self.sink
                    .pause(&format!("resolution of `{}` kept failing", name))
                    .await;
            }
            Err(Error::resolution(format!(
                "element `{}` on page `{}`: {} resolution attempts failed, last error: {}",
                name,
                self.page.name(),
                attempts,
                last_err.map(|e| e.to_string()).unwrap_or_default()
            )))
        })
    }

    /// One resolution sweep, no retries
    async fn resolve_once(
        &self,
        descriptor: &ElementDescriptor,
        scope: Option<&Handle>,
        args: &[String],
    ) -> Result<Resolution> {
        let selector = match descriptor.strategy() {
            Strategy::Resolver(resolver) => {
                // A custom resolver owns its own visibility handling
                let cx = ResolverCx {
                    driver: self.driver,
                    page: self.page.name(),
                    scope,
                    args,
                };
                return resolver(cx).await;
            }
            Strategy::Locate(selector) => selector,
        };

        let mut matches = self
            .driver
            .find_all(descriptor.kind(), selector, scope)
            .await?;

        // Keep only candidates containing all declared children
        if !descriptor.children().is_empty() {
            let mut kept = Vec::new();
            for candidate in matches {
                let mut all_present = true;
                for child in descriptor.children() {
                    let found = self
                        .driver
                        .find_all(child.kind, &child.selector, Some(&candidate))
                        .await?;
                    if found.is_empty() {
                        all_present = false;
                        break;
                    }
                }
                if all_present {
                    kept.push(candidate);
                }
            }
            matches = kept;
        }

        if descriptor.cardinality() == Cardinality::Collection {
            return Ok(Resolution::Many(matches));
        }
        if descriptor.unique() && matches.len() > 1 {
            warn!(
                "ElementProxy: `{}` is declared unique but matched {} nodes",
                descriptor.name(),
                matches.len()
            );
            return Ok(Resolution::NotUnique(matches.len()));
        }
        match matches.len() {
            0 => Ok(Resolution::Missing),
            1 => Ok(Resolution::One(matches.remove(0))),
            n => {
                warn!(
                    "ElementProxy: `{}` matched {} nodes; preferring the first visible",
                    descriptor.name(),
                    n
                );
                for handle in &matches {
                    let present = self.driver.is_present(handle).await.unwrap_or(false);
                    let visible = self.driver.is_visible(handle).await.unwrap_or(false);
                    if present && visible {
                        return Ok(Resolution::One(handle.clone()));
                    }
                }
                Ok(Resolution::One(matches.remove(0)))
            }
        }
    }

    /// Run one operation, recovering from a stale cached handle once
    #[instrument(skip(self, args, op))]
    pub async fn invoke(
        &mut self,
        name: &str,
        args: &[String],
        op: ElementOp,
    ) -> Result<OpValue> {
        debug!(
            "ElementProxy: {} on {}",
            op.name(),
            describe_payload(name, args)
        );
        let descriptor = self.descriptor(name)?;
        let key: ProxyKey = (name.to_string(), args.to_vec());
        let cacheable = self.cache_enabled(&descriptor, &key);

        let resolution = self.resolve(name, args, true).await?;
        match self.apply(&descriptor, &resolution, &op).await {
            Err(err) if err.is_stale() && cacheable => {
                warn!(
                    "ElementProxy: cached handle for `{}` went stale; re-resolving once",
                    name
                );
                let fresh = self.resolve(name, args, false).await?;
                match self.apply(&descriptor, &fresh, &op).await {
                    Ok(value) => {
                        // One-time cost for long-run correctness: this
                        // proxy instance stops caching for good.
                        warn!(
                            "ElementProxy: stale recovery for `{}` succeeded; caching disabled",
                            name
                        );
                        let state = self.table.map.entry(key).or_default();
                        state.cached = None;
                        state.broken = true;
                        Ok(value)
                    }
                    Err(err) => Err(err),
                }
            }
            other => other,
        }
    }

    async fn apply(
        &self,
        descriptor: &ElementDescriptor,
        resolution: &Resolution,
        op: &ElementOp,
    ) -> Result<OpValue> {
        match resolution {
            Resolution::Missing => match op {
                ElementOp::IsPresent | ElementOp::IsVisible | ElementOp::IsSelected => {
                    Ok(OpValue::Flag(false))
                }
                ElementOp::Count => Ok(OpValue::Count(0)),
                _ => Err(Error::resolution(format!(
                    "element `{}` not found on page `{}`",
                    descriptor.name(),
                    self.page.name()
                ))),
            },
            Resolution::NotUnique(n) => match op {
                ElementOp::IsPresent | ElementOp::IsVisible | ElementOp::IsSelected => {
                    Ok(OpValue::Flag(false))
                }
                ElementOp::Count => Ok(OpValue::Count(*n)),
                _ => Err(Error::resolution(format!(
                    "element `{}` matched {} nodes but is declared unique",
                    descriptor.name(),
                    n
                ))),
            },
            Resolution::Many(handles) => match op {
                ElementOp::Count => Ok(OpValue::Count(handles.len())),
                ElementOp::IsPresent => Ok(OpValue::Flag(!handles.is_empty())),
                _ => Err(Error::resolution(format!(
                    "element `{}` resolves to a collection; `{}` needs a single node",
                    descriptor.name(),
                    op.name()
                ))),
            },
            Resolution::One(handle) => match op {
                ElementOp::Click => {
                    self.driver.click(handle).await?;
                    Ok(OpValue::None)
                }
                ElementOp::SetText(text) => {
                    self.driver.set_value(handle, text).await?;
                    Ok(OpValue::None)
                }
                ElementOp::Select => {
                    self.driver.select(handle).await?;
                    Ok(OpValue::None)
                }
                ElementOp::ReadText => {
                    Ok(OpValue::Text(self.driver.read_text(handle).await?))
                }
                ElementOp::ReadValue => {
                    Ok(OpValue::Text(self.driver.read_value(handle).await?))
                }
                ElementOp::IsPresent => {
                    Ok(OpValue::Flag(self.driver.is_present(handle).await?))
                }
                ElementOp::IsVisible => {
                    Ok(OpValue::Flag(self.driver.is_visible(handle).await?))
                }
                ElementOp::IsSelected => {
                    Ok(OpValue::Flag(self.driver.is_selected(handle).await?))
                }
                ElementOp::Count => Ok(OpValue::Count(1)),
            },
        }
    }

    /// Write a value and poll it to convergence
    ///
    /// Text-entry and toggle kinds are re-read and re-written until the
    /// effective state matches; every other kind writes once.
    #[instrument(skip(self, args, value))]
    pub async fn set(&mut self, name: &str, args: &[String], value: &str) -> Result<()> {
        let descriptor = self.descriptor(name)?;

        if descriptor.kind().is_text_entry() {
            self.invoke(name, args, ElementOp::SetText(value.to_string()))
                .await?;
            for _ in 1..=self.config.set_retries {
                let current = self
                    .invoke(name, args, ElementOp::ReadValue)
                    .await?
                    .into_text();
                if current == value {
                    debug!("ElementProxy: text entry into `{}` verified", name);
                    return Ok(());
                }
                debug!(
                    "ElementProxy: `{}` has not taken the write yet; retrying in {} ms",
                    name, self.config.set_wait_ms
                );
                tokio::time::sleep(Duration::from_millis(self.config.set_wait_ms)).await;
                self.resolve(name, args, false).await?;
                self.invoke(name, args, ElementOp::SetText(value.to_string()))
                    .await?;
            }
            let current = self
                .invoke(name, args, ElementOp::ReadValue)
                .await?
                .into_text();
            if current == value {
                return Ok(());
            }
            Err(Error::write_verification(format!(
                "text entry into `{}` never converged after {} retries",
                name, self.config.set_retries
            )))
        } else if descriptor.kind().is_toggle() {
            self.invoke(name, args, ElementOp::Select).await?;
            for _ in 1..=self.config.set_retries {
                if self
                    .invoke(name, args, ElementOp::IsSelected)
                    .await?
                    .as_flag()
                {
                    debug!("ElementProxy: toggle `{}` verified", name);
                    return Ok(());
                }
                debug!(
                    "ElementProxy: `{}` is not selected yet; retrying in {} ms",
                    name, self.config.set_wait_ms
                );
                tokio::time::sleep(Duration::from_millis(self.config.set_wait_ms)).await;
                self.resolve(name, args, false).await?;
                self.invoke(name, args, ElementOp::Select).await?;
            }
            if self
                .invoke(name, args, ElementOp::IsSelected)
                .await?
                .as_flag()
            {
                return Ok(());
            }
            Err(Error::write_verification(format!(
                "toggle `{}` never converged after {} retries",
                name, self.config.set_retries
            )))
        } else {
            self.invoke(name, args, ElementOp::SetText(value.to_string()))
                .await
                .map(|_| ())
        }
    }
}
