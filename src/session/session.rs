//! The session state machine
//!
//! A `Session` owns the driver, the page registry, and one live `Page` per
//! registered descriptor. It tracks which page the browser is believed to
//! be on, revalidates that belief before every element operation, and
//! drives explicit page transitions with bounded polling.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::driver::Driver;
use crate::registry::{Destination, PageId, PageRegistry};
use crate::replay::{NoteLevel, ReplaySink};
use crate::session::page::{DriverAction, Page};
use crate::session::proxy::{describe_payload, ElementOp, OpValue, Resolution};
use crate::{Error, Result};

/// What fires a page transition
pub enum Trigger {
    /// Click a named element on the current page
    Click { element: String, args: Vec<String> },
    /// Run an arbitrary driver action
    Action(DriverAction),
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Click { element, args } => f
                .debug_struct("Click")
                .field("element", element)
                .field("args", args)
                .finish(),
            Trigger::Action(_) => f.write_str("Action(..)"),
        }
    }
}

/// Why a transition did not confirm
///
/// `ValidatorsMissing` is the more specific signal: the browser reached a
/// candidate page's URL but the page never proved itself loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionFailure {
    /// The URL never matched any destination page
    UrlMismatch { url: String },
    /// A destination page's URL matched but its validation did not hold
    ValidatorsMissing { page: String, signal: String },
}

/// Outcome of a [`Session::change_pages`] call
#[derive(Debug, Clone)]
pub struct TransitionReport {
    /// Whether a destination page was confirmed
    pub success: bool,
    /// Polling iterations consumed
    pub attempts: u32,
    /// The confirmed page, on success
    pub page: Option<PageId>,
    /// The most specific failure observed, on failure
    pub failure: Option<TransitionFailure>,
    /// Human-readable diagnostic
    pub detail: String,
}

/// The session state machine
#[derive(Debug)]
pub struct Session {
    driver: Arc<dyn Driver>,
    config: Arc<Config>,
    sink: Arc<dyn ReplaySink>,
    registry: PageRegistry,
    pages: Vec<Page>,
    current_page: Option<PageId>,
    acceptable_pages: Option<Vec<PageId>>,
    previous_url: Option<String>,
}

impl Session {
    /// Build a session over a driver and a registry of page descriptors
    ///
    /// Every page's URL patterns are substituted and compiled here, so a
    /// bad pattern fails construction instead of a dispatch much later.
    pub fn new(
        driver: Arc<dyn Driver>,
        registry: PageRegistry,
        config: Config,
        sink: Arc<dyn ReplaySink>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let mut pages = Vec::with_capacity(registry.len());
        for id in registry.ids() {
            let descriptor = registry
                .get(id)
                .cloned()
                .ok_or_else(|| Error::configuration(format!("page id {:?} out of range", id)))?;
            pages.push(Page::new(
                descriptor,
                driver.clone(),
                sink.clone(),
                config.clone(),
            )?);
        }
        info!("Session: ready with {} registered page(s)", pages.len());
        Ok(Self {
            driver,
            config,
            sink,
            registry,
            pages,
            current_page: None,
            acceptable_pages: None,
            previous_url: None,
        })
    }

    /// The page the browser is currently believed to be on
    pub fn current_page(&self) -> Option<&Page> {
        self.current_page.map(|id| &self.pages[id.index()])
    }

    /// Name of the current page, when one is known
    pub fn current_page_name(&self) -> Option<&str> {
        self.current_page.map(|id| self.registry.name_of(id))
    }

    /// Name of a registered page
    pub fn page_name(&self, id: PageId) -> &str {
        self.registry.name_of(id)
    }

    /// Names of the pages currently considered acceptable; `None` means
    /// any registered page is acceptable
    pub fn acceptable_page_names(&self) -> Option<Vec<&str>> {
        self.acceptable_pages
            .as_ref()
            .map(|ids| ids.iter().map(|id| self.registry.name_of(*id)).collect())
    }

    /// Constrain (or with `None` unconstrain) which pages revalidation may
    /// adopt
    pub fn set_acceptable_pages<D: Into<Destination>>(
        &mut self,
        destination: Option<D>,
    ) -> Result<()> {
        match destination {
            Some(dest) => {
                let ids = dest.into().resolve(&self.registry)?;
                let names: Vec<&str> =
                    ids.iter().map(|id| self.registry.name_of(*id)).collect();
                info!("Session: acceptable pages now {:?}", names);
                self.acceptable_pages = Some(ids);
            }
            None => {
                info!("Session: any registered page is now acceptable");
                self.acceptable_pages = None;
            }
        }
        Ok(())
    }

    /// Enter a page directly through its entry URL and confirm arrival
    ///
    /// Entry narrows the acceptable set to the entered page; widen it with
    /// [`Session::set_acceptable_pages`] when out-of-band navigation away
    /// from it is expected.
    #[instrument(skip(self, destination))]
    pub async fn enter<D: Into<Destination>>(&mut self, destination: D) -> Result<()> {
        let ids = destination.into().resolve(&self.registry)?;
        let id = match ids.as_slice() {
            [id] => *id,
            _ => {
                return Err(Error::configuration(format!(
                    "enter needs exactly one destination page, got {}",
                    ids.len()
                )))
            }
        };
        self.set_acceptable_pages(Some(id))?;
        self.pages[id.index()].enter().await?;
        self.adopt(id).await
    }

    /// Believe the browser is on `id`: clear the departed and adopted
    /// pages' element caches, confirm arrival passively, and record the
    /// URL for the fast path.
    async fn adopt(&mut self, id: PageId) -> Result<()> {
        if self.current_page != Some(id) {
            if let Some(previous) = self.current_page {
                self.pages[previous.index()].clear_element_caches();
            }
            self.pages[id.index()].clear_element_caches();
            info!("Session: now on page `{}`", self.registry.name_of(id));
            self.sink.note(
                NoteLevel::Info,
                &format!("now on page `{}`", self.registry.name_of(id)),
            );
        }
        self.current_page = Some(id);
        self.pages[id.index()].arrived(None).await?;
        self.previous_url = Some(self.driver.current_url().await?);
        Ok(())
    }

    /// Re-establish which page the browser is on
    ///
    /// Fast path: the URL has not changed since the last dispatch and the
    /// current page is still in the acceptable set, so no page sweep runs.
    /// Otherwise candidate pages (the acceptable set, or every registered
    /// page) are swept against the live URL under the revalidation polling
    /// budget.
    #[instrument(skip(self))]
    pub async fn revalidate(&mut self) -> Result<()> {
        let url = self.driver.current_url().await?;
        if let Some(current) = self.current_page {
            let still_acceptable = self
                .acceptable_pages
                .as_ref()
                .map(|ids| ids.contains(&current))
                .unwrap_or(true);
            if still_acceptable && self.previous_url.as_deref() == Some(url.as_str()) {
                return Ok(());
            }
        }

        let candidates: Vec<PageId> = match &self.acceptable_pages {
            Some(ids) => ids.clone(),
            None => self.registry.ids().collect(),
        };

        let attempts = self.config.revalidate_attempts.max(1);
        let mut url = url;
        for attempt in 1..=attempts {
            if let Some(id) = candidates
                .iter()
                .copied()
                .find(|id| self.pages[id.index()].matches_url(&url))
            {
                debug!(
                    "Session: revalidate matched `{}` on attempt {}",
                    self.registry.name_of(id),
                    attempt
                );
                return self.adopt(id).await;
            }
            if attempt < attempts {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.revalidate_interval_ms,
                ))
                .await;
                url = self.driver.current_url().await?;
            }
        }

        let names: Vec<&str> = candidates
            .iter()
            .map(|id| self.registry.name_of(*id))
            .collect();
        Err(Error::transition_timeout(format!(
            "current URL `{}` matched none of the acceptable pages {:?}",
            url, names
        )))
    }

    /// Drive a transition: fire `trigger` and poll until one of the
    /// destination pages confirms arrival
    ///
    /// Each polling iteration first checks the live URL against the
    /// destinations; the trigger is only (re)fired while no destination
    /// matches, so a slow navigation is never double-triggered. Exhausting
    /// the budget returns a failed report, not an error: the caller decides
    /// whether an unconfirmed transition is fatal.
    #[instrument(skip(self, trigger, destination))]
    pub async fn change_pages<D: Into<Destination>>(
        &mut self,
        trigger: Trigger,
        destination: D,
    ) -> Result<TransitionReport> {
        let targets = destination.into().resolve(&self.registry)?;
        if targets.is_empty() {
            return Err(Error::configuration(
                "change_pages destination resolves to no pages",
            ));
        }
        let target_names: Vec<String> = targets
            .iter()
            .map(|id| self.registry.name_of(*id).to_string())
            .collect();
        info!("Session: change_pages toward {:?}", target_names);
        // The destination set becomes acceptable before the trigger fires,
        // so dispatches police against where the session is headed even
        // when the transition never confirms.
        self.set_acceptable_pages(Some(targets.clone()))?;

        let attempts = self.config.transition_attempts.max(1);
        let mut last_failure: Option<TransitionFailure> = None;
        for attempt in 1..=attempts {
            let mut url = self.driver.current_url().await?;
            let mut matched = targets
                .iter()
                .copied()
                .find(|id| self.pages[id.index()].matches_url(&url));

            if matched.is_none() {
                if let Err(err) = self.fire(&trigger).await {
                    debug!(
                        "Session: change_pages: trigger failed on attempt {}: {}",
                        attempt, err
                    );
                }
                url = self.driver.current_url().await?;
                matched = targets
                    .iter()
                    .copied()
                    .find(|id| self.pages[id.index()].matches_url(&url));
            }

            match matched {
                Some(id) => {
                    let status = self.pages[id.index()].arrival_check().await?;
                    if status.is_arrived() {
                        self.adopt(id).await?;
                        self.acceptable_pages = Some(vec![id]);
                        return Ok(TransitionReport {
                            success: true,
                            attempts: attempt,
                            page: Some(id),
                            failure: None,
                            detail: format!(
                                "arrived at `{}` after {} attempt(s)",
                                self.registry.name_of(id),
                                attempt
                            ),
                        });
                    }
                    // URL reached but validation did not hold; the more
                    // specific signal wins over any earlier URL mismatch.
                    last_failure = Some(TransitionFailure::ValidatorsMissing {
                        page: self.registry.name_of(id).to_string(),
                        signal: status.describe(),
                    });
                }
                None => {
                    if !matches!(
                        last_failure,
                        Some(TransitionFailure::ValidatorsMissing { .. })
                    ) {
                        last_failure = Some(TransitionFailure::UrlMismatch { url: url.clone() });
                    }
                }
            }

            if attempt < attempts {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.transition_interval_ms,
                ))
                .await;
            }
        }

        let detail = match &last_failure {
            Some(TransitionFailure::ValidatorsMissing { page, signal }) => format!(
                "reached `{}` but it never validated: {}",
                page, signal
            ),
            Some(TransitionFailure::UrlMismatch { url }) => format!(
                "URL `{}` never matched any of {:?}",
                url, target_names
            ),
            None => format!("no destination in {:?} confirmed", target_names),
        };
        warn!("Session: change_pages failed: {}", detail);
        self.sink.note(NoteLevel::Error, &detail);
        if self.config.debug {
            self.sink.capture(self.driver.as_ref()).await;
        }
        Ok(TransitionReport {
            success: false,
            attempts,
            page: None,
            failure: last_failure,
            detail,
        })
    }

    async fn fire(&mut self, trigger: &Trigger) -> Result<()> {
        match trigger {
            Trigger::Click { element, args } => {
                let current = self.current_page.ok_or_else(|| {
                    Error::configuration("no current page to fire a click from")
                })?;
                self.pages[current.index()]
                    .invoke(element, args, ElementOp::Click)
                    .await
                    .map(|_| ())
            }
            Trigger::Action(action) => action(self.driver.as_ref()).await,
        }
    }

    /// Revalidate, then hand the operation to the current page's proxy
    #[instrument(skip(self, args, op))]
    async fn dispatch(&mut self, element: &str, args: &[String], op: ElementOp) -> Result<OpValue> {
        let described = describe_payload(element, args);
        info!("Session: {} on {}", op.name(), described);
        self.sink
            .note(NoteLevel::Info, &format!("{} {}", op.name(), described));
        self.revalidate().await?;
        if self.config.debug {
            self.sink.capture(self.driver.as_ref()).await;
        }
        let current = self.require_current()?;
        self.pages[current.index()].invoke(element, args, op).await
    }

    fn require_current(&self) -> Result<PageId> {
        self.current_page
            .ok_or_else(|| Error::configuration("session has no current page; call enter first"))
    }

    /// Click an element; a declared click destination routes the click
    /// through [`Session::change_pages`]
    pub async fn click(&mut self, element: &str) -> Result<()> {
        self.click_with(element, &[]).await
    }

    /// [`Session::click`] with resolver arguments
    pub async fn click_with(&mut self, element: &str, args: &[String]) -> Result<()> {
        let described = describe_payload(element, args);
        info!("Session: click on {}", described);
        self.sink
            .note(NoteLevel::Info, &format!("click {}", described));
        self.revalidate().await?;
        if self.config.debug {
            self.sink.capture(self.driver.as_ref()).await;
        }
        let current = self.require_current()?;
        match self.pages[current.index()].click_destination(element)? {
            Some(destination) => {
                let report = self
                    .change_pages(
                        Trigger::Click {
                            element: element.to_string(),
                            args: args.to_vec(),
                        },
                        destination,
                    )
                    .await?;
                if report.success {
                    Ok(())
                } else {
                    Err(Error::transition_timeout(report.detail))
                }
            }
            None => self.pages[current.index()]
                .invoke(element, args, ElementOp::Click)
                .await
                .map(|_| ()),
        }
    }

    /// Write a value into an element, polling text entries and toggles to
    /// convergence
    pub async fn set(&mut self, element: &str, value: &str) -> Result<()> {
        self.set_with(element, &[], value).await
    }

    /// [`Session::set`] with resolver arguments
    pub async fn set_with(&mut self, element: &str, args: &[String], value: &str) -> Result<()> {
        let described = describe_payload(element, args);
        info!("Session: set on {}", described);
        self.sink
            .note(NoteLevel::Info, &format!("set {}", described));
        self.revalidate().await?;
        if self.config.debug {
            self.sink.capture(self.driver.as_ref()).await;
        }
        let current = self.require_current()?;
        self.pages[current.index()].set(element, args, value).await
    }

    /// Rendered text of an element
    pub async fn text(&mut self, element: &str) -> Result<String> {
        self.text_with(element, &[]).await
    }

    pub async fn text_with(&mut self, element: &str, args: &[String]) -> Result<String> {
        Ok(self
            .dispatch(element, args, ElementOp::ReadText)
            .await?
            .into_text())
    }

    /// Effective value of an element
    pub async fn value(&mut self, element: &str) -> Result<String> {
        self.value_with(element, &[]).await
    }

    pub async fn value_with(&mut self, element: &str, args: &[String]) -> Result<String> {
        Ok(self
            .dispatch(element, args, ElementOp::ReadValue)
            .await?
            .into_text())
    }

    /// True if an element is present on the current page
    pub async fn present(&mut self, element: &str) -> Result<bool> {
        self.present_with(element, &[]).await
    }

    pub async fn present_with(&mut self, element: &str, args: &[String]) -> Result<bool> {
        Ok(self
            .dispatch(element, args, ElementOp::IsPresent)
            .await?
            .as_flag())
    }

    /// True if an element is rendered visibly
    pub async fn visible(&mut self, element: &str) -> Result<bool> {
        self.visible_with(element, &[]).await
    }

    pub async fn visible_with(&mut self, element: &str, args: &[String]) -> Result<bool> {
        Ok(self
            .dispatch(element, args, ElementOp::IsVisible)
            .await?
            .as_flag())
    }

    /// True if a toggle-like element is on
    pub async fn selected(&mut self, element: &str) -> Result<bool> {
        self.selected_with(element, &[]).await
    }

    pub async fn selected_with(&mut self, element: &str, args: &[String]) -> Result<bool> {
        Ok(self
            .dispatch(element, args, ElementOp::IsSelected)
            .await?
            .as_flag())
    }

    /// Number of nodes an element resolves to
    pub async fn count(&mut self, element: &str) -> Result<usize> {
        self.count_with(element, &[]).await
    }

    pub async fn count_with(&mut self, element: &str, args: &[String]) -> Result<usize> {
        Ok(self
            .dispatch(element, args, ElementOp::Count)
            .await?
            .as_count())
    }

    /// Run any enumerated operation against an element
    pub async fn perform(
        &mut self,
        element: &str,
        args: &[String],
        op: ElementOp,
    ) -> Result<OpValue> {
        self.dispatch(element, args, op).await
    }

    /// Resolve an element without operating on it
    pub async fn resolve(
        &mut self,
        element: &str,
        args: &[String],
        use_cache: bool,
    ) -> Result<Resolution> {
        self.revalidate().await?;
        let current = self.require_current()?;
        self.pages[current.index()]
            .resolve(element, args, use_cache)
            .await
    }

    /// Close an open modal dialog by accepting it; true if one was present
    pub async fn accept_dialog(&mut self) -> Result<bool> {
        info!("Session: accepting dialog");
        self.driver.dismiss_dialog(true).await
    }

    /// Close an open modal dialog by dismissing it; true if one was present
    pub async fn dismiss_dialog(&mut self) -> Result<bool> {
        info!("Session: dismissing dialog");
        self.driver.dismiss_dialog(false).await
    }
}
