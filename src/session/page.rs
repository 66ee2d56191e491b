//! Live page instances
//!
//! A `Page` is a descriptor bound to the live driver: it owns the page's
//! element proxy table, answers "does this URL belong to me", and runs the
//! arrival state machine. Arrival is a soft retry loop followed by one hard
//! strict check, because a page can flicker through unready DOM states
//! several times before settling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use regex::Regex;
use tracing::{debug, info};

use crate::config::Config;
use crate::driver::Driver;
use crate::registry::{Destination, PageDescriptor, TitleMatcher, UrlPattern};
use crate::replay::{NoteLevel, ReplaySink};
use crate::session::proxy::{ElementOp, ElementProxy, OpValue, ProxyTable, Resolution};
use crate::{Error, Result};

/// Pre-arrival action run against the driver, e.g. "navigate to the entry
/// URL" or "click the button that should get us there"
pub type DriverAction =
    Box<dyn for<'a> Fn(&'a dyn Driver) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Outcome of one arrival validation sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrivalStatus {
    Arrived,
    UrlMismatch { url: String },
    ValidatorMissing { element: String },
    PredicateFailed { name: String },
}

impl ArrivalStatus {
    pub fn is_arrived(&self) -> bool {
        matches!(self, ArrivalStatus::Arrived)
    }

    /// Human-readable description of the failing signal
    pub fn describe(&self) -> String {
        match self {
            ArrivalStatus::Arrived => "arrived".to_string(),
            ArrivalStatus::UrlMismatch { url } => {
                format!("url `{}` matches none of the declared patterns", url)
            }
            ArrivalStatus::ValidatorMissing { element } => {
                format!("validator element `{}` is not present", element)
            }
            ArrivalStatus::PredicateFailed { name } => {
                format!("custom validator `{}` did not hold", name)
            }
        }
    }
}

#[derive(Debug)]
enum CompiledPattern {
    Exact(String),
    Pattern(Regex),
}

#[derive(Debug)]
enum CompiledTitle {
    Exact(String),
    Pattern(Regex),
}

/// Substitute `{base_url}` once, at construction
fn substitute(template: &str, base_url: Option<&str>) -> Result<String> {
    if !template.contains("{base_url}") {
        return Ok(template.to_string());
    }
    let base = base_url.ok_or_else(|| {
        Error::configuration(format!(
            "`{}` references {{base_url}} but no base_url is configured",
            template
        ))
    })?;
    Ok(template.replace("{base_url}", base))
}

fn compile(source: &str) -> Result<Regex> {
    Regex::new(source)
        .map_err(|e| Error::configuration(format!("invalid pattern `{}`: {}", source, e)))
}

/// A page descriptor bound to the live driver
#[derive(Debug)]
pub struct Page {
    descriptor: Arc<PageDescriptor>,
    driver: Arc<dyn Driver>,
    sink: Arc<dyn ReplaySink>,
    config: Arc<Config>,
    patterns: Vec<CompiledPattern>,
    entry_url: Option<String>,
    title: Option<CompiledTitle>,
    proxies: ProxyTable,
}

impl Page {
    pub(crate) fn new(
        descriptor: Arc<PageDescriptor>,
        driver: Arc<dyn Driver>,
        sink: Arc<dyn ReplaySink>,
        config: Arc<Config>,
    ) -> Result<Self> {
        let base = config.base_url.as_deref();

        let mut patterns = Vec::new();
        for pattern in descriptor.url_patterns() {
            patterns.push(match pattern {
                UrlPattern::Exact(literal) => {
                    CompiledPattern::Exact(substitute(literal, base)?)
                }
                UrlPattern::Pattern(source) => {
                    CompiledPattern::Pattern(compile(&substitute(source, base)?)?)
                }
            });
        }

        let entry_url = match descriptor.entry_url() {
            Some(template) => Some(substitute(template, base)?),
            None => None,
        };

        let title = match descriptor.expected_title() {
            Some(TitleMatcher::Exact(text)) => Some(CompiledTitle::Exact(text.clone())),
            Some(TitleMatcher::Pattern(source)) => {
                Some(CompiledTitle::Pattern(compile(source)?))
            }
            None => None,
        };

        Ok(Self {
            descriptor,
            driver,
            sink,
            config,
            patterns,
            entry_url,
            title,
            proxies: ProxyTable::default(),
        })
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn entry_url(&self) -> Option<&str> {
        self.entry_url.as_deref()
    }

    pub(crate) fn descriptor(&self) -> &Arc<PageDescriptor> {
        &self.descriptor
    }

    pub(crate) fn click_destination(&self, element: &str) -> Result<Option<Destination>> {
        let descriptor = self.descriptor.element(element).ok_or_else(|| {
            Error::configuration(format!(
                "page `{}` has no element `{}`",
                self.name(),
                element
            ))
        })?;
        Ok(descriptor.click_destination().cloned())
    }

    /// True if the URL matches any of the page's declared patterns; a page
    /// with no patterns matches nothing
    pub fn matches_url(&self, url: &str) -> bool {
        self.patterns.iter().any(|pattern| match pattern {
            CompiledPattern::Exact(literal) => url.contains(literal.as_str()),
            CompiledPattern::Pattern(re) => re.is_match(url),
        })
    }

    fn title_matches(&self, title: &str) -> bool {
        match &self.title {
            Some(CompiledTitle::Exact(expected)) => title == expected,
            Some(CompiledTitle::Pattern(re)) => re.is_match(title),
            None => true,
        }
    }

    fn proxy(&mut self) -> ElementProxy<'_> {
        ElementProxy::new(
            self.driver.as_ref(),
            self.sink.as_ref(),
            &self.config,
            &self.descriptor,
            &mut self.proxies,
        )
    }

    /// Discard every cached element resolution; called on page change
    pub(crate) fn clear_element_caches(&mut self) {
        debug!("{}: clearing element caches", self.descriptor.name());
        self.proxies.clear();
    }

    pub(crate) async fn resolve(
        &mut self,
        name: &str,
        args: &[String],
        use_cache: bool,
    ) -> Result<Resolution> {
        self.proxy().resolve(name, args, use_cache).await
    }

    pub(crate) async fn invoke(
        &mut self,
        name: &str,
        args: &[String],
        op: ElementOp,
    ) -> Result<OpValue> {
        self.proxy().invoke(name, args, op).await
    }

    pub(crate) async fn set(&mut self, name: &str, args: &[String], value: &str) -> Result<()> {
        self.proxy().set(name, args, value).await
    }

    /// Wait for an element to be present, bounded by the validator wait
    async fn wait_for_present(&mut self, name: &str) -> Result<bool> {
        let deadline = Duration::from_millis(self.config.validator_wait_ms);
        let poll = Duration::from_millis(self.config.element_poll_ms.max(1));
        let start = Instant::now();
        loop {
            if self
                .proxy()
                .invoke(name, &[], ElementOp::IsPresent)
                .await?
                .as_flag()
            {
                return Ok(true);
            }
            if start.elapsed() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// One validation sweep: URL, every validator element, every custom
    /// predicate. Returns the first failing signal.
    pub(crate) async fn arrival_check(&mut self) -> Result<ArrivalStatus> {
        let url = self.driver.current_url().await?;
        if !self.matches_url(&url) {
            return Ok(ArrivalStatus::UrlMismatch { url });
        }

        let descriptor = self.descriptor.clone();
        for element in descriptor.validator_elements() {
            if !self.wait_for_present(element).await? {
                debug!(
                    "{}: arrival_check: validator element `{}` NOT found",
                    self.name(),
                    element
                );
                return Ok(ArrivalStatus::ValidatorMissing {
                    element: element.to_string(),
                });
            }
            debug!(
                "{}: arrival_check: validator element `{}` found",
                self.name(),
                element
            );
        }

        for (name, predicate) in descriptor.custom_validators() {
            if !predicate(self.driver.as_ref()).await? {
                return Ok(ArrivalStatus::PredicateFailed { name: name.clone() });
            }
        }

        Ok(ArrivalStatus::Arrived)
    }

    /// Confirm arrival at this page
    ///
    /// Up to the configured attempt budget of soft sweeps, invoking the
    /// optional pre-action whenever the URL does not match yet, then one
    /// hard strict check that names the signal that did not hold.
    pub(crate) async fn arrived(&mut self, pre_action: Option<&DriverAction>) -> Result<()> {
        let attempts = self.config.arrival_attempts.max(1);
        for attempt in 1..=attempts {
            let url = self.driver.current_url().await?;
            if !self.matches_url(&url) {
                if let Some(action) = pre_action {
                    action(self.driver.as_ref()).await?;
                }
            }
            let status = self.arrival_check().await?;
            if status.is_arrived() {
                debug!("{}: arrived after {} attempt(s)", self.name(), attempt);
                return Ok(());
            }
            debug!(
                "{}: arrival attempt {}/{}: {}",
                self.name(),
                attempt,
                attempts,
                status.describe()
            );
        }

        // Soft attempts exhausted; one strict pass so the failure names
        // the exact signal that never held.
        let url = self.driver.current_url().await?;
        if self.title.is_some() {
            let live = self.driver.current_title().await?;
            if !self.title_matches(&live) {
                return self
                    .arrival_failure(format!("title `{}` does not match the expected title", live))
                    .await;
            }
        }
        if !self.matches_url(&url) {
            return self
                .arrival_failure(
                    ArrivalStatus::UrlMismatch { url }.describe(),
                )
                .await;
        }
        let descriptor = self.descriptor.clone();
        for element in descriptor.validator_elements() {
            if !self.wait_for_present(element).await? {
                return self
                    .arrival_failure(format!("validator element `{}` never appeared", element))
                    .await;
            }
        }
        for (name, predicate) in descriptor.custom_validators() {
            if !predicate(self.driver.as_ref()).await? {
                return self
                    .arrival_failure(format!("custom validator `{}` never held", name))
                    .await;
            }
        }
        Ok(())
    }

    async fn arrival_failure(&self, detail: String) -> Result<()> {
        self.sink.note(
            NoteLevel::Error,
            &format!("arrival at `{}` failed: {}", self.name(), detail),
        );
        if self.config.debug {
            self.sink
                .pause(&format!("arrival at `{}` failed: {}", self.name(), detail))
                .await;
        }
        Err(Error::arrival_timeout(format!(
            "page `{}`: {}",
            self.name(),
            detail
        )))
    }

    /// Navigate to the entry URL and confirm arrival
    ///
    /// A page without an entry URL cannot be entered directly; that fails
    /// fast, before any navigation.
    pub(crate) async fn enter(&mut self) -> Result<()> {
        let entry = self.entry_url.clone().ok_or_else(|| {
            Error::configuration(format!("page `{}` has no entry url", self.name()))
        })?;
        info!("{}: entering via {}", self.name(), entry);
        let action: DriverAction = Box::new(move |driver: &dyn Driver| {
            let url = entry.clone();
            Box::pin(async move { driver.navigate(&url).await })
        });
        self.arrived(Some(&action)).await
    }
}
