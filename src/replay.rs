//! Telemetry and replay recording
//!
//! A sink that accepts leveled replay annotations and best-effort
//! screenshot/DOM captures. Capture failures are swallowed and logged at
//! warn; a broken replay directory must never fail a workflow.

use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::driver::Driver;
use crate::Result;

/// Severity of a replay annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for NoteLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NoteLevel::Debug => "DEBUG",
            NoteLevel::Info => "INFO",
            NoteLevel::Warn => "WARN",
            NoteLevel::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

/// Replay sink trait
///
/// Consumes leveled annotations and best-effort page captures.
#[async_trait]
pub trait ReplaySink: Send + Sync + std::fmt::Debug {
    /// Record a leveled replay annotation
    fn note(&self, level: NoteLevel, message: &str);

    /// Capture the live page (screenshot + DOM snapshot), best-effort
    async fn capture(&self, driver: &dyn Driver);

    /// Debug-mode hook fired before a hard failure is surfaced
    async fn pause(&self, context: &str) {
        info!("ReplaySink::pause: {}", context);
    }
}

/// Sink that discards everything
#[derive(Debug, Default)]
pub struct NoopReplay;

#[async_trait]
impl ReplaySink for NoopReplay {
    fn note(&self, _level: NoteLevel, _message: &str) {}

    async fn capture(&self, _driver: &dyn Driver) {}
}

/// Sink that writes numbered captures and a timestamped log to a directory
#[derive(Debug)]
pub struct FileReplay {
    dir: PathBuf,
    screenshots: bool,
    counter: AtomicUsize,
}

impl FileReplay {
    /// Create a sink writing into `dir`, creating it if needed
    pub fn new<P: Into<PathBuf>>(dir: P, screenshots: bool) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            screenshots,
            counter: AtomicUsize::new(0),
        })
    }

    /// Create a sink in a fresh uniquely-named directory under `base`
    pub fn new_session<P: AsRef<Path>>(base: P, screenshots: bool) -> Result<Self> {
        let dir = base
            .as_ref()
            .join(format!("replay-{}", Uuid::new_v4()));
        Self::new(dir, screenshots)
    }

    /// The directory this sink writes into
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append_index(&self, html: &str) {
        let path = self.dir.join("index.html");
        let line = format!("<p>{} {}</p>\n", Utc::now().to_rfc3339(), html);
        let existing = std::fs::read_to_string(&path).unwrap_or_default();
        if let Err(e) = std::fs::write(&path, existing + &line) {
            warn!("FileReplay: failed to append to replay log: {}", e);
        }
    }
}

#[async_trait]
impl ReplaySink for FileReplay {
    fn note(&self, level: NoteLevel, message: &str) {
        debug!("FileReplay::note: [{}] {}", level, message);
        self.append_index(&format!("[{}] {}", level, message));
    }

    async fn capture(&self, driver: &dyn Driver) {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;

        if self.screenshots {
            match driver.screenshot().await {
                Ok(bytes) => {
                    let path = self.dir.join(format!("screenshot_{}.png", n));
                    if let Err(e) = std::fs::write(&path, bytes) {
                        warn!("FileReplay::capture: failed to write screenshot: {}", e);
                    } else {
                        self.append_index(&format!(
                            "<a href=\"screenshot_{}.png\">screenshot {}</a>",
                            n, n
                        ));
                    }
                }
                Err(e) => warn!("FileReplay::capture: screenshot failed: {}", e),
            }
        }

        match driver.page_source().await {
            Ok(source) => {
                let path = self.dir.join(format!("html_capture_{}.txt", n));
                if let Err(e) = std::fs::write(&path, source) {
                    warn!("FileReplay::capture: failed to write DOM snapshot: {}", e);
                } else {
                    self.append_index(&format!(
                        "<a href=\"html_capture_{}.txt\">DOM capture {}</a>",
                        n, n
                    ));
                }
            }
            Err(e) => warn!("FileReplay::capture: page source failed: {}", e),
        }
    }
}
