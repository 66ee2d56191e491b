//! Wayfinder: resilient page-aware automation over a browser driver
//!
//! This library lets calling code address named, semantically-meaningful
//! pages and elements of a remote UI without re-implementing wait/retry/
//! staleness handling, and without losing track of which page is active
//! while asynchronous navigation happens underneath it.

pub mod config;
pub mod error;
pub mod replay;

pub mod driver;
pub mod registry;
pub mod session;

// Re-exports
pub use config::Config;
pub use driver::{Driver, ElementKind, Handle, Matcher, Selector};
pub use error::{Error, Result};
pub use registry::{Destination, ElementDescriptor, PageDescriptor, PageId, PageRegistry};
pub use replay::{FileReplay, NoopReplay, NoteLevel, ReplaySink};
pub use session::{
    ArrivalStatus, DriverAction, ElementOp, OpValue, Page, Resolution, Session, TransitionFailure,
    TransitionReport, Trigger,
};

/// Wayfinder library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
