//! The driver seam
//!
//! Everything above this module addresses pages and elements by name; this
//! module is where those names turn into operations against a concrete
//! browser. The wire client itself stays external: `cdp` adapts the
//! [`Driver`] contract onto an injected CDP transport, and `mock` provides
//! a scripted in-memory browser for tests.

pub mod cdp;
pub mod mock;
pub mod traits;

pub use cdp::{CdpDriver, CdpTransport};
pub use mock::{MockDom, MockDriver, MockNode};
pub use traits::{Driver, ElementKind, Handle, Matcher, Selector};
