//! The live core
//!
//! `proxy` resolves element descriptors to live handles and survives
//! staleness; `page` checks arrival at a described page; `session` is the
//! state machine that tracks the active page and drives transitions.

pub mod page;
pub mod proxy;
#[allow(clippy::module_inception)]
pub mod session;


pub use page::{ArrivalStatus, DriverAction, Page};
pub use proxy::{ElementOp, ElementProxy, OpValue, Resolution};
pub use session::{Session, TransitionFailure, TransitionReport, Trigger};
