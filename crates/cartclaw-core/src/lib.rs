//! # CartClaw Core
//!
//! Shared foundation for the CartClaw abandoned-cart recovery service:
//! the contact/sequence data model, the tagged contact status, the TOML
//! configuration layer, the error type, and the trait seams the scheduler
//! is built against (stores, transports, run lock, clock).
//!
//! The scheduler takes all of its collaborators through these traits so
//! tests can run it against an in-memory store and a manual clock.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::ClawConfig;
pub use error::{ClawError, Result};
pub use traits::{Clock, ContactStore, EmailTransport, RunLock, SequenceStore, SmsTransport, SystemClock};
pub use types::{Contact, ContactStatus, SequenceStep, TerminalReason, MAX_FOLLOW_UP_STEPS};
