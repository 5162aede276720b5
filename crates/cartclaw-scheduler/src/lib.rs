//! # CartClaw Scheduler
//!
//! The follow-up state machine: decides, for each captured cart, whether a
//! reminder is due, which step to send next, and how to advance or end the
//! sequence — without duplicate sends under overlapping triggers.
//!
//! ## Architecture
//! ```text
//! periodic trigger (tokio interval, or one-shot `tick`)
//!   └── RunLock (cooldown 90s + overlap 240s, owner token)
//!         └── RecoveryRunner
//!               ├── first-contact pass: step 1 from config, delay from abandonment
//!               ├── follow-up pass:     steps 2..=6 from the sequence store,
//!               │                        due by next_action_at, gap-skipping
//!               └── SMS pass:           one ClickSend reminder after the first email
//! ```
//!
//! Per-contact independence: a failed send leaves that row untouched (the
//! next pass retries it) and never aborts the batch.

pub mod dispatch;
pub mod engine;
pub mod lock;
pub mod runner;

#[cfg(test)]
pub(crate) mod testutil;

pub use dispatch::Dispatcher;
pub use engine::spawn_scheduler;
pub use lock::MemoryRunLock;
pub use runner::{RecoveryRunner, RunSummary};
