//! Collaborator seams the scheduler is built against.
//!
//! The runner owns no I/O of its own: selection and mutation go through
//! `ContactStore`/`SequenceStore`, sends through the transports, mutual
//! exclusion through `RunLock`, and time through `Clock`. Production wires
//! SQLite + SMTP + ClickSend; tests wire in-memory fakes and a manual clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Contact, SequenceStep};

/// Time source. The scheduler never calls `Utc::now()` directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Eligibility queries and per-record updates on the contact table.
///
/// All selection methods exclude terminal contacts and are batch-limited;
/// ordering is oldest-eligible-first so no contact starves when a batch
/// overflows.
pub trait ContactStore: Send + Sync {
    /// Non-terminal contacts whose `next_action_at` is unset or <= `now`,
    /// ordered by `next_action_at` ascending with unscheduled rows first.
    fn due_contacts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>>;

    /// Contacts eligible for the first-contact email: opted in, email
    /// present, nothing sent yet, abandoned at or before `cutoff`.
    fn first_contact_eligible(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>>;

    /// Contacts eligible for the one-off SMS reminder: opted in, phone
    /// present, first email already sent, no SMS yet, abandoned at or
    /// before `cutoff`.
    fn sms_eligible(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>>;

    /// Record a successful send of `step` and schedule (or clear) the next
    /// action time. Never lowers an already-recorded step.
    fn mark_step_sent(
        &self,
        id: i64,
        step: u32,
        next_action_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Clear `next_action_at` — the sequence has no runnable next step.
    fn park(&self, id: i64, now: DateTime<Utc>) -> Result<()>;

    /// Record the SMS reminder as sent.
    fn mark_sms_sent(&self, id: i64, now: DateTime<Utc>) -> Result<()>;
}

/// Ordered, enabled follow-up steps.
pub trait SequenceStore: Send + Sync {
    /// Enabled steps ordered by `step_number` ascending.
    fn enabled_steps(&self) -> Result<Vec<SequenceStep>>;
}

/// Outbound email. Success means the relay accepted the message.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Outbound SMS. `to` must already be E.164.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, to: &str, message: &str) -> Result<()>;
}

/// Mutual exclusion for scheduler runs: a cooldown guard against rapid
/// re-triggers plus an overlap guard against concurrent runs.
pub trait RunLock: Send + Sync {
    /// Attempt to enter a run. `false` means skip this invocation entirely.
    fn try_enter(&self, run_id: &str) -> bool;

    /// Release the overlap guard, but only if `run_id` still owns it.
    fn release(&self, run_id: &str);
}
