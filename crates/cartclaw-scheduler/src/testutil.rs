//! In-memory fakes for runner and lock tests: a manual clock, a contact
//! store with the same selection semantics as the SQLite store, and
//! recording transports with switchable failure.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use cartclaw_core::error::{ClawError, Result};
use cartclaw_core::traits::{Clock, ContactStore, EmailTransport, SequenceStore, SmsTransport};
use cartclaw_core::types::{Contact, ContactStatus, SequenceStep};

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at_epoch() -> Self {
        Self {
            now: Mutex::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        *self.now.lock().unwrap() += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Contact fixture: opted in to both channels, captured, abandoned at the
/// clock epoch, nothing scheduled.
pub fn contact(id: i64, email: &str) -> Contact {
    let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    Contact {
        id,
        cart_key: format!("cart-{id}"),
        session_key: format!("sess-{id}"),
        name: String::new(),
        email: email.to_string(),
        phone: String::new(),
        email_opt_in: true,
        sms_opt_in: true,
        status: ContactStatus::Captured,
        abandoned_at: t,
        next_action_at: None,
        sms_first_sent_at: None,
        last_sent_at: None,
        created_at: t,
        updated_at: t,
    }
}

pub fn step(step_number: u32, delay_secs: i64) -> SequenceStep {
    step_with_templates(
        step_number,
        delay_secs,
        &format!("Step {step_number} from {{site_name}}"),
        "Hi {name}, your cart: {cart_url}",
    )
}

pub fn step_with_templates(
    step_number: u32,
    delay_secs: i64,
    subject: &str,
    body: &str,
) -> SequenceStep {
    let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    SequenceStep {
        id: step_number as i64,
        step_number,
        enabled: true,
        delay_secs,
        subject: subject.to_string(),
        body: body.to_string(),
        sort_order: step_number as i32,
        created_at: t,
        updated_at: t,
    }
}

/// In-memory `ContactStore` mirroring the SQLite selection rules.
#[derive(Default)]
pub struct MemoryContacts {
    rows: Mutex<Vec<Contact>>,
    pub fail_selects: AtomicBool,
}

impl MemoryContacts {
    pub fn with(rows: Vec<Contact>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail_selects: AtomicBool::new(false),
        }
    }

    pub fn get(&self, id: i64) -> Option<Contact> {
        self.rows.lock().unwrap().iter().find(|c| c.id == id).cloned()
    }

    fn check_fail(&self) -> Result<()> {
        if self.fail_selects.load(Ordering::SeqCst) {
            Err(ClawError::Store("selection unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl ContactStore for MemoryContacts {
    fn due_contacts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>> {
        self.check_fail()?;
        let rows = self.rows.lock().unwrap();
        let mut due: Vec<Contact> = rows
            .iter()
            .filter(|c| !c.status.is_terminal())
            .filter(|c| c.next_action_at.is_none_or(|t| t <= now))
            .cloned()
            .collect();
        // Unscheduled rows first, then earliest due.
        due.sort_by_key(|c| c.next_action_at);
        due.truncate(limit);
        Ok(due)
    }

    fn first_contact_eligible(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>> {
        self.check_fail()?;
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<Contact> = rows
            .iter()
            .filter(|c| {
                matches!(c.status, ContactStatus::Unsent | ContactStatus::Captured)
                    && c.email_opt_in
                    && !c.email.is_empty()
                    && c.abandoned_at <= cutoff
            })
            .cloned()
            .collect();
        out.sort_by_key(|c| c.abandoned_at);
        out.truncate(limit);
        Ok(out)
    }

    fn sms_eligible(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>> {
        self.check_fail()?;
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<Contact> = rows
            .iter()
            .filter(|c| {
                !c.status.is_terminal()
                    && c.sms_opt_in
                    && !c.phone.is_empty()
                    && c.status.last_step() >= 1
                    && c.sms_first_sent_at.is_none()
                    && c.abandoned_at <= cutoff
            })
            .cloned()
            .collect();
        out.sort_by_key(|c| c.abandoned_at);
        out.truncate(limit);
        Ok(out)
    }

    fn mark_step_sent(
        &self,
        id: i64,
        step: u32,
        next_action_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(c) = rows.iter_mut().find(|c| c.id == id) {
            if c.status.last_step() >= step {
                return Ok(());
            }
            c.status = ContactStatus::Sent(step);
            c.next_action_at = next_action_at;
            c.last_sent_at = Some(now);
            c.updated_at = now;
        }
        Ok(())
    }

    fn park(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(c) = rows.iter_mut().find(|c| c.id == id) {
            c.next_action_at = None;
            c.updated_at = now;
        }
        Ok(())
    }

    fn mark_sms_sent(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(c) = rows.iter_mut().find(|c| c.id == id) {
            c.sms_first_sent_at = Some(now);
            c.updated_at = now;
        }
        Ok(())
    }
}

/// Fixed sequence definitions; tests may swap the set mid-run.
#[derive(Default)]
pub struct FixedSteps {
    steps: Mutex<Vec<SequenceStep>>,
}

impl FixedSteps {
    pub fn with(steps: Vec<SequenceStep>) -> Self {
        Self {
            steps: Mutex::new(steps),
        }
    }

    pub fn replace(&self, steps: Vec<SequenceStep>) {
        *self.steps.lock().unwrap() = steps;
    }
}

impl SequenceStore for FixedSteps {
    fn enabled_steps(&self) -> Result<Vec<SequenceStep>> {
        let mut out: Vec<SequenceStep> = self
            .steps
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.step_number);
        Ok(out)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClawError::Delivery("relay down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingSms {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsTransport for RecordingSms {
    async fn send(&self, to: &str, message: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClawError::Delivery("gateway down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), message.to_string()));
        Ok(())
    }
}

/// A lock that always admits. Runner tests that are not about locking use it.
pub struct OpenLock;

impl cartclaw_core::RunLock for OpenLock {
    fn try_enter(&self, _run_id: &str) -> bool {
        true
    }

    fn release(&self, _run_id: &str) {}
}
