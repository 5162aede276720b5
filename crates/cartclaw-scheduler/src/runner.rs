//! One scheduler run: lock, three passes, release.
//!
//! Pass order matters. The first-contact pass sends step 1 (config-owned)
//! to contacts that have never been messaged. The follow-up pass advances
//! contacts that already got step 1 through the configurable sequence,
//! selecting the next *enabled* step above the last one sent so disabled
//! gaps are skipped rather than dead-ending the contact. The SMS pass
//! sends its one-off reminder once the first email has had time to land.
//!
//! Failures are per-contact: a refused send leaves that row exactly as it
//! was, so the next run retries it. Store errors abort the affected pass
//! with nothing written.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use cartclaw_core::config::ClawConfig;
use cartclaw_core::traits::{Clock, ContactStore, RunLock, SequenceStore, SmsTransport};
use cartclaw_core::types::{Contact, SequenceStep};
use cartclaw_channels::to_e164;

use crate::dispatch::{render, Dispatcher};

/// Counters for one run. `skipped` means the lock refused entry and no
/// pass executed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub skipped: bool,
    pub first_contact_sent: usize,
    pub follow_ups_sent: usize,
    pub sms_sent: usize,
    pub parked: usize,
    pub failed: usize,
}

impl RunSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Drives the recovery state machine. Owns no I/O; everything is injected.
pub struct RecoveryRunner {
    contacts: Arc<dyn ContactStore>,
    sequences: Arc<dyn SequenceStore>,
    dispatcher: Dispatcher,
    sms: Option<Arc<dyn SmsTransport>>,
    lock: Arc<dyn RunLock>,
    clock: Arc<dyn Clock>,
    config: ClawConfig,
}

impl RecoveryRunner {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        sequences: Arc<dyn SequenceStore>,
        dispatcher: Dispatcher,
        sms: Option<Arc<dyn SmsTransport>>,
        lock: Arc<dyn RunLock>,
        clock: Arc<dyn Clock>,
        config: ClawConfig,
    ) -> Self {
        Self {
            contacts,
            sequences,
            dispatcher,
            sms,
            lock,
            clock,
            config,
        }
    }

    /// Execute one full run. Never returns an error: a refused lock is a
    /// skip, and everything inside is logged per contact.
    pub async fn run(&self) -> RunSummary {
        let run_id = uuid::Uuid::new_v4().to_string();
        if !self.lock.try_enter(&run_id) {
            tracing::info!("⏭️ Scheduler run {run_id} skipped");
            return RunSummary::skipped();
        }
        let summary = self.execute(&run_id).await;
        self.lock.release(&run_id);
        tracing::info!(
            "✅ Run {run_id} done: {} first, {} follow-ups, {} sms, {} parked, {} failed",
            summary.first_contact_sent,
            summary.follow_ups_sent,
            summary.sms_sent,
            summary.parked,
            summary.failed
        );
        summary
    }

    async fn execute(&self, run_id: &str) -> RunSummary {
        let mut summary = RunSummary::default();
        tracing::debug!("🛒 Run {run_id} starting");

        let steps = match self.sequences.enabled_steps() {
            Ok(steps) => steps
                .into_iter()
                .map(|s| (s.step_number, s))
                .collect::<BTreeMap<u32, SequenceStep>>(),
            Err(e) => {
                tracing::error!("Run {run_id}: cannot load sequence steps: {e}");
                return summary;
            }
        };

        if self.config.first_email.enabled {
            self.first_contact_pass(&steps, &mut summary).await;
        }
        self.follow_up_pass(&steps, &mut summary).await;
        if self.config.sms.enabled {
            self.sms_pass(&mut summary).await;
        }
        summary
    }

    /// Step 1 for contacts that have never been messaged and whose
    /// abandonment is old enough.
    async fn first_contact_pass(&self, steps: &BTreeMap<u32, SequenceStep>, summary: &mut RunSummary) {
        let now = self.clock.now();
        let cutoff = now - self.scaled_secs(self.config.first_email.delay_secs);
        let batch = match self
            .contacts
            .first_contact_eligible(cutoff, self.config.scheduler.batch_size)
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("First-contact selection failed: {e}");
                return;
            }
        };

        for contact in batch {
            if contact.id <= 0 {
                tracing::debug!("Skipping contact with invalid id {}", contact.id);
                continue;
            }
            match self.dispatcher.send_step(&contact, 1, steps).await {
                Err(e) => {
                    tracing::warn!("⚠️ First email to {} failed: {e}", contact.email);
                    summary.failed += 1;
                }
                Ok(()) => {
                    let next_at = self.next_action_after(1, steps, now);
                    if let Err(e) = self.contacts.mark_step_sent(contact.id, 1, next_at, now) {
                        tracing::error!("Recording step 1 for contact {} failed: {e}", contact.id);
                    }
                    summary.first_contact_sent += 1;
                }
            }
        }
    }

    /// Advance due contacts through the configured sequence.
    async fn follow_up_pass(&self, steps: &BTreeMap<u32, SequenceStep>, summary: &mut RunSummary) {
        if steps.is_empty() {
            tracing::debug!("No enabled follow-up steps configured");
            return;
        }
        let now = self.clock.now();
        let batch = match self
            .contacts
            .due_contacts(now, self.config.scheduler.batch_size)
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("Due-contact selection failed: {e}");
                return;
            }
        };

        for contact in batch {
            if contact.id <= 0 {
                tracing::debug!("Skipping contact with invalid id {}", contact.id);
                continue;
            }
            let last = contact.status.last_step();
            if last == 0 {
                // Step 1 belongs to the first-contact pass. A step-0 row
                // sitting in the due set has nothing runnable here.
                self.park_if_scheduled(&contact, now, summary);
                continue;
            }

            let next = steps
                .range((Bound::Excluded(last), Bound::Unbounded))
                .next()
                .map(|(n, s)| (*n, s));
            let Some((next_step, _)) = next else {
                // Sequence exhausted above this contact's step.
                self.park_if_scheduled(&contact, now, summary);
                continue;
            };

            match self.dispatcher.send_step(&contact, next_step, steps).await {
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Step {next_step} to {} failed, will retry: {e}",
                        contact.email
                    );
                    summary.failed += 1;
                }
                Ok(()) => {
                    let next_at = self.next_action_after(next_step, steps, now);
                    if let Err(e) = self
                        .contacts
                        .mark_step_sent(contact.id, next_step, next_at, now)
                    {
                        tracing::error!(
                            "Recording step {next_step} for contact {} failed: {e}",
                            contact.id
                        );
                    }
                    summary.follow_ups_sent += 1;
                }
            }
        }
    }

    /// One-off SMS reminder after the first email has had time to land.
    async fn sms_pass(&self, summary: &mut RunSummary) {
        let Some(sms) = &self.sms else {
            tracing::debug!("SMS enabled but no transport wired");
            return;
        };
        let now = self.clock.now();
        let cutoff = now
            - self.scaled_secs(self.config.first_email.delay_secs)
            - self.scaled_secs(self.config.sms.delay_secs);
        let batch = match self
            .contacts
            .sms_eligible(cutoff, self.config.scheduler.batch_size)
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("SMS selection failed: {e}");
                return;
            }
        };

        for contact in batch {
            if contact.id <= 0 {
                tracing::debug!("Skipping contact with invalid id {}", contact.id);
                continue;
            }
            let Some(to) = to_e164(&contact.phone, &self.config.sms.default_country) else {
                tracing::debug!(
                    "Cannot format phone for contact {}; skipping SMS",
                    contact.id
                );
                continue;
            };
            let message = render(&self.config.sms.template, &contact, &self.config.site);
            match sms.send(&to, &message).await {
                Err(e) => {
                    tracing::warn!("⚠️ SMS to contact {} failed: {e}", contact.id);
                    summary.failed += 1;
                }
                Ok(()) => {
                    if let Err(e) = self.contacts.mark_sms_sent(contact.id, now) {
                        tracing::error!("Recording SMS for contact {} failed: {e}", contact.id);
                    }
                    summary.sms_sent += 1;
                }
            }
        }
    }

    fn park_if_scheduled(&self, contact: &Contact, now: DateTime<Utc>, summary: &mut RunSummary) {
        if contact.next_action_at.is_none() {
            return;
        }
        match self.contacts.park(contact.id, now) {
            Ok(()) => {
                tracing::debug!("Parked contact {}: no runnable next step", contact.id);
                summary.parked += 1;
            }
            Err(e) => tracing::error!("Parking contact {} failed: {e}", contact.id),
        }
    }

    /// Schedule time for whatever enabled step follows `sent_step`, or
    /// `None` when the sequence ends there.
    fn next_action_after(
        &self,
        sent_step: u32,
        steps: &BTreeMap<u32, SequenceStep>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        steps
            .range((Bound::Excluded(sent_step), Bound::Unbounded))
            .next()
            .map(|(_, step)| now + self.scale(step.delay()))
    }

    fn scaled_secs(&self, secs: u64) -> Duration {
        self.scale(Duration::seconds(secs as i64))
    }

    fn scale(&self, d: Duration) -> Duration {
        let m = self.config.scheduler.delay_multiplier;
        if m <= 0.0 || (m - 1.0).abs() < f64::EPSILON {
            return d;
        }
        Duration::seconds((d.num_seconds() as f64 * m).round() as i64)
    }
}
