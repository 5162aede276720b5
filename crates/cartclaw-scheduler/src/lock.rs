//! Two-tier run lock.
//!
//! Tier one is a cooldown marker: armed whenever an attempt gets past the
//! cooldown check, it absorbs rapid re-triggers (a cron hit racing a manual
//! tick). It expires on its own and is never released.
//!
//! Tier two is an overlap marker holding the owning run's id. It guards
//! against two runs mutating the same contacts concurrently, and its TTL
//! bounds how long a crashed run can wedge the scheduler. Release is a no-op
//! unless the caller still owns the marker, so a slow run that outlived its
//! TTL cannot free the lock out from under its successor.
//!
//! A refused `try_enter` is a normal skip, not an error.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use cartclaw_core::Clock;

#[derive(Default)]
struct LockState {
    cooldown_until: Option<DateTime<Utc>>,
    overlap: Option<(String, DateTime<Utc>)>,
}

/// In-process `RunLock` for a single scheduler instance.
pub struct MemoryRunLock {
    clock: Arc<dyn Clock>,
    cooldown_ttl: Duration,
    overlap_ttl: Duration,
    state: Mutex<LockState>,
}

impl MemoryRunLock {
    pub fn new(clock: Arc<dyn Clock>, cooldown_ttl_secs: u64, overlap_ttl_secs: u64) -> Self {
        Self {
            clock,
            cooldown_ttl: Duration::seconds(cooldown_ttl_secs as i64),
            overlap_ttl: Duration::seconds(overlap_ttl_secs as i64),
            state: Mutex::new(LockState::default()),
        }
    }
}

impl cartclaw_core::RunLock for MemoryRunLock {
    fn try_enter(&self, run_id: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();

        // A refusal here does not re-arm the cooldown, otherwise a fast
        // trigger loop could starve the scheduler forever.
        if let Some(until) = state.cooldown_until {
            if until > now {
                tracing::debug!("Run {run_id} refused: cooldown active until {until}");
                return false;
            }
        }
        state.cooldown_until = Some(now + self.cooldown_ttl);

        if let Some((owner, until)) = &state.overlap {
            if *until > now {
                tracing::info!("⏭️ Run {run_id} refused: run {owner} still active");
                return false;
            }
        }
        state.overlap = Some((run_id.to_string(), now + self.overlap_ttl));
        true
    }

    fn release(&self, run_id: &str) {
        let mut state = self.state.lock().unwrap();
        let owned = state
            .overlap
            .as_ref()
            .is_some_and(|(owner, _)| owner == run_id);
        if owned {
            state.overlap = None;
        } else {
            tracing::debug!("Run {run_id} released nothing: marker owned elsewhere or expired");
        }
    }
}
