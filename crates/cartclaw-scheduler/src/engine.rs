//! Periodic trigger: wake on an interval and hand off to the runner. The
//! runner's lock makes the cadence safe, so an extra manual `tick` racing
//! this loop is just a skipped run.

use std::sync::Arc;
use std::time::Duration;

use crate::runner::RecoveryRunner;

/// Run the scheduler loop forever. Spawn this on the runtime.
pub async fn spawn_scheduler(runner: Arc<RecoveryRunner>, check_interval_secs: u64) {
    let period = Duration::from_secs(check_interval_secs.max(1));
    tracing::info!("⏰ Recovery scheduler started (every {}s)", period.as_secs());

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let summary = runner.run().await;
        if summary.first_contact_sent + summary.follow_ups_sent + summary.sms_sent > 0 {
            tracing::info!(
                "📬 Pass delivered {} email(s), {} sms",
                summary.first_contact_sent + summary.follow_ups_sent,
                summary.sms_sent
            );
        }
    }
}
