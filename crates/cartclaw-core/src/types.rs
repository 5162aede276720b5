//! Contact and sequence data model.
//!
//! Contact lifecycle is a tagged status (`Unsent → Captured → Sent(n) →
//! Terminal`) instead of a parsed string. It persists as two columns
//! (status kind + last step) so "next enabled step after n" stays a plain
//! integer comparison. The step in `Sent(n)` only ever increases.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Hard cap on configurable follow-up rows (steps 2..=6).
pub const MAX_FOLLOW_UP_STEPS: usize = 5;

/// Step 1 is the implicit first-contact message; configurable rows start here.
pub const FIRST_FOLLOW_UP_STEP: u32 = 2;

/// Why a contact will never be messaged again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    Recovered,
    Converted,
    Completed,
    Cancelled,
    Unsubscribed,
    OptedOut,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recovered => "recovered",
            Self::Converted => "converted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Unsubscribed => "unsubscribed",
            Self::OptedOut => "opted_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recovered" => Some(Self::Recovered),
            "converted" => Some(Self::Converted),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "unsubscribed" => Some(Self::Unsubscribed),
            "opted_out" => Some(Self::OptedOut),
            _ => None,
        }
    }
}

/// Lifecycle status of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactStatus {
    /// Freshly created, nothing captured beyond identity.
    Unsent,
    /// Checkout details captured, no message sent yet.
    Captured,
    /// Last successfully sent step (1 = first contact, 2.. = follow-ups).
    Sent(u32),
    /// No further automated sends, ever.
    Terminal(TerminalReason),
}

impl ContactStatus {
    /// Highest step sent so far; 0 when nothing has gone out.
    pub fn last_step(&self) -> u32 {
        match self {
            Self::Sent(n) => *n,
            _ => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    /// Persisted status kind column.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Unsent => "unsent",
            Self::Captured => "captured",
            Self::Sent(_) => "sent",
            Self::Terminal(_) => "terminal",
        }
    }

    /// Rebuild from the persisted (kind, last_step, terminal_reason) columns.
    /// Unknown kinds collapse to `Unsent` so a bad row never panics a run.
    pub fn from_columns(kind: &str, last_step: u32, reason: Option<&str>) -> Self {
        match kind {
            "captured" => Self::Captured,
            "sent" => Self::Sent(last_step),
            "terminal" => Self::Terminal(
                reason
                    .and_then(TerminalReason::parse)
                    .unwrap_or(TerminalReason::Completed),
            ),
            _ => Self::Unsent,
        }
    }
}

/// One abandoned checkout: contact details, opt-ins, and follow-up progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    /// Cart/session keys from the storefront; empty when unknown.
    pub cart_key: String,
    pub session_key: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub email_opt_in: bool,
    pub sms_opt_in: bool,
    pub status: ContactStatus,
    /// When the checkout was abandoned.
    pub abandoned_at: DateTime<Utc>,
    /// When this contact becomes eligible for the next send.
    /// `None` means not scheduled (sequence finished or not yet started).
    pub next_action_at: Option<DateTime<Utc>>,
    /// First (and only) SMS reminder timestamp.
    pub sms_first_sent_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One configurable follow-up message (steps 2..=6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub id: i64,
    /// Unique, >= `FIRST_FOLLOW_UP_STEP`.
    pub step_number: u32,
    pub enabled: bool,
    /// Delay from the previous step's send time, in whole seconds.
    pub delay_secs: i64,
    /// Template with `{name}`, `{site_name}`, `{cart_url}` tokens.
    pub subject: String,
    pub body: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SequenceStep {
    pub fn delay(&self) -> Duration {
        Duration::seconds(self.delay_secs.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_step() {
        assert_eq!(ContactStatus::Unsent.last_step(), 0);
        assert_eq!(ContactStatus::Captured.last_step(), 0);
        assert_eq!(ContactStatus::Sent(3).last_step(), 3);
        assert_eq!(
            ContactStatus::Terminal(TerminalReason::Recovered).last_step(),
            0
        );
    }

    #[test]
    fn test_status_columns_round_trip() {
        let cases = [
            ContactStatus::Unsent,
            ContactStatus::Captured,
            ContactStatus::Sent(4),
            ContactStatus::Terminal(TerminalReason::Unsubscribed),
        ];
        for status in cases {
            let reason = match status {
                ContactStatus::Terminal(r) => Some(r.as_str()),
                _ => None,
            };
            let back =
                ContactStatus::from_columns(status.kind_str(), status.last_step(), reason);
            assert_eq!(back, status);
        }
    }

    #[test]
    fn test_unknown_kind_falls_back_to_unsent() {
        assert_eq!(
            ContactStatus::from_columns("emailed_3", 3, None),
            ContactStatus::Unsent
        );
    }

    #[test]
    fn test_terminal_reason_parse() {
        assert_eq!(
            TerminalReason::parse("opted_out"),
            Some(TerminalReason::OptedOut)
        );
        assert_eq!(TerminalReason::parse("nope"), None);
    }

    #[test]
    fn test_negative_delay_clamped() {
        let step = SequenceStep {
            id: 1,
            step_number: 2,
            enabled: true,
            delay_secs: -30,
            subject: String::new(),
            body: String::new(),
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(step.delay(), Duration::zero());
    }
}
