//! SQLite store for contacts and sequence steps.
//! Timestamps are RFC 3339 text (UTC, whole seconds) so range queries are
//! plain string comparisons.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};

use cartclaw_core::error::{ClawError, Result};
use cartclaw_core::traits::{ContactStore, SequenceStore};
use cartclaw_core::types::{
    Contact, ContactStatus, SequenceStep, TerminalReason, FIRST_FOLLOW_UP_STEP,
    MAX_FOLLOW_UP_STEPS,
};

/// SQLite-backed store for all CartClaw data.
pub struct RecoveryDb {
    conn: Mutex<Connection>,
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn ts_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

const CONTACT_COLUMNS: &str = "id, cart_key, session_key, name, email, phone, \
     email_opt_in, sms_opt_in, status_kind, last_step, terminal_reason, \
     abandoned_at, next_action_at, sms_first_sent_at, last_sent_at, \
     created_at, updated_at";

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    let status_kind: String = row.get(8)?;
    let last_step: u32 = row.get(9)?;
    let terminal_reason: Option<String> = row.get(10)?;
    let abandoned_at: String = row.get(11)?;
    let next_action_at: Option<String> = row.get(12)?;
    let sms_first_sent_at: Option<String> = row.get(13)?;
    let last_sent_at: Option<String> = row.get(14)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;

    Ok(Contact {
        id: row.get(0)?,
        cart_key: row.get(1)?,
        session_key: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        email_opt_in: row.get::<_, i64>(6)? != 0,
        sms_opt_in: row.get::<_, i64>(7)? != 0,
        status: ContactStatus::from_columns(&status_kind, last_step, terminal_reason.as_deref()),
        abandoned_at: parse_ts(&abandoned_at),
        next_action_at: parse_ts_opt(next_action_at),
        sms_first_sent_at: parse_ts_opt(sms_first_sent_at),
        last_sent_at: parse_ts_opt(last_sent_at),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn step_from_row(row: &Row<'_>) -> rusqlite::Result<SequenceStep> {
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(SequenceStep {
        id: row.get(0)?,
        step_number: row.get(1)?,
        enabled: row.get::<_, i64>(2)? != 0,
        delay_secs: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        sort_order: row.get(6)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

impl RecoveryDb {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ClawError::Store(format!("DB open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, mostly for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ClawError::Store(format!("DB open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "
            -- One row per known cart/contact.
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cart_key TEXT NOT NULL DEFAULT '',
                session_key TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL,
                phone TEXT NOT NULL DEFAULT '',
                email_opt_in INTEGER NOT NULL DEFAULT 0,
                sms_opt_in INTEGER NOT NULL DEFAULT 0,
                status_kind TEXT NOT NULL DEFAULT 'unsent', -- 'unsent','captured','sent','terminal'
                last_step INTEGER NOT NULL DEFAULT 0,
                terminal_reason TEXT,
                abandoned_at TEXT NOT NULL,
                next_action_at TEXT,
                sms_first_sent_at TEXT,
                last_sent_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email);
            CREATE INDEX IF NOT EXISTS idx_contacts_next_action ON contacts(next_action_at);
            CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status_kind, last_step);
            CREATE INDEX IF NOT EXISTS idx_contacts_abandoned ON contacts(abandoned_at);

            -- Admin-editable follow-up messages (steps 2..=6).
            CREATE TABLE IF NOT EXISTS sequence_steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                step_number INTEGER NOT NULL UNIQUE,
                enabled INTEGER NOT NULL DEFAULT 1,
                delay_secs INTEGER NOT NULL DEFAULT 86400,
                subject TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_steps_enabled ON sequence_steps(enabled, step_number);
         ",
            )
            .map_err(|e| ClawError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    // ─── Capture & lifecycle ──────────────────────────────────

    /// Create or refresh a contact from captured checkout fields, keyed by
    /// email. Capture means cart activity, so `abandoned_at` is refreshed.
    /// Returns the contact id.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_contact(
        &self,
        email: &str,
        name: &str,
        phone: &str,
        cart_key: &str,
        session_key: &str,
        email_opt_in: bool,
        sms_opt_in: bool,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ClawError::InvalidInput("contact email is required".into()));
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO contacts
                (email, name, phone, cart_key, session_key, email_opt_in, sms_opt_in,
                 status_kind, abandoned_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'captured', ?8, ?8, ?8)
             ON CONFLICT(email) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                cart_key = excluded.cart_key,
                session_key = excluded.session_key,
                email_opt_in = excluded.email_opt_in,
                sms_opt_in = excluded.sms_opt_in,
                abandoned_at = excluded.abandoned_at,
                updated_at = excluded.updated_at",
            params![
                email,
                name,
                phone,
                cart_key,
                session_key,
                email_opt_in as i64,
                sms_opt_in as i64,
                ts(now),
            ],
        )
        .map_err(|e| ClawError::Store(format!("Upsert contact: {e}")))?;

        let id: i64 = conn
            .query_row("SELECT id FROM contacts WHERE email = ?1", [email], |r| r.get(0))
            .map_err(|e| ClawError::Store(format!("Upsert lookup: {e}")))?;
        Ok(id)
    }

    /// Move a contact into a terminal state (order completed, unsubscribe,
    /// ...). Clears any pending schedule. Returns the number of rows moved;
    /// 0 when the contact is unknown or already terminal.
    pub fn mark_terminal(
        &self,
        email: &str,
        reason: TerminalReason,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE contacts
                 SET status_kind = 'terminal', terminal_reason = ?1,
                     next_action_at = NULL, updated_at = ?2
                 WHERE email = ?3 AND status_kind != 'terminal'",
                params![reason.as_str(), ts(now), email],
            )
            .map_err(|e| ClawError::Store(format!("Mark terminal: {e}")))?;
        if changed > 0 {
            tracing::info!("🏁 Contact {email} moved to terminal ({})", reason.as_str());
        }
        Ok(changed)
    }

    pub fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ClawError::Store(format!("Get contact: {e}")))?;
        let mut rows = stmt
            .query_map([id], contact_from_row)
            .map_err(|e| ClawError::Store(format!("Get contact: {e}")))?;
        match rows.next() {
            Some(Ok(c)) => Ok(Some(c)),
            Some(Err(e)) => Err(ClawError::Store(format!("Get contact: {e}"))),
            None => Ok(None),
        }
    }

    pub fn get_contact_by_email(&self, email: &str) -> Result<Option<Contact>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE email = ?1");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ClawError::Store(format!("Get contact: {e}")))?;
        let mut rows = stmt
            .query_map([email], contact_from_row)
            .map_err(|e| ClawError::Store(format!("Get contact: {e}")))?;
        match rows.next() {
            Some(Ok(c)) => Ok(Some(c)),
            Some(Err(e)) => Err(ClawError::Store(format!("Get contact: {e}"))),
            None => Ok(None),
        }
    }

    // ─── Sequence step administration ──────────────────────────

    /// Add a follow-up step. Step numbers start at 2 (step 1 lives in
    /// config) and at most `MAX_FOLLOW_UP_STEPS` rows may exist.
    pub fn add_step(
        &self,
        step_number: u32,
        delay_secs: i64,
        subject: &str,
        body: &str,
        sort_order: i32,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        if step_number < FIRST_FOLLOW_UP_STEP {
            return Err(ClawError::InvalidInput(format!(
                "step_number must be >= {FIRST_FOLLOW_UP_STEP} (step 1 is the first-contact email)"
            )));
        }
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sequence_steps", [], |r| r.get(0))
            .map_err(|e| ClawError::Store(format!("Count steps: {e}")))?;
        if count as usize >= MAX_FOLLOW_UP_STEPS {
            return Err(ClawError::InvalidInput(format!(
                "at most {MAX_FOLLOW_UP_STEPS} follow-up steps are supported"
            )));
        }
        conn.execute(
            "INSERT INTO sequence_steps
                (step_number, enabled, delay_secs, subject, body, sort_order, created_at, updated_at)
             VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![step_number, delay_secs.max(0), subject, body, sort_order, ts(now)],
        )
        .map_err(|e| ClawError::Store(format!("Add step: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_step_enabled(&self, step_number: u32, enabled: bool, now: DateTime<Utc>) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE sequence_steps SET enabled = ?1, updated_at = ?2 WHERE step_number = ?3",
                params![enabled as i64, ts(now), step_number],
            )
            .map_err(|e| ClawError::Store(format!("Toggle step: {e}")))?;
        Ok(())
    }

    /// Delete a step. Past `Sent(n)` statuses on contacts are untouched;
    /// only future step selection changes.
    pub fn delete_step(&self, step_number: u32) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM sequence_steps WHERE step_number = ?1",
                [step_number],
            )
            .map_err(|e| ClawError::Store(format!("Delete step: {e}")))?;
        Ok(changed > 0)
    }

    /// All steps, enabled or not, ordered by step number.
    pub fn list_steps(&self) -> Result<Vec<SequenceStep>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, step_number, enabled, delay_secs, subject, body, sort_order,
                        created_at, updated_at
                 FROM sequence_steps ORDER BY step_number ASC",
            )
            .map_err(|e| ClawError::Store(format!("List steps: {e}")))?;
        let rows = stmt
            .query_map([], step_from_row)
            .map_err(|e| ClawError::Store(format!("List steps: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ClawError::Store(format!("List steps: {e}")))
    }
}

impl SequenceStore for RecoveryDb {
    fn enabled_steps(&self) -> Result<Vec<SequenceStep>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, step_number, enabled, delay_secs, subject, body, sort_order,
                        created_at, updated_at
                 FROM sequence_steps WHERE enabled = 1 ORDER BY step_number ASC",
            )
            .map_err(|e| ClawError::Store(format!("Enabled steps: {e}")))?;
        let rows = stmt
            .query_map([], step_from_row)
            .map_err(|e| ClawError::Store(format!("Enabled steps: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ClawError::Store(format!("Enabled steps: {e}")))
    }
}

impl ContactStore for RecoveryDb {
    fn due_contacts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>> {
        let conn = self.conn.lock().unwrap();
        // NULL next_action_at sorts first under ASC, so never-scheduled rows
        // are served before everything else.
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE status_kind != 'terminal'
               AND (next_action_at IS NULL OR next_action_at <= ?1)
             ORDER BY next_action_at ASC
             LIMIT ?2"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ClawError::Store(format!("Due contacts: {e}")))?;
        let rows = stmt
            .query_map(params![ts(now), limit as i64], contact_from_row)
            .map_err(|e| ClawError::Store(format!("Due contacts: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ClawError::Store(format!("Due contacts: {e}")))
    }

    fn first_contact_eligible(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE status_kind IN ('unsent', 'captured')
               AND email_opt_in = 1
               AND email != ''
               AND abandoned_at <= ?1
             ORDER BY abandoned_at ASC
             LIMIT ?2"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ClawError::Store(format!("First-contact eligible: {e}")))?;
        let rows = stmt
            .query_map(params![ts(cutoff), limit as i64], contact_from_row)
            .map_err(|e| ClawError::Store(format!("First-contact eligible: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ClawError::Store(format!("First-contact eligible: {e}")))
    }

    fn sms_eligible(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Contact>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE status_kind != 'terminal'
               AND sms_opt_in = 1
               AND phone != ''
               AND last_step >= 1
               AND sms_first_sent_at IS NULL
               AND abandoned_at <= ?1
             ORDER BY abandoned_at ASC
             LIMIT ?2"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ClawError::Store(format!("SMS eligible: {e}")))?;
        let rows = stmt
            .query_map(params![ts(cutoff), limit as i64], contact_from_row)
            .map_err(|e| ClawError::Store(format!("SMS eligible: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ClawError::Store(format!("SMS eligible: {e}")))
    }

    fn mark_step_sent(
        &self,
        id: i64,
        step: u32,
        next_action_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE contacts
                 SET status_kind = 'sent', last_step = ?1, next_action_at = ?2,
                     last_sent_at = ?3, updated_at = ?3
                 WHERE id = ?4 AND last_step < ?1",
                params![step, ts_opt(next_action_at), ts(now), id],
            )
            .map_err(|e| ClawError::Store(format!("Mark step sent: {e}")))?;
        if changed == 0 {
            // Step would have gone backwards, or the row vanished. Either
            // way the monotonic-step invariant holds by not writing.
            tracing::warn!("Refused non-advancing step write: contact_id={id} step={step}");
        }
        Ok(())
    }

    fn park(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE contacts SET next_action_at = NULL, updated_at = ?1 WHERE id = ?2",
                params![ts(now), id],
            )
            .map_err(|e| ClawError::Store(format!("Park contact: {e}")))?;
        Ok(())
    }

    fn mark_sms_sent(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE contacts SET sms_first_sent_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![ts(now), id],
            )
            .map_err(|e| ClawError::Store(format!("Mark SMS sent: {e}")))?;
        Ok(())
    }
}
