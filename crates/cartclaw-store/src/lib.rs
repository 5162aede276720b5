//! # CartClaw Store
//!
//! SQLite-backed persistence — survives restarts, one fixed schema.
//!
//! Two tables:
//! - `contacts`: one row per known cart/contact, keyed by email, carrying
//!   the tagged lifecycle status (kind + last step) and the next-action time.
//! - `sequence_steps`: the admin-editable follow-up messages (steps 2..=6).
//!
//! The scheduler talks to this crate only through the `ContactStore` and
//! `SequenceStore` traits; capture and order-completion events use the
//! concrete [`RecoveryDb`] methods directly.

pub mod db;

pub use db::RecoveryDb;
