//! # CartClaw Channels
//!
//! Channel-specific outbound transports. Each one reduces its provider's
//! idea of success to a single boolean-shaped `Result` for the scheduler:
//! - Email: async SMTP via lettre (STARTTLS relay).
//! - SMS: ClickSend REST API via reqwest.
//!
//! Phone numbers are normalized to E.164 here, before any transport sees
//! them.

pub mod email;
pub mod phone;
pub mod sms;

pub use email::SmtpMailer;
pub use phone::to_e164;
pub use sms::ClickSendSms;
