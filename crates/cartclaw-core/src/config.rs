//! CartClaw configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ClawError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClawConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub first_email: FirstEmailConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl ClawConfig {
    /// Load config from the default path (~/.cartclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ClawError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the CartClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cartclaw")
    }
}

/// Storefront identity used for template tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_store_name")]
    pub store_name: String,
    /// Recovery link substituted for `{cart_url}`.
    #[serde(default = "default_cart_url")]
    pub cart_url: String,
}

fn default_store_name() -> String { "Our store".into() }
fn default_cart_url() -> String { "https://example.com/cart/".into() }

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            store_name: default_store_name(),
            cart_url: default_cart_url(),
        }
    }
}

/// Scheduler timing and batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Nominal trigger period. The runner is safe at any real cadence;
    /// the lock does the gating.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Max contacts touched per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Blocks back-to-back trigger hits.
    #[serde(default = "default_cooldown_ttl")]
    pub cooldown_ttl_secs: u64,
    /// Blocks concurrent runs; keep shorter than the trigger period.
    #[serde(default = "default_overlap_ttl")]
    pub overlap_ttl_secs: u64,
    /// Scales every configured delay. 1.0 in production; set e.g. 0.01 to
    /// compress a 3-day sequence into minutes on a staging box.
    #[serde(default = "default_delay_multiplier")]
    pub delay_multiplier: f64,
}

fn default_check_interval() -> u64 { 300 }
fn default_batch_size() -> usize { 50 }
fn default_cooldown_ttl() -> u64 { 90 }
fn default_overlap_ttl() -> u64 { 240 }
fn default_delay_multiplier() -> f64 { 1.0 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            batch_size: default_batch_size(),
            cooldown_ttl_secs: default_cooldown_ttl(),
            overlap_ttl_secs: default_overlap_ttl(),
            delay_multiplier: default_delay_multiplier(),
        }
    }
}

/// The step-1 message. Lives in config, not the sequence table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstEmailConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Delay after abandonment before the first email goes out.
    #[serde(default = "default_first_delay")]
    pub delay_secs: u64,
    #[serde(default = "default_first_subject")]
    pub subject: String,
    #[serde(default = "default_first_body")]
    pub body: String,
}

fn bool_true() -> bool { true }
fn default_first_delay() -> u64 { 1800 }
fn default_first_subject() -> String {
    "We saved your cart at {site_name}".into()
}
fn default_first_body() -> String {
    "Hi {name},\n\nYou left items in your cart at {site_name}.\n\nFinish here:\n{cart_url}".into()
}

impl Default for FirstEmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: default_first_delay(),
            subject: default_first_subject(),
            body: default_first_body(),
        }
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_smtp_port() -> u16 { 587 }

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            email: String::new(),
            password: String::new(),
            display_name: None,
        }
    }
}

/// ClickSend SMS settings. The SMS reminder fires once per contact, after
/// the first email has had time to land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_sms_sender")]
    pub sender: String,
    #[serde(default = "default_sms_template")]
    pub template: String,
    /// Delay after the first email before the SMS goes out.
    #[serde(default = "default_sms_delay")]
    pub delay_secs: u64,
    /// Two-letter country code for normalizing local phone numbers.
    #[serde(default = "default_sms_country")]
    pub default_country: String,
}

fn default_sms_sender() -> String { "CartClaw".into() }
fn default_sms_template() -> String {
    "Hi {name}, you left something in your cart at {site_name}. Finish your order here: {cart_url}"
        .into()
}
fn default_sms_delay() -> u64 { 259_200 }
fn default_sms_country() -> String { "AU".into() }

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: String::new(),
            api_key: String::new(),
            sender: default_sms_sender(),
            template: default_sms_template(),
            delay_secs: default_sms_delay(),
            default_country: default_sms_country(),
        }
    }
}

/// Persistence location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.cartclaw/cartclaw.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}
