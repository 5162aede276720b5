//! # CartClaw — Abandoned-Cart Recovery
//!
//! Captures checkout contacts and walks them through a follow-up
//! email/SMS sequence until they recover their cart or the sequence runs
//! out.
//!
//! Usage:
//!   cartclaw run                         # Start the scheduler loop
//!   cartclaw tick                        # One scheduler pass, then exit
//!   cartclaw steps list                  # Show the follow-up sequence
//!   cartclaw capture --email jo@x.com    # Record an abandoned checkout
//!   cartclaw complete jo@x.com           # Cart recovered, stop messaging

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cartclaw_channels::{ClickSendSms, SmtpMailer, to_e164};
use cartclaw_core::{ClawConfig, SmsTransport, SystemClock, TerminalReason};
use cartclaw_scheduler::{Dispatcher, MemoryRunLock, RecoveryRunner, spawn_scheduler};
use cartclaw_store::RecoveryDb;

#[derive(Parser)]
#[command(
    name = "cartclaw",
    version,
    about = "🛒 CartClaw — Abandoned-Cart Recovery"
)]
struct Cli {
    /// Config file (default: ~/.cartclaw/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the recovery scheduler loop
    Run,
    /// Execute one scheduler pass and exit
    Tick,
    /// Manage the follow-up sequence
    Steps {
        #[command(subcommand)]
        action: StepsAction,
    },
    /// Record an abandoned checkout contact
    Capture {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        cart_key: String,
        #[arg(long, default_value = "")]
        session_key: String,
        /// Contact declined email follow-ups
        #[arg(long)]
        no_email: bool,
        /// Contact declined SMS follow-ups
        #[arg(long)]
        no_sms: bool,
    },
    /// End a contact's sequence (cart recovered, unsubscribed, ...)
    Complete {
        email: String,
        #[arg(long, default_value = "recovered")]
        reason: String,
    },
    /// Send a test SMS through ClickSend
    TestSms {
        /// Recipient phone number (local or E.164)
        to: String,
        #[arg(long, default_value = "CartClaw test message")]
        message: String,
    },
}

#[derive(Subcommand)]
enum StepsAction {
    /// Show all configured steps
    List,
    /// Add a follow-up step (2..=6)
    Add {
        step: u32,
        /// Delay after the previous step, in seconds
        delay_secs: i64,
        subject: String,
        body: String,
        #[arg(long, default_value = "0")]
        sort: i32,
    },
    /// Enable a step
    Enable { step: u32 },
    /// Disable a step (the scheduler skips over it)
    Disable { step: u32 },
    /// Delete a step definition
    Delete { step: u32 },
}

fn open_db(config: &ClawConfig) -> Result<Arc<RecoveryDb>> {
    let db_path = shellexpand::tilde(&config.store.db_path).to_string();
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(RecoveryDb::open(std::path::Path::new(&db_path))?))
}

fn build_runner(config: &ClawConfig, db: Arc<RecoveryDb>) -> RecoveryRunner {
    let clock = Arc::new(SystemClock);
    let dispatcher = Dispatcher::new(
        Arc::new(SmtpMailer::new(config.smtp.clone())),
        config.site.clone(),
        config.first_email.clone(),
    );
    let sms: Option<Arc<dyn SmsTransport>> = if config.sms.enabled {
        Some(Arc::new(ClickSendSms::new(&config.sms)))
    } else {
        None
    };
    let lock = Arc::new(MemoryRunLock::new(
        clock.clone(),
        config.scheduler.cooldown_ttl_secs,
        config.scheduler.overlap_ttl_secs,
    ));
    RecoveryRunner::new(
        db.clone(),
        db,
        dispatcher,
        sms,
        lock,
        clock,
        config.clone(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "cartclaw=debug,cartclaw_scheduler=debug,cartclaw_store=debug"
    } else {
        "cartclaw=info,cartclaw_scheduler=info,cartclaw_store=info,cartclaw_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => ClawConfig::load_from(std::path::Path::new(path))?,
        None => ClawConfig::load()?,
    };
    let now = chrono::Utc::now();

    match cli.command {
        Command::Run => {
            let db = open_db(&config)?;
            let runner = Arc::new(build_runner(&config, db));
            println!("🛒 CartClaw v{}", env!("CARGO_PKG_VERSION"));
            println!("   🗄️  Database: {}", config.store.db_path);
            println!("   ⏰ Interval: {}s", config.scheduler.check_interval_secs);
            println!(
                "   📱 SMS:      {}",
                if config.sms.enabled { "enabled" } else { "disabled" }
            );
            spawn_scheduler(runner, config.scheduler.check_interval_secs).await;
        }

        Command::Tick => {
            let db = open_db(&config)?;
            let runner = build_runner(&config, db);
            let summary = runner.run().await;
            if summary.skipped {
                println!("⏭️  Skipped: another run is active or cooling down");
            } else {
                println!(
                    "✅ {} first email(s), {} follow-up(s), {} sms, {} parked, {} failed",
                    summary.first_contact_sent,
                    summary.follow_ups_sent,
                    summary.sms_sent,
                    summary.parked,
                    summary.failed
                );
            }
        }

        Command::Steps { action } => {
            let db = open_db(&config)?;
            match action {
                StepsAction::List => {
                    let steps = db.list_steps()?;
                    if steps.is_empty() {
                        println!("No follow-up steps configured.");
                    }
                    for s in steps {
                        println!(
                            "{} step {} — after {}s — {}",
                            if s.enabled { "✅" } else { "⏸️ " },
                            s.step_number,
                            s.delay_secs,
                            s.subject
                        );
                    }
                }
                StepsAction::Add {
                    step,
                    delay_secs,
                    subject,
                    body,
                    sort,
                } => {
                    db.add_step(step, delay_secs, &subject, &body, sort, now)?;
                    println!("✅ Step {step} added");
                }
                StepsAction::Enable { step } => {
                    db.set_step_enabled(step, true, now)?;
                    println!("✅ Step {step} enabled");
                }
                StepsAction::Disable { step } => {
                    db.set_step_enabled(step, false, now)?;
                    println!("⏸️  Step {step} disabled");
                }
                StepsAction::Delete { step } => {
                    if db.delete_step(step)? {
                        println!("🗑️  Step {step} deleted");
                    } else {
                        println!("⚠️  No step {step} to delete");
                    }
                }
            }
        }

        Command::Capture {
            email,
            name,
            phone,
            cart_key,
            session_key,
            no_email,
            no_sms,
        } => {
            let db = open_db(&config)?;
            let id = db.upsert_contact(
                &email,
                &name,
                &phone,
                &cart_key,
                &session_key,
                !no_email,
                !no_sms,
                now,
            )?;
            println!("✅ Captured {email} (contact {id})");
        }

        Command::Complete { email, reason } => {
            let reason = TerminalReason::parse(&reason)
                .ok_or_else(|| anyhow::anyhow!("Unknown reason '{reason}'"))?;
            let db = open_db(&config)?;
            if db.mark_terminal(&email, reason, now)? > 0 {
                println!("🏁 {email}: sequence ended ({})", reason.as_str());
            } else {
                println!("⚠️  No active contact for {email}");
            }
        }

        Command::TestSms { to, message } => {
            let Some(to) = to_e164(&to, &config.sms.default_country) else {
                anyhow::bail!("Cannot format '{to}' as E.164");
            };
            let sms = ClickSendSms::new(&config.sms);
            sms.send(&to, &message).await?;
            println!("📱 Test SMS sent to {to}");
        }
    }

    Ok(())
}
