//! Message dispatch: resolve the template for a step, substitute tokens,
//! hand the result to a transport. Dispatch never touches the store; the
//! runner records outcomes.

use std::collections::BTreeMap;
use std::sync::Arc;

use cartclaw_core::config::{FirstEmailConfig, SiteConfig};
use cartclaw_core::error::{ClawError, Result};
use cartclaw_core::traits::EmailTransport;
use cartclaw_core::types::{Contact, SequenceStep};

// Used when a configured step leaves subject or body blank.
const FALLBACK_SUBJECT: &str = "Reminder from {site_name}";
const FALLBACK_BODY: &str = "Hi {name},\n\nJust a reminder – your cart is still waiting.\n\n{cart_url}";

/// Substitute `{name}`, `{site_name}` and `{cart_url}` in a template.
/// An empty contact name becomes "there".
pub fn render(template: &str, contact: &Contact, site: &SiteConfig) -> String {
    let name = contact.name.trim();
    let name = if name.is_empty() { "there" } else { name };
    template
        .replace("{name}", name)
        .replace("{site_name}", &site.store_name)
        .replace("{cart_url}", &site.cart_url)
}

/// Resolves and sends the email for a given step.
pub struct Dispatcher {
    email: Arc<dyn EmailTransport>,
    site: SiteConfig,
    first_email: FirstEmailConfig,
}

impl Dispatcher {
    pub fn new(
        email: Arc<dyn EmailTransport>,
        site: SiteConfig,
        first_email: FirstEmailConfig,
    ) -> Self {
        Self {
            email,
            site,
            first_email,
        }
    }

    /// Send the email for `step` to `contact`. Step 1 comes from config;
    /// steps 2 and up come from `steps`.
    pub async fn send_step(
        &self,
        contact: &Contact,
        step: u32,
        steps: &BTreeMap<u32, SequenceStep>,
    ) -> Result<()> {
        let (subject, body) = self.resolve(step, steps)?;
        let subject = render(&subject, contact, &self.site);
        let body = render(&body, contact, &self.site);
        tracing::debug!(
            "Dispatching step {step} email to {} (contact {})",
            contact.email,
            contact.id
        );
        self.email.send(&contact.email, &subject, &body).await
    }

    fn resolve(&self, step: u32, steps: &BTreeMap<u32, SequenceStep>) -> Result<(String, String)> {
        if step == 1 {
            return Ok((
                self.first_email.subject.clone(),
                self.first_email.body.clone(),
            ));
        }
        let def = steps
            .get(&step)
            .ok_or_else(|| ClawError::InvalidInput(format!("No definition for step {step}")))?;
        let subject = if def.subject.trim().is_empty() {
            FALLBACK_SUBJECT.to_string()
        } else {
            def.subject.clone()
        };
        let body = if def.body.trim().is_empty() {
            FALLBACK_BODY.to_string()
        } else {
            def.body.clone()
        };
        Ok((subject, body))
    }
}
