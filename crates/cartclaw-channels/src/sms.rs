//! SMS transport — ClickSend REST API.
//!
//! ClickSend signals success in several shapes, so the response ladder
//! mirrors all of them: non-2xx is failure; a 2xx with undecodable JSON is
//! success; `response_code == 200` is success; a "queued for delivery"
//! `response_msg` is success; a populated `errors` array is failure; any
//! remaining 2xx is success.

use async_trait::async_trait;
use std::time::Duration;

use cartclaw_core::config::SmsConfig;
use cartclaw_core::error::{ClawError, Result};
use cartclaw_core::traits::SmsTransport;

const CLICKSEND_ENDPOINT: &str = "https://rest.clicksend.com/v3/sms/send";

/// SMS transport backed by ClickSend.
pub struct ClickSendSms {
    username: String,
    api_key: String,
    sender: String,
    client: reqwest::Client,
}

impl ClickSendSms {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            username: config.username.trim().to_string(),
            api_key: config.api_key.trim().to_string(),
            sender: config.sender.trim().to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SmsTransport for ClickSendSms {
    async fn send(&self, to: &str, message: &str) -> Result<()> {
        let to = to.trim();
        let message = message.trim();

        if to.is_empty() {
            return Err(ClawError::InvalidInput("Phone number is empty".into()));
        }
        if message.is_empty() {
            return Err(ClawError::InvalidInput("Message is empty".into()));
        }
        if self.username.is_empty() || self.api_key.is_empty() {
            return Err(ClawError::Delivery(
                "ClickSend username or API key not configured".into(),
            ));
        }

        let payload = serde_json::json!({
            "messages": [{
                "source": "cartclaw",
                "from": self.sender,
                "body": message,
                "to": to,
            }]
        });

        tracing::debug!("Sending SMS to {to} via ClickSend");

        let resp = self
            .client
            .post(CLICKSEND_ENDPOINT)
            .basic_auth(&self.username, Some(&self.api_key))
            .json(&payload)
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|e| ClawError::Delivery(format!("ClickSend request: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!("ClickSend HTTP {status} response: {body}");

        if !status.is_success() {
            return Err(ClawError::Delivery(format!(
                "ClickSend returned HTTP {status}"
            )));
        }

        interpret_body(&body)?;
        tracing::info!("📱 SMS sent to: {to}");
        Ok(())
    }
}

/// Reduce a 2xx ClickSend response body to success or failure.
fn interpret_body(body: &str) -> Result<()> {
    let decoded: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            // HTTP OK but not valid JSON — assume success but log it.
            tracing::warn!("Could not decode ClickSend JSON response; treating as success");
            return Ok(());
        }
    };

    if decoded["response_code"].as_i64() == Some(200) {
        return Ok(());
    }

    if let Some(msg) = decoded["response_msg"].as_str() {
        if msg.to_lowercase().contains("queued for delivery") {
            return Ok(());
        }
    }

    if let Some(errors) = decoded.get("errors") {
        let populated = match errors {
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Null => false,
            serde_json::Value::Object(o) => !o.is_empty(),
            _ => true,
        };
        if populated {
            return Err(ClawError::Delivery(format!("ClickSend error: {errors}")));
        }
    }

    // 2xx with no obvious error.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_code_success() {
        assert!(interpret_body(r#"{"response_code": 200}"#).is_ok());
    }

    #[test]
    fn test_queued_message_success() {
        assert!(
            interpret_body(r#"{"response_msg": "Messages queued for delivery."}"#).is_ok()
        );
    }

    #[test]
    fn test_errors_array_fails() {
        let err = interpret_body(r#"{"errors": [{"message": "invalid recipient"}]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_errors_is_success() {
        assert!(interpret_body(r#"{"errors": []}"#).is_ok());
    }

    #[test]
    fn test_invalid_json_is_forgiven() {
        assert!(interpret_body("<html>ok</html>").is_ok());
    }

    #[test]
    fn test_plain_2xx_is_success() {
        assert!(interpret_body(r#"{"data": {}}"#).is_ok());
    }
}
