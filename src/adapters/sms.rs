//! Twilio SMS / WhatsApp relay for accepted events.
//!
//! [`SmsSink`] formats each event as a short text and hands it to a
//! background task that posts it through the Twilio REST API.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::domain::event::preview;
use crate::domain::CanonicalEvent;

use super::sink::EventSink;

/// Twilio REST API root
pub const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Twilio WhatsApp sandbox sender
pub const WHATSAPP_SANDBOX_NUMBER: &str = "+14155238886";

/// Longest message body relayed before truncation
pub const MAX_RELAYED_CHARS: usize = 140;

/// Hard limit on a single outgoing text
pub const MAX_TEXT_CHARS: usize = 1600;

/// Relay settings (`sms` section of the config file)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub enabled: bool,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub to_number: String,
    /// Send through the WhatsApp sandbox instead of SMS
    pub use_whatsapp: bool,
}

impl SmsConfig {
    /// All four credentials are present
    pub fn has_credentials(&self) -> bool {
        !self.account_sid.is_empty()
            && !self.auth_token.is_empty()
            && !self.from_number.is_empty()
            && !self.to_number.is_empty()
    }

    /// `(from, to)` addresses for the configured channel
    pub fn addresses(&self) -> (String, String) {
        if self.use_whatsapp {
            (
                format!("whatsapp:{}", WHATSAPP_SANDBOX_NUMBER),
                format!("whatsapp:{}", self.to_number),
            )
        } else {
            (self.from_number.clone(), self.to_number.clone())
        }
    }

    fn channel(&self) -> &'static str {
        if self.use_whatsapp {
            "WhatsApp"
        } else {
            "SMS"
        }
    }
}

/// Text relayed for a message
pub fn sms_text(sender: &str, message: &str) -> String {
    let text = format!("Slack from {}: {}", sender, preview(message, MAX_RELAYED_CHARS));
    if text.chars().count() > MAX_TEXT_CHARS {
        preview(&text, MAX_TEXT_CHARS - 3)
    } else {
        text
    }
}

/// Twilio Messages API client
pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    base_url: String,
    client: reqwest::Client,
}

/// Response from the Messages API (success or error body)
#[derive(Debug, Deserialize)]
struct TwilioResponse {
    sid: Option<String>,
    code: Option<i64>,
    message: Option<String>,
}

impl TwilioClient {
    pub fn new(account_sid: String, auth_token: String) -> Self {
        Self {
            account_sid,
            auth_token,
            base_url: TWILIO_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &SmsConfig) -> Self {
        Self::new(config.account_sid.clone(), config.auth_token.clone())
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.base_url, self.account_sid)
    }

    /// Send one message. Returns the message SID.
    pub async fn send_message(&self, from: &str, to: &str, body: &str) -> Result<String> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await
            .context("Failed to send Twilio message")?;

        let status = response.status();
        let result: TwilioResponse = response
            .json()
            .await
            .context("Failed to parse Twilio response")?;

        if !status.is_success() {
            anyhow::bail!(
                "Twilio API error {}: {}",
                result.code.unwrap_or_default(),
                result.message.unwrap_or_else(|| status.to_string())
            );
        }

        result.sid.context("Twilio response has no message sid")
    }
}

/// Relays every accepted event as a text message
pub struct SmsSink {
    tx: mpsc::UnboundedSender<String>,
}

impl SmsSink {
    /// Spawn the relay task. Must be called inside a tokio runtime.
    pub fn spawn(config: SmsConfig, client: TwilioClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        info!("{} relay enabled", config.channel());
        tokio::spawn(run_relay(config, client, rx));
        Self { tx }
    }
}

impl EventSink for SmsSink {
    fn on_event(&self, event: &CanonicalEvent) {
        let text = sms_text(event.sender(), event.message());
        if self.tx.send(text).is_err() {
            debug!("Relay task has exited, dropping message");
        }
    }
}

async fn run_relay(config: SmsConfig, client: TwilioClient, mut rx: mpsc::UnboundedReceiver<String>) {
    let (from, to) = config.addresses();
    let channel = config.channel();

    while let Some(text) = rx.recv().await {
        match client.send_message(&from, &to, &text).await {
            Ok(sid) => debug!("{} sent: {}", channel, sid),
            Err(e) => error!("Failed to send {}: {:#}", channel, e),
        }
    }
}
