use anyhow::{Context, Result};
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Outbound mail transport.
///
/// Rendering is the caller's concern; implementations only deliver.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Client for the platform's HTTP mail relay.
///
/// The relay accepts `POST {base}/send` with a JSON payload and queues the
/// message for SMTP delivery. The blocking HTTP client is created lazily on
/// the first send, which happens on a blocking worker thread.
pub struct HttpRelayMailer {
    base_url: String,
    timeout: Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpRelayMailer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        if self.client.get().is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .context("Failed to build mail relay HTTP client")?;
            let _ = self.client.set(client);
        }
        Ok(self.client.get().expect("client initialized above"))
    }
}

impl Mailer for HttpRelayMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        debug!("Relaying mail to {} ({})", to, subject);
        self.client()?
            .post(format!("{}/send", self.base_url))
            .json(&json!({
                "to": to,
                "subject": subject,
                "body": body,
            }))
            .send()
            .with_context(|| format!("Mail relay request failed for {}", to))?
            .error_for_status()
            .with_context(|| format!("Mail relay rejected message for {}", to))?;
        Ok(())
    }
}

/// Accepts and drops all mail. Used when no relay is configured.
pub struct NullMailer;

impl Mailer for NullMailer {
    fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<()> {
        debug!("Mail relay not configured, dropping message to {}", to);
        Ok(())
    }
}
