//! Channel transports.
//!
//! One transport per delivery channel, behind the [`ChannelTransport`]
//! trait so the dispatcher treats every channel uniformly. Transports own
//! per-channel formatting; the engine hands them a structured
//! [`AlertPayload`] and never pre-renders strings.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use catalyst_core::{defaults, AlertPayload, AlertRecipient, Channel, Error, Result};

/// A single delivery channel capable of sending one alert.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// The channel this transport serves.
    fn channel(&self) -> Channel;

    /// Deliver one alert to one recipient.
    ///
    /// A missing recipient address for this channel is an error; the
    /// dispatcher records it as a failed leg without aborting the others.
    async fn send(&self, recipient: &AlertRecipient, payload: &AlertPayload) -> Result<()>;
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(defaults::TRANSPORT_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))
}

// =============================================================================
// EMAIL
// =============================================================================

/// Email transport speaking the SendGrid v3 mail-send API.
pub struct EmailTransport {
    client: Client,
    api_url: String,
    api_key: String,
    from_address: String,
}

impl EmailTransport {
    pub const DEFAULT_API_URL: &'static str = "https://api.sendgrid.com/v3/mail/send";

    pub fn new(api_key: String, from_address: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_url: Self::DEFAULT_API_URL.to_string(),
            api_key,
            from_address,
        })
    }

    /// Create from `SENDGRID_API_KEY` and `ALERT_FROM_ADDRESS`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("SENDGRID_API_KEY")
            .map_err(|_| Error::Config("SENDGRID_API_KEY not set".into()))?;
        let from_address = std::env::var("ALERT_FROM_ADDRESS")
            .unwrap_or_else(|_| "alerts@catalystradar.app".to_string());
        Self::new(api_key, from_address)
    }

    /// Override the API endpoint (used by tests against a local stub).
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = url;
        self
    }

    /// Subject line: ticker plus the search that matched.
    fn subject(payload: &AlertPayload) -> String {
        format!(
            "New catalyst alert: {} ({})",
            payload.ticker_display(),
            payload.search_name
        )
    }

    /// HTML body with the full field table.
    fn body_html(payload: &AlertPayload) -> String {
        let mut rows = String::new();
        let mut row = |label: &str, value: String| {
            rows.push_str(&format!(
                "<tr><td><b>{label}</b></td><td>{value}</td></tr>"
            ));
        };

        row("Ticker", payload.ticker_display().to_string());
        if let Some(sponsor) = &payload.sponsor {
            row("Sponsor", sponsor.clone());
        }
        if let Some(phase) = payload.phase {
            row("Phase", phase.to_string());
        }
        if let Some(area) = &payload.therapeutic_area {
            row("Therapeutic area", area.clone());
        }
        if let Some(date) = payload.completion_date {
            let days = payload
                .days_until
                .map(|d| format!(" ({d} days)"))
                .unwrap_or_default();
            row("Expected completion", format!("{date}{days}"));
        }
        row("Market cap", payload.market_cap_display());
        row("Price", payload.price_display());
        if let Some(enrollment) = payload.enrollment {
            row("Enrollment", enrollment.to_string());
        }
        if let Some(nct) = &payload.nct_id {
            row(
                "Registry ID",
                format!("<a href=\"https://clinicaltrials.gov/study/{nct}\">{nct}</a>"),
            );
        }

        format!(
            "<h2>{}</h2><p>Your saved search <b>{}</b> matched a new catalyst.</p>\
             <table>{rows}</table>",
            payload.ticker_display(),
            payload.search_name
        )
    }
}

#[async_trait]
impl ChannelTransport for EmailTransport {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, recipient: &AlertRecipient, payload: &AlertPayload) -> Result<()> {
        let to = recipient
            .email
            .as_deref()
            .ok_or_else(|| Error::Transport("recipient has no email address".into()))?;

        let body = serde_json::json!({
            "personalizations": [{"to": [{"email": to}]}],
            "from": {"email": self.from_address},
            "subject": Self::subject(payload),
            "content": [{"type": "text/html", "value": Self::body_html(payload)}],
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("email send failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "email provider returned {}",
                response.status()
            )));
        }

        debug!(
            channel = "email",
            ticker = payload.ticker_display(),
            "Alert email accepted by provider"
        );
        Ok(())
    }
}

// =============================================================================
// SMS
// =============================================================================

/// SMS transport speaking the Twilio messages API.
pub struct SmsTransport {
    client: Client,
    api_url: String,
    auth_token: String,
    account_sid: String,
    from_number: String,
}

impl SmsTransport {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Result<Self> {
        let api_url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Messages.json"
        );
        Ok(Self {
            client: http_client()?,
            api_url,
            auth_token,
            account_sid,
            from_number,
        })
    }

    /// Create from `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_FROM_NUMBER`.
    pub fn from_env() -> Result<Self> {
        let sid = std::env::var("TWILIO_ACCOUNT_SID")
            .map_err(|_| Error::Config("TWILIO_ACCOUNT_SID not set".into()))?;
        let token = std::env::var("TWILIO_AUTH_TOKEN")
            .map_err(|_| Error::Config("TWILIO_AUTH_TOKEN not set".into()))?;
        let from = std::env::var("TWILIO_FROM_NUMBER")
            .map_err(|_| Error::Config("TWILIO_FROM_NUMBER not set".into()))?;
        Self::new(sid, token, from)
    }

    /// Override the API endpoint (used by tests against a local stub).
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = url;
        self
    }

    /// Single-line body sized for one SMS segment where possible.
    fn body_text(payload: &AlertPayload) -> String {
        let phase = payload
            .phase
            .map(|p| format!("Ph{p}"))
            .unwrap_or_else(|| "Ph?".to_string());
        let days = payload
            .days_until
            .map(|d| format!(", {d}d to catalyst"))
            .unwrap_or_default();
        format!(
            "Catalyst alert [{}]: {} {} {}{days}. Cap {}",
            payload.search_name,
            payload.ticker_display(),
            phase,
            payload.therapeutic_area.as_deref().unwrap_or("n/a"),
            payload.market_cap_display(),
        )
    }
}

#[async_trait]
impl ChannelTransport for SmsTransport {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, recipient: &AlertRecipient, payload: &AlertPayload) -> Result<()> {
        let to = recipient
            .phone_number
            .as_deref()
            .ok_or_else(|| Error::Transport("recipient has no phone number".into()))?;

        let form = [
            ("To", to),
            ("From", self.from_number.as_str()),
            ("Body", &Self::body_text(payload)),
        ];

        let response = self
            .client
            .post(&self.api_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("sms send failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "sms provider returned {}",
                response.status()
            )));
        }

        debug!(
            channel = "sms",
            ticker = payload.ticker_display(),
            "Alert SMS accepted by provider"
        );
        Ok(())
    }
}

// =============================================================================
// CHAT WEBHOOK
// =============================================================================

/// Chat transport posting Slack-compatible JSON to a user-supplied webhook.
///
/// Unlike email and SMS, the endpoint is per-recipient: each user pastes
/// their own incoming-webhook URL into their preferences.
pub struct ChatWebhookTransport {
    client: Client,
}

impl ChatWebhookTransport {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }

    fn body_json(payload: &AlertPayload) -> serde_json::Value {
        let phase = payload
            .phase
            .map(|p| format!("Phase {p}"))
            .unwrap_or_else(|| "Phase unknown".to_string());
        let completion = match (payload.completion_date, payload.days_until) {
            (Some(date), Some(days)) => format!("{date} ({days} days)"),
            (Some(date), None) => date.to_string(),
            _ => "unknown".to_string(),
        };
        serde_json::json!({
            "text": format!(
                ":rotating_light: *{}*; {}\n{} | {} | cap {} | price {}\nExpected completion: {}",
                payload.ticker_display(),
                payload.search_name,
                phase,
                payload.therapeutic_area.as_deref().unwrap_or("n/a"),
                payload.market_cap_display(),
                payload.price_display(),
                completion,
            )
        })
    }
}

#[async_trait]
impl ChannelTransport for ChatWebhookTransport {
    fn channel(&self) -> Channel {
        Channel::ChatWebhook
    }

    async fn send(&self, recipient: &AlertRecipient, payload: &AlertPayload) -> Result<()> {
        let url = recipient
            .webhook_url
            .as_deref()
            .ok_or_else(|| Error::Transport("recipient has no webhook URL".into()))?;

        let response = self
            .client
            .post(url)
            .json(&Self::body_json(payload))
            .send()
            .await
            .map_err(|e| Error::Transport(format!("webhook send failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "webhook endpoint returned {}",
                response.status()
            )));
        }

        debug!(
            channel = "chat_webhook",
            ticker = payload.ticker_display(),
            "Alert webhook accepted"
        );
        Ok(())
    }
}

// =============================================================================
// MOCK
// =============================================================================

/// In-memory transport for tests: records every send and can be told to
/// fail the first N attempts or all of them.
pub struct MockTransport {
    channel: Channel,
    sends: std::sync::Mutex<Vec<AlertPayload>>,
    fail_first: std::sync::atomic::AtomicU32,
    fail_always: bool,
}

impl MockTransport {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sends: std::sync::Mutex::new(Vec::new()),
            fail_first: std::sync::atomic::AtomicU32::new(0),
            fail_always: false,
        }
    }

    /// Fail the first `n` send attempts, then succeed.
    pub fn failing_first(channel: Channel, n: u32) -> Self {
        let t = Self::new(channel);
        t.fail_first.store(n, std::sync::atomic::Ordering::SeqCst);
        t
    }

    /// Fail every send attempt.
    pub fn always_failing(channel: Channel) -> Self {
        let mut t = Self::new(channel);
        t.fail_always = true;
        t
    }

    /// Payloads successfully "delivered" so far.
    pub fn sent(&self) -> Vec<AlertPayload> {
        self.sends.lock().expect("mock lock poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sends.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, _recipient: &AlertRecipient, payload: &AlertPayload) -> Result<()> {
        if self.fail_always {
            return Err(Error::Transport("mock transport configured to fail".into()));
        }
        let remaining = self.fail_first.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first
                .store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
            return Err(Error::Transport("mock transient failure".into()));
        }
        self.sends
            .lock()
            .expect("mock lock poisoned")
            .push(payload.clone());
        Ok(())
    }
}
