//! Core data models for the catalyst alerting engine.
//!
//! These types are shared across all engine crates and represent the
//! persisted entities (saved searches, notification history, preferences)
//! and the read-only candidate records consumed from the upstream catalog.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::defaults;
use crate::filter::FilterPredicate;

// =============================================================================
// CHANNELS AND TIERS
// =============================================================================

/// A notification delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    ChatWebhook,
}

impl Channel {
    /// All known channels, in dispatch order.
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::ChatWebhook];

    /// Stable string form used for TEXT[] storage and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::ChatWebhook => "chat_webhook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "chat_webhook" => Ok(Channel::ChatWebhook),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown channel: {other}"
            ))),
        }
    }
}

/// Subscription tier of a user account.
///
/// Tier assignment itself is owned by the billing system; the engine only
/// reads the current tier to gate channels at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Trial,
    Pro,
}

impl Tier {
    /// Channels this tier is allowed to use.
    ///
    /// Free and trial accounts are email-only; paid accounts get everything.
    pub fn permitted_channels(&self) -> &'static [Channel] {
        match self {
            Tier::Free | Tier::Trial => &[Channel::Email],
            Tier::Pro => &Channel::ALL,
        }
    }

    /// Whether this tier may use the given channel.
    pub fn permits(&self, channel: Channel) -> bool {
        self.permitted_channels().contains(&channel)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Trial => "trial",
            Tier::Pro => "pro",
        }
    }
}

impl FromStr for Tier {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "trial" => Ok(Tier::Trial),
            "pro" => Ok(Tier::Pro),
            other => Err(crate::Error::InvalidInput(format!("unknown tier: {other}"))),
        }
    }
}

// =============================================================================
// SAVED SEARCHES
// =============================================================================

/// A user-defined, persistent filter re-evaluated against new catalog data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Display label, non-empty.
    pub name: String,
    pub filter: FilterPredicate,
    /// Channels to notify on, non-empty. Re-checked against the owner's
    /// current tier at dispatch time.
    pub channels: Vec<Channel>,
    /// Inactive searches are skipped by the scheduler but kept for history.
    pub active: bool,
    /// Watermark: only candidates with `created_at` strictly after this are
    /// considered on the next scan. `None` means the search has never run.
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a saved search (produced by the search-builder UI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSavedSearchRequest {
    pub user_id: Uuid,
    pub name: String,
    pub filter: FilterPredicate,
    pub channels: Vec<Channel>,
}

impl CreateSavedSearchRequest {
    /// Validate the request before it reaches storage.
    ///
    /// The filter must carry at least one constraint, the name must be
    /// non-empty, and the channel set must be non-empty.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "saved search name must be non-empty".into(),
            ));
        }
        if self.channels.is_empty() {
            return Err(crate::Error::InvalidInput(
                "saved search must have at least one notification channel".into(),
            ));
        }
        self.filter.validate()
    }
}

// =============================================================================
// CANDIDATES
// =============================================================================

/// One record from the upstream catalyst catalog.
///
/// Consumed strictly read-only; the engine never mutates candidates.
/// Optional fields reflect the reality of scraped data; a missing value
/// never satisfies a predicate constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub ticker: Option<String>,
    pub sponsor: Option<String>,
    /// Clinical trial phase (2 or 3 for alertable catalysts).
    pub phase: Option<i16>,
    pub therapeutic_area: Option<String>,
    /// Market capitalization in whole dollars.
    pub market_cap: Option<i64>,
    /// Expected trial completion date (the catalyst date).
    pub completion_date: Option<NaiveDate>,
    pub enrollment: Option<i32>,
    /// Trial registry identifier (e.g. NCT number).
    pub nct_id: Option<String>,
    pub current_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// NOTIFICATION HISTORY
// =============================================================================

/// One delivered (or attempted) notification.
///
/// The `(saved_search_id, candidate_id)` pair is the natural key and is
/// unique at the storage layer; that constraint, not this struct, is the
/// dedup correctness guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub saved_search_id: Uuid,
    pub candidate_id: Uuid,
    pub user_id: Uuid,
    /// Channels that were attempted, not only those that succeeded.
    pub channels_used: Vec<Channel>,
    pub sent_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Why a matched candidate was not (and will not be) notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// A notification record already exists for this pair.
    AlreadyNotified,
    /// The pair was previously suppressed and logged.
    PreviouslySuppressed,
    /// No overlap between configured channels and tier-permitted channels.
    NoEligibleChannels,
    /// The user's daily alert cap was reached.
    DailyCapReached,
    /// Deferred through quiet hours for longer than the deferral window.
    StaleDeferral,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressReason::AlreadyNotified => "already_notified",
            SuppressReason::PreviouslySuppressed => "previously_suppressed",
            SuppressReason::NoEligibleChannels => "no_eligible_channels",
            SuppressReason::DailyCapReached => "daily_cap_reached",
            SuppressReason::StaleDeferral => "stale_deferral",
        }
    }
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PREFERENCES
// =============================================================================

/// Per-user notification preferences, upserted by the settings UI and
/// read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: Uuid,
    pub max_alerts_per_day: i32,
    /// Start of the quiet window, local time of day.
    pub quiet_hours_start: Option<NaiveTime>,
    /// End of the quiet window, local time of day. May be earlier than the
    /// start for overnight windows.
    pub quiet_hours_end: Option<NaiveTime>,
    /// IANA timezone name used to resolve quiet hours.
    pub timezone: String,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub chat_webhook_enabled: bool,
    pub phone_number: Option<String>,
    pub webhook_url: Option<String>,
}

impl NotificationPreferences {
    /// Defaults applied when a user has no preferences row yet.
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            max_alerts_per_day: defaults::MAX_ALERTS_PER_DAY,
            quiet_hours_start: None,
            quiet_hours_end: None,
            timezone: defaults::DEFAULT_TIMEZONE.to_string(),
            email_enabled: true,
            sms_enabled: false,
            chat_webhook_enabled: false,
            phone_number: None,
            webhook_url: None,
        }
    }

    /// Whether the user has this channel enabled in their settings.
    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_enabled,
            Channel::Sms => self.sms_enabled,
            Channel::ChatWebhook => self.chat_webhook_enabled,
        }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Delivery addresses for one user, resolved at dispatch time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertRecipient {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub webhook_url: Option<String>,
}

/// Structured alert content handed to channel transports.
///
/// Transports own per-channel formatting; the engine never pre-renders
/// strings into this payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub search_name: String,
    pub ticker: Option<String>,
    pub sponsor: Option<String>,
    pub phase: Option<i16>,
    pub therapeutic_area: Option<String>,
    pub completion_date: Option<NaiveDate>,
    /// Days until the catalyst date, relative to payload construction.
    pub days_until: Option<i64>,
    pub market_cap: Option<i64>,
    pub current_price: Option<f64>,
    pub enrollment: Option<i32>,
    pub nct_id: Option<String>,
    pub candidate_id: Uuid,
}

impl AlertPayload {
    /// Build a payload from a matched candidate.
    pub fn new(search_name: &str, candidate: &Candidate, now: DateTime<Utc>) -> Self {
        let days_until = candidate
            .completion_date
            .map(|d| (d - now.date_naive()).num_days());
        Self {
            search_name: search_name.to_string(),
            ticker: candidate.ticker.clone(),
            sponsor: candidate.sponsor.clone(),
            phase: candidate.phase,
            therapeutic_area: candidate.therapeutic_area.clone(),
            completion_date: candidate.completion_date,
            days_until,
            market_cap: candidate.market_cap,
            current_price: candidate.current_price,
            enrollment: candidate.enrollment,
            nct_id: candidate.nct_id.clone(),
            candidate_id: candidate.id,
        }
    }

    /// Ticker or a placeholder for candidates that lost their mapping.
    pub fn ticker_display(&self) -> &str {
        self.ticker.as_deref().unwrap_or("N/A")
    }

    /// Market cap formatted in billions, e.g. `$1.50B`.
    pub fn market_cap_display(&self) -> String {
        match self.market_cap {
            Some(cap) => format!("${:.2}B", cap as f64 / 1_000_000_000.0),
            None => "N/A".to_string(),
        }
    }

    /// Current share price formatted as dollars.
    pub fn price_display(&self) -> String {
        match self.current_price {
            Some(p) => format!("${p:.2}"),
            None => "N/A".to_string(),
        }
    }
}

/// Failure of one channel leg during a dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFailure {
    pub channel: Channel,
    pub error: String,
}

/// Outcome of dispatching one notification across channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    /// The notification record id, or `None` if a concurrent dispatch
    /// already recorded this pair (dedup constraint hit).
    pub record_id: Option<Uuid>,
    pub attempted: Vec<Channel>,
    pub succeeded: Vec<Channel>,
    pub failed: Vec<ChannelFailure>,
}

impl DispatchResult {
    /// Whether every attempted channel leg succeeded.
    pub fn fully_delivered(&self) -> bool {
        self.failed.is_empty() && !self.succeeded.is_empty()
    }
}

// =============================================================================
// SCAN STATISTICS
// =============================================================================

/// Summary of one scan cycle, logged on completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub searches_checked: u64,
    pub matches_found: u64,
    pub notifications_sent: u64,
    pub suppressed: u64,
    pub deferred: u64,
    pub errors: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanStats {
    /// Fold one search's outcome into the cycle totals.
    pub fn absorb(&mut self, other: &ScanStats) {
        self.searches_checked += other.searches_checked;
        self.matches_found += other.matches_found;
        self.notifications_sent += other.notifications_sent;
        self.suppressed += other.suppressed;
        self.deferred += other.deferred;
        self.errors += other.errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_round_trip() {
        for channel in Channel::ALL {
            let parsed: Channel = channel.as_str().parse().unwrap();
            assert_eq!(parsed, channel);
        }
    }

    #[test]
    fn test_channel_unknown_rejected() {
        assert!("carrier_pigeon".parse::<Channel>().is_err());
    }

    #[test]
    fn test_channel_serde_snake_case() {
        let json = serde_json::to_string(&Channel::ChatWebhook).unwrap();
        assert_eq!(json, "\"chat_webhook\"");
    }

    #[test]
    fn test_tier_free_is_email_only() {
        assert_eq!(Tier::Free.permitted_channels(), &[Channel::Email]);
        assert!(!Tier::Free.permits(Channel::Sms));
        assert!(!Tier::Trial.permits(Channel::ChatWebhook));
    }

    #[test]
    fn test_tier_pro_permits_all() {
        for channel in Channel::ALL {
            assert!(Tier::Pro.permits(channel));
        }
    }

    #[test]
    fn test_create_request_rejects_empty_name() {
        let req = CreateSavedSearchRequest {
            user_id: Uuid::new_v4(),
            name: "  ".to_string(),
            filter: FilterPredicate::default().with_phase(3),
            channels: vec![Channel::Email],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_rejects_empty_channels() {
        let req = CreateSavedSearchRequest {
            user_id: Uuid::new_v4(),
            name: "oncology small caps".to_string(),
            filter: FilterPredicate::default().with_phase(3),
            channels: vec![],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_preferences_defaults() {
        let user_id = Uuid::new_v4();
        let prefs = NotificationPreferences::defaults_for(user_id);
        assert_eq!(prefs.max_alerts_per_day, 10);
        assert_eq!(prefs.timezone, "UTC");
        assert!(prefs.email_enabled);
        assert!(!prefs.sms_enabled);
        assert!(prefs.quiet_hours_start.is_none());
    }

    #[test]
    fn test_alert_payload_days_until() {
        let now = Utc::now();
        let candidate = Candidate {
            id: Uuid::new_v4(),
            ticker: Some("ACME".to_string()),
            sponsor: Some("Acme Bio".to_string()),
            phase: Some(3),
            therapeutic_area: Some("oncology".to_string()),
            market_cap: Some(1_500_000_000),
            completion_date: Some(now.date_naive() + chrono::Duration::days(45)),
            enrollment: Some(250),
            nct_id: Some("NCT01234567".to_string()),
            current_price: Some(12.5),
            created_at: now,
            updated_at: now,
        };

        let payload = AlertPayload::new("late stage oncology", &candidate, now);
        assert_eq!(payload.days_until, Some(45));
        assert_eq!(payload.market_cap_display(), "$1.50B");
        assert_eq!(payload.price_display(), "$12.50");
        assert_eq!(payload.ticker_display(), "ACME");
    }

    #[test]
    fn test_alert_payload_missing_fields() {
        let now = Utc::now();
        let candidate = Candidate {
            id: Uuid::new_v4(),
            ticker: None,
            sponsor: None,
            phase: None,
            therapeutic_area: None,
            market_cap: None,
            completion_date: None,
            enrollment: None,
            nct_id: None,
            current_price: None,
            created_at: now,
            updated_at: now,
        };

        let payload = AlertPayload::new("anything", &candidate, now);
        assert_eq!(payload.days_until, None);
        assert_eq!(payload.market_cap_display(), "N/A");
        assert_eq!(payload.price_display(), "N/A");
        assert_eq!(payload.ticker_display(), "N/A");
    }

    #[test]
    fn test_scan_stats_absorb() {
        let mut total = ScanStats::default();
        let one = ScanStats {
            searches_checked: 1,
            matches_found: 3,
            notifications_sent: 2,
            suppressed: 1,
            deferred: 0,
            errors: 0,
            ..Default::default()
        };
        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.searches_checked, 2);
        assert_eq!(total.matches_found, 6);
        assert_eq!(total.notifications_sent, 4);
    }

    #[test]
    fn test_dispatch_result_fully_delivered() {
        let ok = DispatchResult {
            record_id: Some(Uuid::new_v4()),
            attempted: vec![Channel::Email],
            succeeded: vec![Channel::Email],
            failed: vec![],
        };
        assert!(ok.fully_delivered());

        let partial = DispatchResult {
            record_id: Some(Uuid::new_v4()),
            attempted: vec![Channel::Email, Channel::Sms],
            succeeded: vec![Channel::Email],
            failed: vec![ChannelFailure {
                channel: Channel::Sms,
                error: "provider down".to_string(),
            }],
        };
        assert!(!partial.fully_delivered());
    }
}
