//! Notification policy engine.
//!
//! Decides, for a matched `(saved search, candidate)` pair, whether a
//! notification may be sent right now. The decision is a pure function of
//! the search, the user's notification history, and their preferences -
//! all I/O happens in the caller, which assembles a [`PolicyContext`] and
//! applies the side effects of the returned [`PolicyDecision`].
//!
//! Checks run in a fixed order, first failure wins:
//!
//! 1. Dedup: a pair that was ever notified or suppressed is terminal.
//! 2. Channel eligibility: configured channels intersected with what the
//!    user's current tier permits and what their settings enable.
//! 3. Daily cap: UTC-calendar-day count against `max_alerts_per_day`.
//! 4. Stale deferral: a pair held longer than the deferral window is
//!    suppressed, whether or not the quiet window is still open.
//! 5. Quiet hours: deferred (not suppressed) inside the local-time window.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::defaults;
use crate::models::{Channel, NotificationPreferences, SavedSearch, SuppressReason, Tier};

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    /// Dispatch now through these channels (non-empty).
    Send(Vec<Channel>),
    /// Never send this pair.
    Suppress(SuppressReason),
    /// Hold the match and re-evaluate after `retry_after`.
    Defer { retry_after: Duration },
}

/// Everything the policy engine needs to know, gathered by the caller.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    /// A notification record already exists for this pair.
    pub already_notified: bool,
    /// A suppression log entry already exists for this pair.
    pub already_suppressed: bool,
    /// The owning user's current tier (not the tier at search creation).
    pub tier: Tier,
    /// The owning user's notification preferences.
    pub preferences: NotificationPreferences,
    /// Notifications sent to this user during the current UTC calendar day.
    pub sent_today: i64,
    /// When this pair first entered quiet-hours deferral, if it did.
    pub first_deferred_at: Option<DateTime<Utc>>,
    /// Evaluation instant.
    pub now: DateTime<Utc>,
}

/// Decide send / suppress / defer for a matched pair.
pub fn decide(search: &SavedSearch, ctx: &PolicyContext) -> PolicyDecision {
    if ctx.already_notified {
        return PolicyDecision::Suppress(SuppressReason::AlreadyNotified);
    }
    if ctx.already_suppressed {
        return PolicyDecision::Suppress(SuppressReason::PreviouslySuppressed);
    }

    let channels = eligible_channels(search, ctx.tier, &ctx.preferences);
    if channels.is_empty() {
        return PolicyDecision::Suppress(SuppressReason::NoEligibleChannels);
    }

    if ctx.sent_today >= i64::from(ctx.preferences.max_alerts_per_day) {
        return PolicyDecision::Suppress(SuppressReason::DailyCapReached);
    }

    // The stale bound applies whenever a deferral exists, not only while
    // the quiet window is still open: a match held longer than the window
    // is no longer timely even if the re-check lands in daytime.
    if let Some(first) = ctx.first_deferred_at {
        let window = Duration::hours(defaults::DEFERRAL_WINDOW_HOURS);
        if ctx.now - first >= window {
            return PolicyDecision::Suppress(SuppressReason::StaleDeferral);
        }
    }

    if let (Some(start), Some(end)) = (
        ctx.preferences.quiet_hours_start,
        ctx.preferences.quiet_hours_end,
    ) {
        let tz = resolve_timezone(&ctx.preferences.timezone);
        let local = ctx.now.with_timezone(&tz).time();

        if in_quiet_window(local, start, end) {
            return PolicyDecision::Defer {
                retry_after: time_until(local, end),
            };
        }
    }

    PolicyDecision::Send(channels)
}

/// Channels the notification may actually use: the search's configured set,
/// restricted to what the user's current tier permits and what their
/// per-channel settings enable. A downgrade leaves extra configured
/// channels silently inert rather than erroring.
pub fn eligible_channels(
    search: &SavedSearch,
    tier: Tier,
    preferences: &NotificationPreferences,
) -> Vec<Channel> {
    search
        .channels
        .iter()
        .copied()
        .filter(|c| tier.permits(*c) && preferences.channel_enabled(*c))
        .collect()
}

/// Whether `t` falls inside `[start, end)`, handling overnight windows
/// where `start > end`. A degenerate window with `start == end` is empty.
pub fn in_quiet_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    use std::cmp::Ordering;
    match start.cmp(&end) {
        Ordering::Less => start <= t && t < end,
        Ordering::Greater => t >= start || t < end,
        Ordering::Equal => false,
    }
}

/// Duration from `t` forward to the next occurrence of `end` on the clock.
fn time_until(t: NaiveTime, end: NaiveTime) -> Duration {
    let delta = end.signed_duration_since(t);
    if delta > Duration::zero() {
        delta
    } else {
        delta + Duration::hours(24)
    }
}

/// Parse an IANA timezone name, falling back to UTC for corrupt data.
fn resolve_timezone(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone = name, "Unknown timezone in preferences, using UTC");
        Tz::UTC
    })
}
