//! Centralized default constants for the alerting engine.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates should reference these constants instead of defining their
//! own magic numbers.

// =============================================================================
// POLICY
// =============================================================================

/// Default daily alert cap per user, applied when no preferences row exists.
pub const MAX_ALERTS_PER_DAY: i32 = 10;

/// How long a quiet-hours deferral may be retried before the match is
/// suppressed as stale.
pub const DEFERRAL_WINDOW_HOURS: i64 = 24;

/// Timezone applied when a user has not set one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

// =============================================================================
// DISPATCH
// =============================================================================

/// Per-call timeout applied to every channel transport request.
pub const TRANSPORT_TIMEOUT_SECS: u64 = 10;

/// Attempts per channel leg before it is marked failed for this dispatch.
pub const TRANSPORT_MAX_ATTEMPTS: u32 = 2;

// =============================================================================
// SCANNING
// =============================================================================

/// Default interval between scan cycles (daily).
pub const SCAN_INTERVAL_SECS: u64 = 86_400;

/// Saved searches evaluated concurrently within one scan cycle.
pub const SCAN_MAX_CONCURRENT: usize = 4;

/// Maximum candidates pulled from the feed per search per cycle.
pub const FEED_BATCH_LIMIT: i64 = 500;

/// Broadcast capacity for scan events.
pub const EVENT_BUS_CAPACITY: usize = 256;
