//! Structured logging schema and field name constants.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, scan completions, policy suppressions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-candidate evaluation detail |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "alerts", "scanner", "dispatch"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "policy", "scanner", "email", "sms"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "scan", "dispatch", "fetch_since", "decide"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Saved search UUID being evaluated.
pub const SEARCH_ID: &str = "search_id";

/// Candidate UUID being evaluated or dispatched.
pub const CANDIDATE_ID: &str = "candidate_id";

/// Owning user UUID.
pub const USER_ID: &str = "user_id";

/// Channel name for a transport leg.
pub const CHANNEL: &str = "channel";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Candidates matched during a search scan.
pub const MATCH_COUNT: &str = "match_count";

/// Notifications sent during a scan cycle.
pub const SENT_COUNT: &str = "sent_count";

/// Matches suppressed during a scan cycle.
pub const SUPPRESSED_COUNT: &str = "suppressed_count";

/// Matches deferred during a scan cycle.
pub const DEFERRED_COUNT: &str = "deferred_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Policy suppression reason.
pub const SUPPRESS_REASON: &str = "suppress_reason";
