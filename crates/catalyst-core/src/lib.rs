//! # catalyst-core
//!
//! Core types and decision logic for the catalyst alerting engine.
//!
//! This crate provides the domain model (saved searches, candidates,
//! notification history, preferences), the filter predicate and its
//! evaluator, and the pure notification policy engine that other crates
//! depend on. It performs no I/O.

pub mod defaults;
pub mod error;
pub mod evaluate;
pub mod filter;
pub mod logging;
pub mod models;
pub mod policy;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use evaluate::matches;
pub use filter::{FilterPredicate, ALERTABLE_PHASES};
pub use models::{
    AlertPayload, AlertRecipient, Candidate, Channel, ChannelFailure, CreateSavedSearchRequest,
    DispatchResult, NotificationPreferences, NotificationRecord, SavedSearch, ScanStats,
    SuppressReason, Tier,
};
pub use policy::{decide, eligible_channels, in_quiet_window, PolicyContext, PolicyDecision};

/// Generate a time-ordered UUIDv7 for new rows.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
