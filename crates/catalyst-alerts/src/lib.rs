//! # catalyst-alerts
//!
//! Notification dispatch and scan scheduling for the catalyst alerting
//! engine.
//!
//! This crate provides:
//! - Channel transports (email, SMS, chat webhook) behind a common trait
//! - The multi-channel dispatcher with per-leg retry and single-record
//!   history writes
//! - The periodic scan scheduler that evaluates saved searches against
//!   new catalog candidates
//!
//! ## Example
//!
//! ```rust,ignore
//! use catalyst_alerts::{Dispatcher, EmailTransport, ScanConfig, ScanScheduler};
//! use catalyst_db::Database;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/catalyst").await?;
//!
//!     let dispatcher = Dispatcher::new(db.notifications.clone())
//!         .with_transport(Arc::new(EmailTransport::from_env()?));
//!
//!     let scheduler = ScanScheduler::new(db, dispatcher, ScanConfig::from_env());
//!     let handle = scheduler.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod dispatcher;
pub mod scanner;
pub mod transport;

pub use dispatcher::{send_with_retry, Dispatcher};
pub use scanner::{ScanConfig, ScanEvent, ScanScheduler, ScannerHandle};
pub use transport::{
    ChannelTransport, ChatWebhookTransport, EmailTransport, MockTransport, SmsTransport,
};
