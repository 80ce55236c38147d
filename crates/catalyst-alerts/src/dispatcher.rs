//! Multi-channel alert dispatcher.
//!
//! Fans one policy-approved notification out to every eligible channel,
//! retrying transient transport failures, then records the attempt in
//! history exactly once. Channel legs are independent: one provider being
//! down never blocks the others, and the record is written even when every
//! leg fails; at-least-once delivery with dedup on the history row, not
//! on transport success.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use catalyst_core::{
    defaults, AlertPayload, AlertRecipient, Channel, ChannelFailure, DispatchResult, Error,
    Result, SavedSearch,
};
use catalyst_db::PgNotificationRepository;

use crate::transport::ChannelTransport;

/// Dispatches one alert across its eligible channels.
pub struct Dispatcher {
    transports: HashMap<Channel, Arc<dyn ChannelTransport>>,
    notifications: PgNotificationRepository,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(notifications: PgNotificationRepository) -> Self {
        Self {
            transports: HashMap::new(),
            notifications,
            max_attempts: defaults::TRANSPORT_MAX_ATTEMPTS,
        }
    }

    /// Register a transport for its channel, replacing any previous one.
    pub fn with_transport(mut self, transport: Arc<dyn ChannelTransport>) -> Self {
        self.transports.insert(transport.channel(), transport);
        self
    }

    /// Override the per-leg attempt count.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Channels that actually have a transport registered.
    pub fn configured_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.transports.contains_key(c))
            .collect()
    }

    /// Send one alert through `channels` and record it.
    ///
    /// Returns `record_id: None` when a concurrent dispatch already recorded
    /// this `(search, candidate)` pair; the storage constraint resolved the
    /// race and this call's sends were the duplicates.
    pub async fn dispatch(
        &self,
        search: &SavedSearch,
        payload: &AlertPayload,
        recipient: &AlertRecipient,
        channels: &[Channel],
    ) -> Result<DispatchResult> {
        if channels.is_empty() {
            return Err(Error::InvalidInput(
                "dispatch called with no channels".into(),
            ));
        }

        let mut attempted = Vec::new();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for &channel in channels {
            let Some(transport) = self.transports.get(&channel) else {
                failed.push(ChannelFailure {
                    channel,
                    error: "no transport configured".to_string(),
                });
                continue;
            };

            attempted.push(channel);
            match send_with_retry(transport.as_ref(), recipient, payload, self.max_attempts).await
            {
                Ok(()) => succeeded.push(channel),
                Err(e) => {
                    warn!(
                        subsystem = "alerts",
                        search_id = %search.id,
                        candidate_id = %payload.candidate_id,
                        channel = channel.as_str(),
                        error = %e,
                        "Channel leg failed after retries"
                    );
                    failed.push(ChannelFailure {
                        channel,
                        error: e.to_string(),
                    });
                }
            }
        }

        let record_id = self
            .notifications
            .insert_record(search.id, payload.candidate_id, search.user_id, &attempted)
            .await?;

        if record_id.is_none() {
            warn!(
                subsystem = "alerts",
                search_id = %search.id,
                candidate_id = %payload.candidate_id,
                "Pair recorded by a concurrent dispatch, treating as duplicate"
            );
        } else {
            info!(
                subsystem = "alerts",
                search_id = %search.id,
                candidate_id = %payload.candidate_id,
                sent_count = succeeded.len(),
                ticker = payload.ticker_display(),
                "Alert dispatched"
            );
        }

        Ok(DispatchResult {
            record_id,
            attempted,
            succeeded,
            failed,
        })
    }
}

/// Attempt one channel leg up to `max_attempts` times.
///
/// No backoff: transports already carry a request timeout, and the scan
/// cadence is daily; a second immediate attempt covers the transient
/// connection resets that dominate provider failures.
pub async fn send_with_retry(
    transport: &dyn ChannelTransport,
    recipient: &AlertRecipient,
    payload: &AlertPayload,
    max_attempts: u32,
) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match transport.send(recipient, payload).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt < max_attempts {
                    warn!(
                        subsystem = "alerts",
                        channel = transport.channel().as_str(),
                        attempt,
                        error = %e,
                        "Send attempt failed, retrying"
                    );
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Transport("no attempts made".into())))
}
