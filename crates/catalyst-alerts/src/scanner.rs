//! Periodic scan scheduler.
//!
//! Walks every active saved search on a fixed cadence, evaluates new
//! candidates against each filter, runs the notification policy, and
//! applies the decision's side effects. Searches are independent units of
//! work: one failing search is logged and skipped, never aborting the
//! cycle. Watermarks advance only after a search's batch is fully
//! processed, so a crash mid-scan re-delivers rather than skips; the
//! dedup constraint absorbs the replay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use catalyst_core::{
    defaults, policy, AlertPayload, AlertRecipient, Candidate, Error, PolicyContext,
    PolicyDecision, Result, SavedSearch, ScanStats, SuppressReason,
};
use catalyst_db::Database;

use crate::dispatcher::Dispatcher;

/// Configuration for the scan scheduler.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Seconds between scan cycles.
    pub interval_secs: u64,
    /// Maximum number of searches scanned concurrently.
    pub max_concurrent_searches: usize,
    /// Whether the scheduler runs at all.
    pub enabled: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::SCAN_INTERVAL_SECS,
            max_concurrent_searches: defaults::SCAN_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl ScanConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SCAN_ENABLED` | `true` | Enable/disable the scheduler |
    /// | `SCAN_INTERVAL_SECS` | `86400` | Seconds between cycles |
    /// | `SCAN_MAX_CONCURRENT` | `4` | Searches scanned concurrently |
    pub fn from_env() -> Self {
        let enabled = std::env::var("SCAN_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let interval_secs = std::env::var("SCAN_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::SCAN_INTERVAL_SECS);

        let max_concurrent_searches = std::env::var("SCAN_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::SCAN_MAX_CONCURRENT)
            .max(1);

        Self {
            interval_secs,
            max_concurrent_searches,
            enabled,
        }
    }

    /// Set the cycle interval.
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Set maximum concurrent searches.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_searches = max.max(1);
        self
    }

    /// Enable or disable the scheduler.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the scan scheduler.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A scan cycle started.
    ScanStarted,
    /// One search finished scanning.
    SearchScanned {
        search_id: Uuid,
        matches: u64,
        sent: u64,
    },
    /// A scan cycle completed.
    ScanCompleted { stats: ScanStats },
    /// A cycle was skipped because the previous one is still running.
    ScanSkipped,
    /// Scheduler started.
    SchedulerStarted,
    /// Scheduler stopped.
    SchedulerStopped,
}

/// Handle for controlling a running scheduler.
pub struct ScannerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<ScanEvent>,
}

impl ScannerHandle {
    /// Signal the scheduler to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<ScanEvent> {
        self.event_rx.resubscribe()
    }
}

/// Periodic scanner over all active saved searches.
pub struct ScanScheduler {
    db: Database,
    dispatcher: Arc<Dispatcher>,
    config: ScanConfig,
    event_tx: broadcast::Sender<ScanEvent>,
    in_progress: Arc<AtomicBool>,
}

impl ScanScheduler {
    pub fn new(db: Database, dispatcher: Dispatcher, config: ScanConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            db,
            dispatcher: Arc::new(dispatcher),
            config,
            event_tx,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the scheduler and return a handle for control.
    pub fn start(self) -> ScannerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let scheduler = Arc::new(self);
        let scheduler_clone = scheduler.clone();

        tokio::spawn(async move {
            scheduler_clone.run(&mut shutdown_rx).await;
        });

        ScannerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(subsystem = "alerts", "Scan scheduler is disabled, not starting");
            return;
        }

        info!(
            subsystem = "alerts",
            interval_secs = self.config.interval_secs,
            max_concurrent = self.config.max_concurrent_searches,
            "Scan scheduler started"
        );
        let _ = self.event_tx.send(ScanEvent::SchedulerStarted);

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "alerts", "Scan scheduler received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(subsystem = "alerts", error = %e, "Scan cycle failed");
                    }
                }
            }
        }

        let _ = self.event_tx.send(ScanEvent::SchedulerStopped);
    }

    /// Run one full scan cycle over all active searches.
    ///
    /// Re-entrancy guard: if a previous cycle is still running the new tick
    /// is skipped rather than stacked; overlapping cycles would race on
    /// watermarks.
    pub async fn run_once(&self) -> Result<ScanStats> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            warn!(subsystem = "alerts", "Previous scan still running, skipping cycle");
            let _ = self.event_tx.send(ScanEvent::ScanSkipped);
            return Ok(ScanStats::default());
        }
        let result = self.scan_all().await;
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn scan_all(&self) -> Result<ScanStats> {
        let started = Instant::now();
        let mut stats = ScanStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        let _ = self.event_tx.send(ScanEvent::ScanStarted);

        let searches = self.db.saved_searches.list_active().await?;
        debug!(
            subsystem = "alerts",
            count = searches.len(),
            "Scanning active searches"
        );

        let mut tasks: JoinSet<(Uuid, ScanStats)> = JoinSet::new();
        for search in searches {
            while tasks.len() >= self.config.max_concurrent_searches {
                if let Some(joined) = tasks.join_next().await {
                    self.absorb_search_result(&mut stats, joined);
                }
            }

            let db = self.db.clone();
            let dispatcher = self.dispatcher.clone();
            tasks.spawn(async move {
                let id = search.id;
                let search_stats = process_search(&db, &dispatcher, search).await;
                (id, search_stats)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            self.absorb_search_result(&mut stats, joined);
        }

        stats.completed_at = Some(Utc::now());
        info!(
            subsystem = "alerts",
            op = "scan_cycle",
            duration_ms = started.elapsed().as_millis() as u64,
            searches_checked = stats.searches_checked,
            match_count = stats.matches_found,
            sent_count = stats.notifications_sent,
            suppressed_count = stats.suppressed,
            deferred_count = stats.deferred,
            errors = stats.errors,
            "Scan cycle completed"
        );
        let _ = self.event_tx.send(ScanEvent::ScanCompleted {
            stats: stats.clone(),
        });
        Ok(stats)
    }

    fn absorb_search_result(
        &self,
        stats: &mut ScanStats,
        joined: std::result::Result<(Uuid, ScanStats), tokio::task::JoinError>,
    ) {
        match joined {
            Ok((search_id, search_stats)) => {
                let _ = self.event_tx.send(ScanEvent::SearchScanned {
                    search_id,
                    matches: search_stats.matches_found,
                    sent: search_stats.notifications_sent,
                });
                stats.absorb(&search_stats);
            }
            Err(e) => {
                error!(subsystem = "alerts", error = %e, "Search scan task panicked");
                stats.errors += 1;
            }
        }
    }
}

/// Scan one search: re-check held deferrals, then the new-candidate batch.
///
/// Deferred pairs are stored separately because the watermark has already
/// moved past them; without the re-check a quiet-hours hold would silently
/// become a drop.
async fn process_search(db: &Database, dispatcher: &Dispatcher, search: SavedSearch) -> ScanStats {
    let mut stats = ScanStats {
        searches_checked: 1,
        ..Default::default()
    };

    if let Err(e) = revisit_deferred(db, dispatcher, &search, &mut stats).await {
        error!(
            subsystem = "alerts",
            search_id = %search.id,
            error = %e,
            "Deferred re-check failed"
        );
        stats.errors += 1;
        return stats;
    }

    let batch = match db.candidates.fetch_since(search.last_scanned_at).await {
        Ok(batch) => batch,
        Err(e) => {
            error!(
                subsystem = "alerts",
                search_id = %search.id,
                error = %e,
                "Candidate fetch failed"
            );
            stats.errors += 1;
            return stats;
        }
    };

    let now = Utc::now();
    for candidate in &batch.candidates {
        if !catalyst_core::evaluate::matches(&search.filter, candidate, now) {
            continue;
        }
        stats.matches_found += 1;
        if let Err(e) = evaluate_pair(db, dispatcher, &search, candidate, &mut stats).await {
            error!(
                subsystem = "alerts",
                search_id = %search.id,
                candidate_id = %candidate.id,
                error = %e,
                "Pair evaluation failed"
            );
            stats.errors += 1;
        }
    }

    // Watermark advances only after the whole batch was processed; the
    // forward-only guard in storage makes concurrent runs safe.
    if let Some(watermark) = batch.watermark {
        if Some(watermark) != search.last_scanned_at {
            if let Err(e) = db.saved_searches.advance_watermark(search.id, watermark).await {
                error!(
                    subsystem = "alerts",
                    search_id = %search.id,
                    error = %e,
                    "Watermark advance failed"
                );
                stats.errors += 1;
            }
        }
    }

    stats
}

/// Re-run policy for pairs held in quiet-hours deferral.
///
/// Filter matching is not repeated: the pair matched when it was deferred,
/// and the hold exists precisely to deliver that match later.
async fn revisit_deferred(
    db: &Database,
    dispatcher: &Dispatcher,
    search: &SavedSearch,
    stats: &mut ScanStats,
) -> Result<()> {
    let deferred = db.notifications.list_deferred_for_search(search.id).await?;
    for candidate_id in deferred {
        match db.candidates.get(candidate_id).await? {
            Some(candidate) => {
                evaluate_pair(db, dispatcher, search, &candidate, stats).await?;
            }
            None => {
                // Candidate vanished from the catalog; nothing left to send.
                db.notifications.clear_deferral(search.id, candidate_id).await?;
            }
        }
    }
    Ok(())
}

/// Run the policy for one matched pair and apply the decision.
async fn evaluate_pair(
    db: &Database,
    dispatcher: &Dispatcher,
    search: &SavedSearch,
    candidate: &Candidate,
    stats: &mut ScanStats,
) -> Result<()> {
    let now = Utc::now();
    let ctx = PolicyContext {
        already_notified: db.notifications.exists(search.id, candidate.id).await?,
        already_suppressed: db.notifications.is_suppressed(search.id, candidate.id).await?,
        tier: db.preferences.user_tier(search.user_id).await?,
        preferences: db.preferences.get(search.user_id).await?,
        sent_today: db.notifications.sent_today(search.user_id, now).await?,
        first_deferred_at: db
            .notifications
            .deferral_started_at(search.id, candidate.id)
            .await?,
        now,
    };

    match policy::decide(search, &ctx) {
        PolicyDecision::Send(channels) => {
            let recipient = AlertRecipient {
                email: db.preferences.user_email(search.user_id).await?,
                phone_number: ctx.preferences.phone_number.clone(),
                webhook_url: ctx.preferences.webhook_url.clone(),
            };
            let payload = AlertPayload::new(&search.name, candidate, now);
            let result = dispatcher
                .dispatch(search, &payload, &recipient, &channels)
                .await?;
            db.notifications.clear_deferral(search.id, candidate.id).await?;
            if result.record_id.is_some() {
                stats.notifications_sent += 1;
            }
        }
        PolicyDecision::Suppress(reason) => {
            // Suppressions are operator-visible: a tier mismatch or a cap
            // breach is the signal users follow up on.
            info!(
                subsystem = "alerts",
                search_id = %search.id,
                candidate_id = %candidate.id,
                user_id = %search.user_id,
                suppress_reason = reason.as_str(),
                "Match suppressed"
            );
            // Only decisions that must survive the watermark moving past
            // this pair get a durable log entry; dedup-shaped reasons are
            // already recorded elsewhere.
            if matches!(
                reason,
                SuppressReason::DailyCapReached | SuppressReason::StaleDeferral
            ) {
                db.notifications
                    .record_suppression(search.id, candidate.id, search.user_id, reason)
                    .await?;
            }
            db.notifications.clear_deferral(search.id, candidate.id).await?;
            stats.suppressed += 1;
        }
        PolicyDecision::Defer { retry_after } => {
            debug!(
                subsystem = "alerts",
                search_id = %search.id,
                candidate_id = %candidate.id,
                retry_after_mins = retry_after.num_minutes(),
                "Match deferred through quiet hours"
            );
            db.notifications
                .record_deferral(search.id, candidate.id, search.user_id)
                .await?;
            stats.deferred += 1;
        }
    }
    Ok(())
}
