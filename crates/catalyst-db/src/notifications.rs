//! Notification history, suppression log, and deferral tracking.
//!
//! `notification_records` is the single source of truth for dedup and rate
//! limiting. The UNIQUE constraint on `(saved_search_id, candidate_id)` is
//! the correctness guarantee: concurrent scheduler runs racing to notify
//! the same pair resolve at insert time, with exactly one winner. Any
//! in-process pre-check is an optimization only.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use catalyst_core::{Channel, Error, NotificationRecord, Result, SuppressReason};

/// PostgreSQL notification history repository.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Record a notification attempt for a pair.
    ///
    /// Returns `Some(record_id)` when this call created the record, or
    /// `None` when the pair was already recorded; the caller treats that
    /// as "already notified, no-op". `channels` holds the channels that
    /// were attempted, not only those that succeeded.
    pub async fn insert_record(
        &self,
        saved_search_id: Uuid,
        candidate_id: Uuid,
        user_id: Uuid,
        channels: &[Channel],
    ) -> Result<Option<Uuid>> {
        let id = catalyst_core::new_v7();
        let channels: Vec<String> = channels.iter().map(|c| c.as_str().to_string()).collect();

        let row = sqlx::query(
            "INSERT INTO notification_records
                 (id, saved_search_id, candidate_id, user_id, channels_used, sent_at)
             VALUES ($1, $2, $3, $4, $5, now())
             ON CONFLICT (saved_search_id, candidate_id) DO NOTHING
             RETURNING id",
        )
        .bind(id)
        .bind(saved_search_id)
        .bind(candidate_id)
        .bind(user_id)
        .bind(&channels)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| r.get("id")))
    }

    /// Check whether a pair has already been notified.
    pub async fn exists(&self, saved_search_id: Uuid, candidate_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM notification_records
             WHERE saved_search_id = $1 AND candidate_id = $2",
        )
        .bind(saved_search_id)
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.is_some())
    }

    /// Count notifications sent to a user during the UTC calendar day
    /// containing `now`.
    pub async fn sent_today(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<i64> {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM notification_records
             WHERE user_id = $1 AND sent_at >= $2 AND sent_at < $3",
        )
        .bind(user_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("n"))
    }

    /// Mark a notification as acknowledged by the user.
    ///
    /// Returns false if the record does not exist or was already
    /// acknowledged; `acknowledged_at` is write-once.
    pub async fn acknowledge(&self, record_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification_records
             SET acknowledged_at = now()
             WHERE id = $1 AND acknowledged_at IS NULL",
        )
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// List a user's notification history, newest first.
    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(
            "SELECT id, saved_search_id, candidate_id, user_id, channels_used,
                    sent_at, acknowledged_at
             FROM notification_records
             WHERE user_id = $1
             ORDER BY sent_at DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let raw_channels: Vec<String> = r.get("channels_used");
                NotificationRecord {
                    id: r.get("id"),
                    saved_search_id: r.get("saved_search_id"),
                    candidate_id: r.get("candidate_id"),
                    user_id: r.get("user_id"),
                    channels_used: raw_channels.iter().filter_map(|s| s.parse().ok()).collect(),
                    sent_at: r.get("sent_at"),
                    acknowledged_at: r.get("acknowledged_at"),
                }
            })
            .collect())
    }

    // =========================================================================
    // SUPPRESSION LOG
    // =========================================================================

    /// Durably mark a pair as seen-but-suppressed.
    ///
    /// Keyed like dedup so a cap breach today does not become a burst once
    /// the cap resets; a suppressed match is never sent on a later day.
    pub async fn record_suppression(
        &self,
        saved_search_id: Uuid,
        candidate_id: Uuid,
        user_id: Uuid,
        reason: SuppressReason,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO alert_suppressions
                 (saved_search_id, candidate_id, user_id, reason, suppressed_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (saved_search_id, candidate_id) DO NOTHING",
        )
        .bind(saved_search_id)
        .bind(candidate_id)
        .bind(user_id)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Check whether a pair was previously suppressed.
    pub async fn is_suppressed(&self, saved_search_id: Uuid, candidate_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM alert_suppressions
             WHERE saved_search_id = $1 AND candidate_id = $2",
        )
        .bind(saved_search_id)
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.is_some())
    }

    // =========================================================================
    // QUIET-HOURS DEFERRALS
    // =========================================================================

    /// When this pair first entered quiet-hours deferral, if it did.
    pub async fn deferral_started_at(
        &self,
        saved_search_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT first_matched_at FROM alert_deferrals
             WHERE saved_search_id = $1 AND candidate_id = $2",
        )
        .bind(saved_search_id)
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| r.get("first_matched_at")))
    }

    /// Record that a match is being held through quiet hours.
    ///
    /// Idempotent: the first call fixes `first_matched_at`, later calls
    /// leave it untouched so the stale bound is measured from the first
    /// deferral.
    pub async fn record_deferral(
        &self,
        saved_search_id: Uuid,
        candidate_id: Uuid,
        user_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO alert_deferrals
                 (saved_search_id, candidate_id, user_id, first_matched_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (saved_search_id, candidate_id) DO NOTHING",
        )
        .bind(saved_search_id)
        .bind(candidate_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Pairs currently held in deferral for a search.
    pub async fn list_deferred_for_search(&self, saved_search_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT candidate_id FROM alert_deferrals
             WHERE saved_search_id = $1
             ORDER BY first_matched_at ASC",
        )
        .bind(saved_search_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(|r| r.get("candidate_id")).collect())
    }

    /// Drop the deferral for a pair once it was sent or suppressed.
    pub async fn clear_deferral(&self, saved_search_id: Uuid, candidate_id: Uuid) -> Result<()> {
        sqlx::query(
            "DELETE FROM alert_deferrals
             WHERE saved_search_id = $1 AND candidate_id = $2",
        )
        .bind(saved_search_id)
        .bind(candidate_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, CandidateSeed, DEFAULT_TEST_DATABASE_URL};

    async fn setup() -> (PgNotificationRepository, Pool<Postgres>) {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string());
        let pool = crate::create_pool(&database_url)
            .await
            .expect("Failed to connect to test DB");
        (PgNotificationRepository::new(pool.clone()), pool)
    }

    async fn seed_pair(pool: &Pool<Postgres>) -> (Uuid, Uuid, Uuid) {
        let user_id = test_fixtures::create_test_user(pool, "pro").await;
        let search_id = test_fixtures::create_test_search(pool, user_id).await;
        let candidate_id =
            test_fixtures::create_test_candidate(pool, CandidateSeed::new("NOTI")).await;
        (user_id, search_id, candidate_id)
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_insert_record_is_unique_per_pair() {
        let (repo, pool) = setup().await;
        let (user_id, search_id, candidate_id) = seed_pair(&pool).await;

        let first = repo
            .insert_record(search_id, candidate_id, user_id, &[Channel::Email])
            .await
            .unwrap();
        assert!(first.is_some());

        // Second insert for the same pair is a no-op, not an error.
        let second = repo
            .insert_record(search_id, candidate_id, user_id, &[Channel::Email])
            .await
            .unwrap();
        assert!(second.is_none());

        assert!(repo.exists(search_id, candidate_id).await.unwrap());

        test_fixtures::delete_test_candidates(&pool, &[candidate_id]).await;
        test_fixtures::delete_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_concurrent_inserts_have_one_winner() {
        let (repo, pool) = setup().await;
        let (user_id, search_id, candidate_id) = seed_pair(&pool).await;

        let mut winners = 0;
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let repo = repo.clone();
            tasks.spawn(async move {
                repo.insert_record(search_id, candidate_id, user_id, &[Channel::Email])
                    .await
                    .unwrap()
            });
        }
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        test_fixtures::delete_test_candidates(&pool, &[candidate_id]).await;
        test_fixtures::delete_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_sent_today_counts_current_utc_day() {
        let (repo, pool) = setup().await;
        let (user_id, search_id, candidate_id) = seed_pair(&pool).await;

        assert_eq!(repo.sent_today(user_id, Utc::now()).await.unwrap(), 0);

        repo.insert_record(search_id, candidate_id, user_id, &[Channel::Email])
            .await
            .unwrap();
        assert_eq!(repo.sent_today(user_id, Utc::now()).await.unwrap(), 1);

        // A different day window sees nothing.
        let tomorrow = Utc::now() + chrono::Duration::days(1);
        assert_eq!(repo.sent_today(user_id, tomorrow).await.unwrap(), 0);

        test_fixtures::delete_test_candidates(&pool, &[candidate_id]).await;
        test_fixtures::delete_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_acknowledge_is_write_once() {
        let (repo, pool) = setup().await;
        let (user_id, search_id, candidate_id) = seed_pair(&pool).await;

        let record_id = repo
            .insert_record(search_id, candidate_id, user_id, &[Channel::Email])
            .await
            .unwrap()
            .unwrap();

        assert!(repo.acknowledge(record_id).await.unwrap());
        assert!(!repo.acknowledge(record_id).await.unwrap());

        let records = repo.list_for_user(user_id, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].acknowledged_at.is_some());

        test_fixtures::delete_test_candidates(&pool, &[candidate_id]).await;
        test_fixtures::delete_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_suppression_log_round_trip() {
        let (repo, pool) = setup().await;
        let (user_id, search_id, candidate_id) = seed_pair(&pool).await;

        assert!(!repo.is_suppressed(search_id, candidate_id).await.unwrap());
        repo.record_suppression(
            search_id,
            candidate_id,
            user_id,
            SuppressReason::DailyCapReached,
        )
        .await
        .unwrap();
        assert!(repo.is_suppressed(search_id, candidate_id).await.unwrap());

        // Re-recording is a no-op.
        repo.record_suppression(
            search_id,
            candidate_id,
            user_id,
            SuppressReason::StaleDeferral,
        )
        .await
        .unwrap();

        test_fixtures::delete_test_candidates(&pool, &[candidate_id]).await;
        test_fixtures::delete_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_deferral_lifecycle() {
        let (repo, pool) = setup().await;
        let (user_id, search_id, candidate_id) = seed_pair(&pool).await;

        assert!(repo
            .deferral_started_at(search_id, candidate_id)
            .await
            .unwrap()
            .is_none());

        repo.record_deferral(search_id, candidate_id, user_id)
            .await
            .unwrap();
        let first = repo
            .deferral_started_at(search_id, candidate_id)
            .await
            .unwrap()
            .expect("deferral should exist");

        // A later deferral does not move the start.
        repo.record_deferral(search_id, candidate_id, user_id)
            .await
            .unwrap();
        assert_eq!(
            repo.deferral_started_at(search_id, candidate_id)
                .await
                .unwrap(),
            Some(first)
        );

        let deferred = repo.list_deferred_for_search(search_id).await.unwrap();
        assert_eq!(deferred, vec![candidate_id]);

        repo.clear_deferral(search_id, candidate_id).await.unwrap();
        assert!(repo
            .deferral_started_at(search_id, candidate_id)
            .await
            .unwrap()
            .is_none());

        test_fixtures::delete_test_candidates(&pool, &[candidate_id]).await;
        test_fixtures::delete_test_user(&pool, user_id).await;
    }
}
