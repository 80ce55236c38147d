//! Read-only access to the upstream candidate catalog.
//!
//! The catalog is populated by the scraping pipeline; this engine treats it
//! as an opaque append-only feed and never mutates it.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use catalyst_core::{defaults, Candidate, Error, Result};

/// One page of new candidates plus the watermark to persist.
#[derive(Debug, Clone)]
pub struct CandidateBatch {
    /// Candidates with `created_at` strictly after the requested watermark,
    /// ascending by `created_at`.
    pub candidates: Vec<Candidate>,
    /// The `created_at` of the last returned candidate, or the unchanged
    /// input watermark when the batch is empty. Persisting only
    /// fully-observed timestamps means a crash mid-scan never skips rows.
    pub watermark: Option<DateTime<Utc>>,
}

/// PostgreSQL candidate feed reader.
#[derive(Clone)]
pub struct PgCandidateFeed {
    pool: Pool<Postgres>,
    batch_limit: i64,
}

impl PgCandidateFeed {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            batch_limit: defaults::FEED_BATCH_LIMIT,
        }
    }

    /// Override the per-scan batch limit.
    pub fn with_batch_limit(mut self, limit: i64) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Fetch candidates created strictly after `watermark`.
    ///
    /// `None` means the search has never been scanned and the whole catalog
    /// is considered. Only candidates with a ticker are returned; those
    /// are the tradeable ones an alert can act on.
    ///
    /// The batch always includes every row sharing the last returned
    /// `created_at`, so it can exceed the limit when a bulk insert gives
    /// many rows the same timestamp. Cutting inside such a group would
    /// strand the remainder behind the strict `> watermark` filter forever.
    pub async fn fetch_since(&self, watermark: Option<DateTime<Utc>>) -> Result<CandidateBatch> {
        let rows = sqlx::query(
            "WITH page AS (
                 SELECT created_at
                 FROM candidates
                 WHERE ($1::timestamptz IS NULL OR created_at > $1)
                   AND ticker IS NOT NULL
                 ORDER BY created_at ASC, id ASC
                 LIMIT $2
             )
             SELECT id, ticker, sponsor, phase, therapeutic_area, market_cap,
                    completion_date, enrollment, nct_id, current_price,
                    created_at, updated_at
             FROM candidates
             WHERE ($1::timestamptz IS NULL OR created_at > $1)
               AND ticker IS NOT NULL
               AND created_at <= (SELECT max(created_at) FROM page)
             ORDER BY created_at ASC, id ASC",
        )
        .bind(watermark)
        .bind(self.batch_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let candidates: Vec<Candidate> = rows.iter().map(Self::parse_row).collect();
        let new_watermark = candidates.last().map(|c| c.created_at).or(watermark);

        Ok(CandidateBatch {
            candidates,
            watermark: new_watermark,
        })
    }

    /// Fetch one candidate by ID (used when re-evaluating deferred matches).
    pub async fn get(&self, id: Uuid) -> Result<Option<Candidate>> {
        let row = sqlx::query(
            "SELECT id, ticker, sponsor, phase, therapeutic_area, market_cap,
                    completion_date, enrollment, nct_id, current_price,
                    created_at, updated_at
             FROM candidates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_row))
    }

    fn parse_row(r: &sqlx::postgres::PgRow) -> Candidate {
        Candidate {
            id: r.get("id"),
            ticker: r.get("ticker"),
            sponsor: r.get("sponsor"),
            phase: r.get("phase"),
            therapeutic_area: r.get("therapeutic_area"),
            market_cap: r.get("market_cap"),
            completion_date: r.get("completion_date"),
            enrollment: r.get("enrollment"),
            nct_id: r.get("nct_id"),
            current_price: r.get("current_price"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, CandidateSeed, DEFAULT_TEST_DATABASE_URL};

    async fn setup() -> (PgCandidateFeed, Pool<Postgres>) {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string());
        let pool = crate::create_pool(&database_url)
            .await
            .expect("Failed to connect to test DB");
        (PgCandidateFeed::new(pool.clone()), pool)
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_fetch_since_strict_watermark() {
        let (feed, pool) = setup().await;
        let base = Utc::now();

        let c1 = test_fixtures::create_test_candidate(
            &pool,
            CandidateSeed::new("WMK1").created_at(base),
        )
        .await;
        let c2 = test_fixtures::create_test_candidate(
            &pool,
            CandidateSeed::new("WMK2").created_at(base + chrono::Duration::seconds(10)),
        )
        .await;

        // Strict `>` excludes the row created exactly at the watermark.
        let batch = feed.fetch_since(Some(base)).await.unwrap();
        let ids: Vec<Uuid> = batch.candidates.iter().map(|c| c.id).collect();
        assert!(!ids.contains(&c1));
        assert!(ids.contains(&c2));
        assert_eq!(batch.watermark, Some(base + chrono::Duration::seconds(10)));

        test_fixtures::delete_test_candidates(&pool, &[c1, c2]).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_batch_cut_never_splits_equal_timestamps() {
        let (feed, pool) = setup().await;
        let feed = feed.with_batch_limit(2);
        // A bulk insert in one transaction gives every row the same
        // created_at; the batch must carry the whole group past the limit
        // or the strict watermark would strand the overflow forever.
        let shared = Utc::now() + chrono::Duration::seconds(1);
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                test_fixtures::create_test_candidate(
                    &pool,
                    CandidateSeed::new(&format!("TIE{i}")).created_at(shared),
                )
                .await,
            );
        }

        let batch = feed.fetch_since(Some(shared - chrono::Duration::seconds(1))).await.unwrap();
        let got: Vec<Uuid> = batch.candidates.iter().map(|c| c.id).collect();
        for id in &ids {
            assert!(got.contains(id));
        }
        assert_eq!(batch.watermark, Some(shared));

        // Nothing left behind the persisted watermark.
        let next = feed.fetch_since(Some(shared)).await.unwrap();
        assert!(!next.candidates.iter().any(|c| ids.contains(&c.id)));

        test_fixtures::delete_test_candidates(&pool, &ids).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_empty_batch_keeps_watermark() {
        let (feed, _pool) = setup().await;
        let future = Utc::now() + chrono::Duration::days(365);

        let batch = feed.fetch_since(Some(future)).await.unwrap();
        assert!(batch.candidates.is_empty());
        assert_eq!(batch.watermark, Some(future));
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_tickerless_candidates_excluded() {
        let (feed, pool) = setup().await;
        let base = Utc::now();

        let mut seed = CandidateSeed::new("SKIP").created_at(base + chrono::Duration::seconds(1));
        seed.ticker = None;
        let id = test_fixtures::create_test_candidate(&pool, seed).await;

        let batch = feed.fetch_since(Some(base)).await.unwrap();
        assert!(!batch.candidates.iter().any(|c| c.id == id));

        test_fixtures::delete_test_candidates(&pool, &[id]).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_get_by_id() {
        let (feed, pool) = setup().await;
        let id =
            test_fixtures::create_test_candidate(&pool, CandidateSeed::new("GETX")).await;

        let candidate = feed.get(id).await.unwrap().expect("candidate should exist");
        assert_eq!(candidate.ticker.as_deref(), Some("GETX"));
        assert!(feed.get(Uuid::new_v4()).await.unwrap().is_none());

        test_fixtures::delete_test_candidates(&pool, &[id]).await;
    }
}
