//! Saved search repository.
//!
//! Saved searches are created by the search-builder UI, mutated by the
//! scheduler only to advance the `last_scanned_at` watermark, and
//! soft-disabled by user action. They are never hard-deleted while
//! notification history references them; account deletion cascades.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::warn;
use uuid::Uuid;

use catalyst_core::{
    Channel, CreateSavedSearchRequest, Error, FilterPredicate, Result, SavedSearch, Tier,
};

/// PostgreSQL saved search repository.
#[derive(Clone)]
pub struct PgSavedSearchRepository {
    pool: Pool<Postgres>,
}

impl PgSavedSearchRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a new saved search in the active state.
    ///
    /// The request is validated here so corrupt predicates never reach the
    /// scheduler: at least one filter constraint, consistent cap bounds,
    /// non-empty channel set. The channel set is also checked against the
    /// owner's current tier; paid channels on a free account are rejected
    /// up front rather than left silently inert. Dispatch re-checks the
    /// tier anyway, so a later downgrade still gates sends.
    pub async fn create(&self, req: CreateSavedSearchRequest) -> Result<Uuid> {
        req.validate()?;

        let tier = self.owner_tier(req.user_id).await?;
        if let Some(channel) = req.channels.iter().find(|c| !tier.permits(**c)) {
            return Err(Error::InvalidInput(format!(
                "channel {channel} is not available on the {} tier",
                tier.as_str()
            )));
        }

        let id = catalyst_core::new_v7();
        let now = Utc::now();
        let filter = serde_json::to_value(&req.filter)?;
        let channels: Vec<String> = req.channels.iter().map(|c| c.as_str().to_string()).collect();

        sqlx::query(
            "INSERT INTO saved_searches
                 (id, user_id, name, filter, channels, active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, true, $6, $6)",
        )
        .bind(id)
        .bind(req.user_id)
        .bind(&req.name)
        .bind(&filter)
        .bind(&channels)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    /// Get a saved search by ID.
    pub async fn get(&self, id: Uuid) -> Result<Option<SavedSearch>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, filter, channels, active, last_scanned_at,
                    created_at, updated_at
             FROM saved_searches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    /// List all active saved searches, oldest first.
    ///
    /// Searches with corrupt stored filters are skipped with a warning
    /// rather than failing the whole listing; the scan must not abort
    /// because one row is damaged.
    pub async fn list_active(&self) -> Result<Vec<SavedSearch>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, filter, channels, active, last_scanned_at,
                    created_at, updated_at
             FROM saved_searches
             WHERE active = true
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut searches = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::parse_row(row) {
                Ok(search) => searches.push(search),
                Err(e) => {
                    let id: Uuid = row.get("id");
                    warn!(
                        subsystem = "db",
                        component = "saved_searches",
                        search_id = %id,
                        error = %e,
                        "Skipping saved search with corrupt stored filter"
                    );
                }
            }
        }
        Ok(searches)
    }

    /// List saved searches for one user, newest first, including inactive.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<SavedSearch>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, filter, channels, active, last_scanned_at,
                    created_at, updated_at
             FROM saved_searches
             WHERE user_id = $1
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    /// Soft-enable or soft-disable a search.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE saved_searches SET active = $1, updated_at = now() WHERE id = $2",
        )
        .bind(active)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::SearchNotFound(id));
        }
        Ok(())
    }

    /// Advance the scan watermark.
    ///
    /// Only moves forward: a stale scheduler run cannot rewind a watermark
    /// that a newer run already advanced.
    pub async fn advance_watermark(&self, id: Uuid, watermark: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE saved_searches
             SET last_scanned_at = $1, updated_at = now()
             WHERE id = $2
               AND (last_scanned_at IS NULL OR last_scanned_at < $1)",
        )
        .bind(watermark)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Delete all of a user's searches and, via FK cascade, their
    /// notification history. Used only for explicit account deletion.
    pub async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM saved_searches WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    /// Current tier of the search's owner, degrading to free when the
    /// user row is missing or carries an unknown tier.
    async fn owner_tier(&self, user_id: Uuid) -> Result<Tier> {
        let row = sqlx::query("SELECT tier FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row
            .and_then(|r| r.get::<String, _>("tier").parse().ok())
            .unwrap_or(Tier::Free))
    }

    fn parse_row(r: &sqlx::postgres::PgRow) -> Result<SavedSearch> {
        let filter: FilterPredicate = serde_json::from_value(r.get("filter"))?;
        let raw_channels: Vec<String> = r.get("channels");
        let channels: Vec<Channel> = raw_channels
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();

        Ok(SavedSearch {
            id: r.get("id"),
            user_id: r.get("user_id"),
            name: r.get("name"),
            filter,
            channels,
            active: r.get("active"),
            last_scanned_at: r.get("last_scanned_at"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        })
    }
}
