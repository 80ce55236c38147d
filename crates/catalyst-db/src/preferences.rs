//! User notification preferences and account lookups.
//!
//! Preferences are upserted by the settings UI and read-only to this
//! engine; tier assignment is owned by billing. Both are read fresh at
//! decision time so a downgrade or settings change applies to the next
//! scan without restarts.

use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use catalyst_core::{Error, NotificationPreferences, Result, Tier};

/// PostgreSQL preferences repository.
#[derive(Clone)]
pub struct PgPreferencesRepository {
    pool: Pool<Postgres>,
}

impl PgPreferencesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get a user's notification preferences, falling back to defaults
    /// when no row exists (cap 10, no quiet hours, UTC, email only).
    pub async fn get(&self, user_id: Uuid) -> Result<NotificationPreferences> {
        let row = sqlx::query(
            "SELECT user_id, max_alerts_per_day, quiet_hours_start, quiet_hours_end,
                    timezone, email_enabled, sms_enabled, chat_webhook_enabled,
                    phone_number, webhook_url
             FROM notification_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(match row {
            Some(r) => NotificationPreferences {
                user_id: r.get("user_id"),
                max_alerts_per_day: r.get("max_alerts_per_day"),
                quiet_hours_start: r.get("quiet_hours_start"),
                quiet_hours_end: r.get("quiet_hours_end"),
                timezone: r.get("timezone"),
                email_enabled: r.get("email_enabled"),
                sms_enabled: r.get("sms_enabled"),
                chat_webhook_enabled: r.get("chat_webhook_enabled"),
                phone_number: r.get("phone_number"),
                webhook_url: r.get("webhook_url"),
            },
            None => NotificationPreferences::defaults_for(user_id),
        })
    }

    /// Get a user's current subscription tier.
    ///
    /// Unknown or missing tiers degrade to free; the engine must never
    /// grant paid channels by accident.
    pub async fn user_tier(&self, user_id: Uuid) -> Result<Tier> {
        let row = sqlx::query("SELECT tier FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row
            .and_then(|r| r.get::<String, _>("tier").parse().ok())
            .unwrap_or(Tier::Free))
    }

    /// Get a user's email address for the email transport.
    pub async fn user_email(&self, user_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|r| r.get("email")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, DEFAULT_TEST_DATABASE_URL};
    use chrono::NaiveTime;

    async fn setup() -> (PgPreferencesRepository, Pool<Postgres>) {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string());
        let pool = crate::create_pool(&database_url)
            .await
            .expect("Failed to connect to test DB");
        (PgPreferencesRepository::new(pool.clone()), pool)
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_missing_row_returns_defaults() {
        let (repo, pool) = setup().await;
        let user_id = test_fixtures::create_test_user(&pool, "free").await;

        let prefs = repo.get(user_id).await.unwrap();
        assert_eq!(prefs.max_alerts_per_day, 10);
        assert_eq!(prefs.timezone, "UTC");
        assert!(prefs.email_enabled);
        assert!(!prefs.sms_enabled);

        test_fixtures::delete_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_stored_preferences_read_back() {
        let (repo, pool) = setup().await;
        let user_id = test_fixtures::create_test_user(&pool, "pro").await;

        test_fixtures::set_preferences(
            &pool,
            user_id,
            2,
            Some(NaiveTime::from_hms_opt(22, 0, 0).unwrap()),
            Some(NaiveTime::from_hms_opt(6, 0, 0).unwrap()),
            "America/New_York",
        )
        .await;

        let prefs = repo.get(user_id).await.unwrap();
        assert_eq!(prefs.max_alerts_per_day, 2);
        assert_eq!(prefs.timezone, "America/New_York");
        assert_eq!(
            prefs.quiet_hours_start,
            Some(NaiveTime::from_hms_opt(22, 0, 0).unwrap())
        );

        test_fixtures::delete_test_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrated database
    async fn test_tier_lookup() {
        let (repo, pool) = setup().await;
        let user_id = test_fixtures::create_test_user(&pool, "pro").await;

        assert_eq!(repo.user_tier(user_id).await.unwrap(), Tier::Pro);
        // Unknown users degrade to free.
        assert_eq!(repo.user_tier(Uuid::new_v4()).await.unwrap(), Tier::Free);

        test_fixtures::delete_test_user(&pool, user_id).await;
    }
}
