/// Device token registry
use crate::db::{format_timestamp, new_id};
use crate::error::{SteepleError, SteepleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
        }
    }
}

impl FromStr for Platform {
    type Err = SteepleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            "web" => Ok(Platform::Web),
            _ => Err(SteepleError::invalid("Invalid platform")),
        }
    }
}

/// A live token and the user it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveToken {
    pub token: String,
    pub user_id: String,
}

/// Device token manager
#[derive(Clone)]
pub struct DeviceTokenManager {
    db: SqlitePool,
}

impl DeviceTokenManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register or refresh a token.
    ///
    /// The token value is unique, so registering a known token moves it to
    /// the given org and user and re-enables it.
    pub async fn upsert(
        &self,
        org_id: &str,
        user_id: &str,
        token: &str,
        platform: Platform,
        last_seen_at: DateTime<Utc>,
    ) -> SteepleResult<()> {
        let now = format_timestamp(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO device_tokens (id, org_id, user_id, token, platform, last_seen_at, disabled_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)
            ON CONFLICT (token) DO UPDATE SET
                org_id = excluded.org_id,
                user_id = excluded.user_id,
                platform = excluded.platform,
                last_seen_at = excluded.last_seen_at,
                disabled_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(new_id())
        .bind(org_id)
        .bind(user_id)
        .bind(token)
        .bind(platform.as_str())
        .bind(format_timestamp(last_seen_at))
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Non-disabled tokens registered in `org_id` by any of `user_ids`
    pub async fn active_tokens_for(
        &self,
        org_id: &str,
        user_ids: &[String],
    ) -> SteepleResult<Vec<ActiveToken>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT token, user_id FROM device_tokens WHERE disabled_at IS NULL AND org_id = ",
        );
        query.push_bind(org_id);
        query.push(" AND user_id IN (");
        let mut separated = query.separated(", ");
        for user_id in user_ids {
            separated.push_bind(user_id);
        }
        separated.push_unseparated(") ORDER BY created_at");

        let rows = query.build().fetch_all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|row| ActiveToken {
                token: row.get("token"),
                user_id: row.get("user_id"),
            })
            .collect())
    }

    /// Soft-disable tokens in one statement, returning the rows touched
    pub async fn disable_tokens(&self, tokens: &[String]) -> SteepleResult<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }

        let now = format_timestamp(Utc::now());
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE device_tokens SET disabled_at = ");
        query.push_bind(now.clone());
        query.push(", updated_at = ");
        query.push_bind(now);
        query.push(" WHERE token IN (");
        let mut separated = query.separated(", ");
        for token in tokens {
            separated.push_bind(token);
        }
        separated.push_unseparated(")");

        let result = query.build().execute(&self.db).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn users(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("web".parse::<Platform>().unwrap(), Platform::Web);
        let err = "windows".parse::<Platform>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid platform");
    }

    #[tokio::test]
    async fn test_reregistration_moves_and_reenables_token() {
        let manager = DeviceTokenManager::new(create_memory_pool().await.unwrap());

        manager
            .upsert("org-1", "alice", "tok-1", Platform::Ios, Utc::now())
            .await
            .unwrap();
        manager.disable_tokens(&users(&["tok-1"])).await.unwrap();
        assert!(manager
            .active_tokens_for("org-1", &users(&["alice"]))
            .await
            .unwrap()
            .is_empty());

        manager
            .upsert("org-1", "bob", "tok-1", Platform::Android, Utc::now())
            .await
            .unwrap();

        let tokens = manager
            .active_tokens_for("org-1", &users(&["alice", "bob"]))
            .await
            .unwrap();
        assert_eq!(
            tokens,
            vec![ActiveToken {
                token: "tok-1".to_string(),
                user_id: "bob".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_tokens_are_scoped_to_org() {
        let manager = DeviceTokenManager::new(create_memory_pool().await.unwrap());
        manager
            .upsert("org-2", "alice", "tok-1", Platform::Web, Utc::now())
            .await
            .unwrap();

        assert!(manager
            .active_tokens_for("org-1", &users(&["alice"]))
            .await
            .unwrap()
            .is_empty());
        assert!(manager.active_tokens_for("org-2", &[]).await.unwrap().is_empty());
    }
}
