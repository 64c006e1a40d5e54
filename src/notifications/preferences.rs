/// Per-member notification preferences
use crate::db::format_timestamp;
use crate::error::SteepleResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashSet;

/// Notification categories a member can opt out of. Absent rows mean all on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub events: bool,
    pub announcements: bool,
    pub devotionals: bool,
    pub prayer_replies: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            events: true,
            announcements: true,
            devotionals: true,
            prayer_replies: true,
        }
    }
}

/// Partial update; `None` keeps the stored value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PreferencesPatch {
    pub events: Option<bool>,
    pub announcements: Option<bool>,
    pub devotionals: Option<bool>,
    pub prayer_replies: Option<bool>,
}

impl NotificationPreferences {
    pub fn merge(self, patch: PreferencesPatch) -> Self {
        Self {
            events: patch.events.unwrap_or(self.events),
            announcements: patch.announcements.unwrap_or(self.announcements),
            devotionals: patch.devotionals.unwrap_or(self.devotionals),
            prayer_replies: patch.prayer_replies.unwrap_or(self.prayer_replies),
        }
    }
}

/// Preferences as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberPreferences {
    pub org_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub preferences: NotificationPreferences,
}

#[derive(Clone)]
pub struct PreferencesManager {
    db: SqlitePool,
}

impl PreferencesManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Stored preferences, if the member ever saved any
    pub async fn get(
        &self,
        org_id: &str,
        user_id: &str,
    ) -> SteepleResult<Option<NotificationPreferences>> {
        let row = sqlx::query(
            r#"
            SELECT events, announcements, devotionals, prayer_replies
            FROM notification_preferences
            WHERE org_id = ? AND user_id = ?
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|row| NotificationPreferences {
            events: row.get("events"),
            announcements: row.get("announcements"),
            devotionals: row.get("devotionals"),
            prayer_replies: row.get("prayer_replies"),
        }))
    }

    /// Stored preferences or the defaults
    pub async fn effective(&self, org_id: &str, user_id: &str) -> SteepleResult<MemberPreferences> {
        Ok(MemberPreferences {
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
            preferences: self.get(org_id, user_id).await?.unwrap_or_default(),
        })
    }

    /// Merge `patch` over the stored values (or defaults) and save
    pub async fn upsert(
        &self,
        org_id: &str,
        user_id: &str,
        patch: PreferencesPatch,
    ) -> SteepleResult<MemberPreferences> {
        let next = self
            .get(org_id, user_id)
            .await?
            .unwrap_or_default()
            .merge(patch);

        sqlx::query(
            r#"
            INSERT INTO notification_preferences (org_id, user_id, events, announcements, devotionals, prayer_replies, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (org_id, user_id) DO UPDATE SET
                events = excluded.events,
                announcements = excluded.announcements,
                devotionals = excluded.devotionals,
                prayer_replies = excluded.prayer_replies,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .bind(next.events)
        .bind(next.announcements)
        .bind(next.devotionals)
        .bind(next.prayer_replies)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(MemberPreferences {
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
            preferences: next,
        })
    }

    /// Users among `user_ids` who explicitly turned event notifications off
    pub async fn event_opt_outs(
        &self,
        org_id: &str,
        user_ids: &[String],
    ) -> SteepleResult<HashSet<String>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT user_id FROM notification_preferences WHERE events = 0 AND org_id = ",
        );
        query.push_bind(org_id);
        query.push(" AND user_id IN (");
        let mut separated = query.separated(", ");
        for user_id in user_ids {
            separated.push_bind(user_id);
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    #[test]
    fn test_merge_prefers_patch_then_current() {
        let current = NotificationPreferences {
            announcements: false,
            ..Default::default()
        };
        let merged = current.merge(PreferencesPatch {
            events: Some(false),
            ..Default::default()
        });

        assert!(!merged.events);
        assert!(!merged.announcements);
        assert!(merged.devotionals);
        assert!(merged.prayer_replies);
    }

    #[tokio::test]
    async fn test_upsert_merges_with_stored_values() {
        let manager = PreferencesManager::new(create_memory_pool().await.unwrap());

        let first = manager
            .upsert(
                "org-1",
                "alice",
                PreferencesPatch {
                    devotionals: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(first.preferences.events);
        assert!(!first.preferences.devotionals);

        let second = manager
            .upsert(
                "org-1",
                "alice",
                PreferencesPatch {
                    events: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!second.preferences.events);
        assert!(!second.preferences.devotionals);

        let value = serde_json::to_value(&second).unwrap();
        assert_eq!(value["org_id"], "org-1");
        assert_eq!(value["events"], false);
    }

    #[tokio::test]
    async fn test_event_opt_outs_only_lists_explicit_false() {
        let manager = PreferencesManager::new(create_memory_pool().await.unwrap());
        manager
            .upsert(
                "org-1",
                "alice",
                PreferencesPatch {
                    events: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        manager
            .upsert("org-1", "bob", PreferencesPatch::default())
            .await
            .unwrap();

        let users = vec!["alice".to_string(), "bob".to_string(), "carol".to_string()];
        let opt_outs = manager.event_opt_outs("org-1", &users).await.unwrap();
        assert_eq!(opt_outs, HashSet::from(["alice".to_string()]));

        let effective = manager.effective("org-1", "carol").await.unwrap();
        assert_eq!(effective.preferences, NotificationPreferences::default());
    }
}
