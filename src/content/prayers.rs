/// Prayer requests and reactions
use crate::db::{format_timestamp, new_id, parse_timestamp};
use crate::error::SteepleResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Newest prayers returned by a listing
const LIST_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prayer {
    pub id: String,
    pub org_id: String,
    /// Absent for anonymous prayers
    pub author_id: Option<String>,
    pub body: String,
    pub is_anonymous: bool,
    pub hidden_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrayerReaction {
    pub emoji: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrayerDetail {
    #[serde(flatten)]
    pub prayer: Prayer,
    pub reactions: Vec<PrayerReaction>,
}

#[derive(Debug, Clone)]
pub struct NewPrayer {
    pub body: String,
    pub is_anonymous: bool,
}

#[derive(Clone)]
pub struct PrayerStore {
    db: SqlitePool,
}

const PRAYER_COLUMNS: &str = r#"
    p.id, p.org_id, p.author_id, p.body, p.is_anonymous, p.hidden_at, p.created_at,
    (SELECT COUNT(*) FROM prayer_reactions r WHERE r.prayer_id = p.id) AS reaction_count
"#;

impl PrayerStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Post a prayer; anonymous prayers are stored without an author
    pub async fn create(&self, org_id: &str, user_id: &str, prayer: NewPrayer) -> SteepleResult<Prayer> {
        let id = new_id();
        let now = Utc::now();
        let author_id = (!prayer.is_anonymous).then(|| user_id.to_string());

        sqlx::query(
            r#"
            INSERT INTO prayers (id, org_id, author_id, body, is_anonymous, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(org_id)
        .bind(&author_id)
        .bind(&prayer.body)
        .bind(prayer.is_anonymous)
        .bind(format_timestamp(now))
        .execute(&self.db)
        .await?;

        Ok(Prayer {
            id,
            org_id: org_id.to_string(),
            author_id,
            body: prayer.body,
            is_anonymous: prayer.is_anonymous,
            hidden_at: None,
            created_at: now,
            reaction_count: 0,
        })
    }

    /// Visible prayers for an org, newest first
    pub async fn list_visible(&self, org_id: &str) -> SteepleResult<Vec<Prayer>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRAYER_COLUMNS}
            FROM prayers p
            WHERE p.org_id = ? AND p.hidden_at IS NULL
            ORDER BY p.created_at DESC, p.id
            LIMIT ?
            "#
        ))
        .bind(org_id)
        .bind(LIST_LIMIT)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(prayer_from_row).collect()
    }

    pub async fn get(&self, prayer_id: &str) -> SteepleResult<Option<Prayer>> {
        let row = sqlx::query(&format!(
            "SELECT {PRAYER_COLUMNS} FROM prayers p WHERE p.id = ?"
        ))
        .bind(prayer_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(prayer_from_row).transpose()
    }

    pub async fn reactions(&self, prayer_id: &str) -> SteepleResult<Vec<PrayerReaction>> {
        let rows = sqlx::query(
            "SELECT emoji, user_id FROM prayer_reactions WHERE prayer_id = ? ORDER BY created_at, user_id",
        )
        .bind(prayer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PrayerReaction {
                emoji: row.get("emoji"),
                user_id: row.get("user_id"),
            })
            .collect())
    }

    /// Toggle `emoji` for a member and return the prayer's reactions.
    ///
    /// Repeating the member's current emoji removes it; any other emoji
    /// replaces it.
    pub async fn toggle_reaction(
        &self,
        prayer_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> SteepleResult<Vec<PrayerReaction>> {
        let removed = sqlx::query(
            "DELETE FROM prayer_reactions WHERE prayer_id = ? AND user_id = ? AND emoji = ?",
        )
        .bind(prayer_id)
        .bind(user_id)
        .bind(emoji)
        .execute(&self.db)
        .await?
        .rows_affected();

        if removed == 0 {
            sqlx::query(
                r#"
                INSERT INTO prayer_reactions (prayer_id, user_id, emoji, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (prayer_id, user_id) DO UPDATE SET
                    emoji = excluded.emoji,
                    created_at = excluded.created_at
                "#,
            )
            .bind(prayer_id)
            .bind(user_id)
            .bind(emoji)
            .bind(format_timestamp(Utc::now()))
            .execute(&self.db)
            .await?;
        }

        self.reactions(prayer_id).await
    }
}

fn prayer_from_row(row: &SqliteRow) -> SteepleResult<Prayer> {
    let hidden_at: Option<String> = row.get("hidden_at");
    let created_at: String = row.get("created_at");

    Ok(Prayer {
        id: row.get("id"),
        org_id: row.get("org_id"),
        author_id: row.get("author_id"),
        body: row.get("body"),
        is_anonymous: row.get("is_anonymous"),
        hidden_at: hidden_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        reaction_count: row.get("reaction_count"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    async fn store() -> PrayerStore {
        let db = create_memory_pool().await.unwrap();
        sqlx::query("INSERT INTO organizations (id, name, slug, timezone, created_at) VALUES ('org-1', 'Grace', 'grace', 'UTC', '2024-01-01T00:00:00.000Z')")
            .execute(&db)
            .await
            .unwrap();
        PrayerStore::new(db)
    }

    fn prayer(body: &str, is_anonymous: bool) -> NewPrayer {
        NewPrayer {
            body: body.to_string(),
            is_anonymous,
        }
    }

    #[tokio::test]
    async fn test_anonymous_prayer_has_no_author() {
        let store = store().await;

        let named = store.create("org-1", "alice", prayer("For my mother", false)).await.unwrap();
        let anonymous = store.create("org-1", "alice", prayer("For my job", true)).await.unwrap();

        assert_eq!(named.author_id.as_deref(), Some("alice"));
        let fetched = store.get(&anonymous.id).await.unwrap().unwrap();
        assert!(fetched.is_anonymous);
        assert_eq!(fetched.author_id, None);
    }

    #[tokio::test]
    async fn test_hidden_prayers_are_not_listed() {
        let store = store().await;
        let kept = store.create("org-1", "alice", prayer("Kept", false)).await.unwrap();
        let hidden = store.create("org-1", "alice", prayer("Hidden", false)).await.unwrap();
        sqlx::query("UPDATE prayers SET hidden_at = '2024-06-01T00:00:00.000Z' WHERE id = ?")
            .bind(&hidden.id)
            .execute(&store.db)
            .await
            .unwrap();

        let listed = store.list_visible("org-1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![kept.id.as_str()]);
        assert!(store.list_visible("org-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_reaction() {
        let store = store().await;
        let p = store.create("org-1", "alice", prayer("Healing", false)).await.unwrap();

        let reactions = store.toggle_reaction(&p.id, "bob", "🙏").await.unwrap();
        assert_eq!(
            reactions,
            vec![PrayerReaction {
                emoji: "🙏".to_string(),
                user_id: "bob".to_string()
            }]
        );

        // A different emoji replaces the member's reaction
        let reactions = store.toggle_reaction(&p.id, "bob", "❤️").await.unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emoji, "❤️");

        store.toggle_reaction(&p.id, "carol", "🙏").await.unwrap();
        assert_eq!(store.get(&p.id).await.unwrap().unwrap().reaction_count, 2);

        // The same emoji again removes it
        let reactions = store.toggle_reaction(&p.id, "bob", "❤️").await.unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].user_id, "carol");
    }
}
