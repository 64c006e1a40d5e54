/// Daily devotionals
use crate::db::{format_timestamp, new_id, parse_timestamp};
use crate::error::SteepleResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Devotional {
    pub id: String,
    pub org_id: String,
    pub author_id: String,
    pub title: String,
    pub body: String,
    pub scripture_reference: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDevotional {
    pub title: String,
    pub body: String,
    pub scripture_reference: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DevotionalStore {
    db: SqlitePool,
}

impl DevotionalStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        org_id: &str,
        author_id: &str,
        devotional: NewDevotional,
    ) -> SteepleResult<Devotional> {
        let id = new_id();

        sqlx::query(
            r#"
            INSERT INTO devotionals (id, org_id, author_id, title, body, scripture_reference, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(org_id)
        .bind(author_id)
        .bind(&devotional.title)
        .bind(&devotional.body)
        .bind(&devotional.scripture_reference)
        .bind(format_timestamp(devotional.published_at))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(Devotional {
            id,
            org_id: org_id.to_string(),
            author_id: author_id.to_string(),
            title: devotional.title,
            body: devotional.body,
            scripture_reference: devotional.scripture_reference,
            published_at: devotional.published_at,
        })
    }

    /// Most recently published devotional as of `now`
    pub async fn latest(&self, org_id: &str, now: DateTime<Utc>) -> SteepleResult<Option<Devotional>> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, author_id, title, body, scripture_reference, published_at
            FROM devotionals
            WHERE org_id = ? AND published_at <= ?
            ORDER BY published_at DESC, id
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .bind(format_timestamp(now))
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| {
            let published_at: String = row.get("published_at");
            Ok(Devotional {
                id: row.get("id"),
                org_id: row.get("org_id"),
                author_id: row.get("author_id"),
                title: row.get("title"),
                body: row.get("body"),
                scripture_reference: row.get("scripture_reference"),
                published_at: parse_timestamp(&published_at)?,
            })
        })
        .transpose()
    }
}
