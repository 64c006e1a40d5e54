/// Org announcements
use crate::db::{format_timestamp, new_id, parse_timestamp};
use crate::error::SteepleResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Announcement {
    pub id: String,
    pub org_id: String,
    pub author_id: String,
    pub title: String,
    pub body: String,
    pub pinned: bool,
    pub published_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAnnouncement {
    pub title: String,
    pub body: String,
    pub pinned: bool,
    pub published_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct AnnouncementStore {
    db: SqlitePool,
}

impl AnnouncementStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        org_id: &str,
        author_id: &str,
        announcement: NewAnnouncement,
    ) -> SteepleResult<Announcement> {
        let id = new_id();

        sqlx::query(
            r#"
            INSERT INTO announcements (id, org_id, author_id, title, body, pinned, published_at, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(org_id)
        .bind(author_id)
        .bind(&announcement.title)
        .bind(&announcement.body)
        .bind(announcement.pinned)
        .bind(format_timestamp(announcement.published_at))
        .bind(announcement.expires_at.map(format_timestamp))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(Announcement {
            id,
            org_id: org_id.to_string(),
            author_id: author_id.to_string(),
            title: announcement.title,
            body: announcement.body,
            pinned: announcement.pinned,
            published_at: announcement.published_at,
            expires_at: announcement.expires_at,
        })
    }

    /// Announcements live at `now`: published, not expired and not hidden.
    ///
    /// Pinned announcements come first, then the most recently published.
    pub async fn list_current(&self, org_id: &str, now: DateTime<Utc>) -> SteepleResult<Vec<Announcement>> {
        let now = format_timestamp(now);
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, author_id, title, body, pinned, published_at, expires_at
            FROM announcements
            WHERE org_id = ?
              AND hidden_at IS NULL
              AND published_at <= ?
              AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY pinned DESC, published_at DESC, id
            "#,
        )
        .bind(org_id)
        .bind(&now)
        .bind(&now)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(announcement_from_row).collect()
    }

    /// A single visible announcement
    pub async fn get_visible(&self, announcement_id: &str) -> SteepleResult<Option<Announcement>> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, author_id, title, body, pinned, published_at, expires_at
            FROM announcements
            WHERE id = ? AND hidden_at IS NULL
            "#,
        )
        .bind(announcement_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(announcement_from_row).transpose()
    }
}

fn announcement_from_row(row: &SqliteRow) -> SteepleResult<Announcement> {
    let published_at: String = row.get("published_at");
    let expires_at: Option<String> = row.get("expires_at");

    Ok(Announcement {
        id: row.get("id"),
        org_id: row.get("org_id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        body: row.get("body"),
        pinned: row.get("pinned"),
        published_at: parse_timestamp(&published_at)?,
        expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
    })
}
