/// Events and RSVPs
use crate::db::{format_timestamp, new_id, parse_timestamp};
use crate::error::{SteepleError, SteepleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Yes,
    No,
    Maybe,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Yes => "yes",
            RsvpStatus::No => "no",
            RsvpStatus::Maybe => "maybe",
        }
    }
}

impl FromStr for RsvpStatus {
    type Err = SteepleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(RsvpStatus::Yes),
            "no" => Ok(RsvpStatus::No),
            "maybe" => Ok(RsvpStatus::Maybe),
            _ => Err(SteepleError::invalid(format!("Invalid RSVP status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub org_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub capacity: Option<i64>,
    pub created_by: String,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub org_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub capacity: Option<i64>,
    pub created_by: String,
}

/// An event about to start, with the owning org's display details
#[derive(Debug, Clone)]
pub struct UpcomingEvent {
    pub id: String,
    pub org_id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub org_name: Option<String>,
    pub org_timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rsvp {
    pub event_id: String,
    pub user_id: String,
    pub status: RsvpStatus,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct EventStore {
    db: SqlitePool,
}

impl EventStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create_event(&self, event: NewEvent) -> SteepleResult<Event> {
        let id = new_id();

        sqlx::query(
            r#"
            INSERT INTO events (id, org_id, title, description, location, start_at, end_at, capacity, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&event.org_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(format_timestamp(event.start_at))
        .bind(event.end_at.map(format_timestamp))
        .bind(event.capacity)
        .bind(&event.created_by)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(Event {
            id,
            org_id: event.org_id,
            title: event.title,
            description: event.description,
            location: event.location,
            start_at: event.start_at,
            end_at: event.end_at,
            capacity: event.capacity,
            created_by: event.created_by,
        })
    }

    pub async fn get_event(&self, event_id: &str) -> SteepleResult<Option<Event>> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, title, description, location, start_at, end_at, capacity, created_by
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    /// An org's events, earliest start first
    pub async fn list_events(&self, org_id: &str) -> SteepleResult<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, title, description, location, start_at, end_at, capacity, created_by
            FROM events
            WHERE org_id = ?
            ORDER BY start_at, id
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    /// Number of "yes" RSVPs
    pub async fn attendee_count(&self, event_id: &str) -> SteepleResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rsvps WHERE event_id = ? AND status = 'yes'",
        )
        .bind(event_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    pub async fn rsvp_status(&self, event_id: &str, user_id: &str) -> SteepleResult<Option<RsvpStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM rsvps WHERE event_id = ? AND user_id = ?")
                .bind(event_id)
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        status.as_deref().map(str::parse::<RsvpStatus>).transpose()
    }

    /// Events whose start falls in `[from, to]`, earliest first
    pub async fn events_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SteepleResult<Vec<UpcomingEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.org_id, e.title, e.start_at, o.name AS org_name, o.timezone AS org_timezone
            FROM events e
            LEFT JOIN organizations o ON o.id = e.org_id
            WHERE e.start_at >= ? AND e.start_at <= ?
            ORDER BY e.start_at, e.id
            "#,
        )
        .bind(format_timestamp(from))
        .bind(format_timestamp(to))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let start_at: String = row.get("start_at");
                Ok(UpcomingEvent {
                    id: row.get("id"),
                    org_id: row.get("org_id"),
                    title: row.get("title"),
                    start_at: parse_timestamp(&start_at)?,
                    org_name: row.get("org_name"),
                    org_timezone: row.get("org_timezone"),
                })
            })
            .collect()
    }

    /// Distinct users who answered "yes"
    pub async fn confirmed_attendees(&self, event_id: &str) -> SteepleResult<Vec<String>> {
        let user_ids = sqlx::query_scalar(
            "SELECT DISTINCT user_id FROM rsvps WHERE event_id = ? AND status = 'yes' ORDER BY user_id",
        )
        .bind(event_id)
        .fetch_all(&self.db)
        .await?;

        Ok(user_ids)
    }

    pub async fn upsert_rsvp(
        &self,
        event_id: &str,
        user_id: &str,
        status: RsvpStatus,
        notes: Option<String>,
    ) -> SteepleResult<Rsvp> {
        let now = format_timestamp(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO rsvps (event_id, user_id, status, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (event_id, user_id) DO UPDATE SET
                status = excluded.status,
                notes = excluded.notes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(status.as_str())
        .bind(&notes)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(Rsvp {
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            status,
            notes,
        })
    }
}

fn event_from_row(row: &SqliteRow) -> SteepleResult<Event> {
    let start_at: String = row.get("start_at");
    let end_at: Option<String> = row.get("end_at");

    Ok(Event {
        id: row.get("id"),
        org_id: row.get("org_id"),
        title: row.get("title"),
        description: row.get("description"),
        location: row.get("location"),
        start_at: parse_timestamp(&start_at)?,
        end_at: end_at.as_deref().map(parse_timestamp).transpose()?,
        capacity: row.get("capacity"),
        created_by: row.get("created_by"),
    })
}
