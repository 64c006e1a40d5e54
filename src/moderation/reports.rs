/// Report Management System
use crate::db::{format_timestamp, new_id, parse_timestamp};
use crate::error::{SteepleError, SteepleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;

/// Kind of content a report points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Prayer,
    Announcement,
    Devotional,
    Event,
    User,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Prayer => "prayer",
            TargetType::Announcement => "announcement",
            TargetType::Devotional => "devotional",
            TargetType::Event => "event",
            TargetType::User => "user",
        }
    }

    /// Table whose `hidden_at` column controls visibility, if the type can be hidden
    pub fn hideable_table(&self) -> Option<&'static str> {
        match self {
            TargetType::Prayer => Some("prayers"),
            TargetType::Announcement => Some("announcements"),
            TargetType::Devotional | TargetType::Event | TargetType::User => None,
        }
    }
}

impl FromStr for TargetType {
    type Err = SteepleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prayer" => Ok(TargetType::Prayer),
            "announcement" => Ok(TargetType::Announcement),
            "devotional" => Ok(TargetType::Devotional),
            "event" => Ok(TargetType::Event),
            "user" => Ok(TargetType::User),
            _ => Err(SteepleError::invalid(format!("Invalid target type: {}", s))),
        }
    }
}

/// Report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    InReview,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::InReview => "in_review",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }

    /// Statuses that still need a moderator's attention
    pub fn queue() -> &'static [ReportStatus] {
        &[ReportStatus::Open, ReportStatus::InReview]
    }
}

impl FromStr for ReportStatus {
    type Err = SteepleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ReportStatus::Open),
            "in_review" => Ok(ReportStatus::InReview),
            "resolved" => Ok(ReportStatus::Resolved),
            "dismissed" => Ok(ReportStatus::Dismissed),
            _ => Err(SteepleError::invalid(format!("Invalid report status: {}", s))),
        }
    }
}

/// Moderator action on a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    Resolve,
    Dismiss,
    Reopen,
}

impl ReportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportAction::Resolve => "resolve",
            ReportAction::Dismiss => "dismiss",
            ReportAction::Reopen => "reopen",
        }
    }

    /// Compute the report fields this action writes.
    ///
    /// Any current status is a valid starting point. Reopening always clears
    /// the resolution fields, including a note the caller supplied.
    pub fn transition(
        &self,
        actor_id: &str,
        resolution_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Transition {
        match self {
            ReportAction::Resolve => Transition {
                status: ReportStatus::Resolved,
                resolved_at: Some(now),
                resolved_by: Some(actor_id.to_string()),
                resolution_note,
            },
            ReportAction::Dismiss => Transition {
                status: ReportStatus::Dismissed,
                resolved_at: Some(now),
                resolved_by: Some(actor_id.to_string()),
                resolution_note,
            },
            ReportAction::Reopen => Transition {
                status: ReportStatus::Open,
                resolved_at: None,
                resolved_by: None,
                resolution_note: None,
            },
        }
    }
}

impl FromStr for ReportAction {
    type Err = SteepleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolve" => Ok(ReportAction::Resolve),
            "dismiss" => Ok(ReportAction::Dismiss),
            "reopen" => Ok(ReportAction::Reopen),
            _ => Err(SteepleError::invalid("Invalid action")),
        }
    }
}

/// Fields written by a report action
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub status: ReportStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
}

impl Transition {
    /// Visibility after applying an optional hide directive.
    ///
    /// `Some(true)` hides at the action instant, `Some(false)` unhides and
    /// `None` keeps the current value.
    pub fn hidden_at(
        &self,
        current: Option<DateTime<Utc>>,
        hide_target: Option<bool>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match hide_target {
            Some(true) => Some(self.resolved_at.unwrap_or(now)),
            Some(false) => None,
            None => current,
        }
    }
}

/// Report record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub org_id: String,
    pub reporter_id: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub reason: String,
    pub details: Option<serde_json::Value>,
    pub status: ReportStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
    pub hidden_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new report
#[derive(Debug, Clone)]
pub struct NewReport {
    pub target_type: TargetType,
    pub target_id: String,
    pub reason: String,
    pub details: Option<serde_json::Value>,
}

const REPORT_COLUMNS: &str = "id, org_id, reporter_id, target_type, target_id, reason, details, \
     status, resolved_at, resolved_by, resolution_note, hidden_at, created_at";

/// Report manager
#[derive(Clone)]
pub struct ReportManager {
    db: SqlitePool,
}

impl ReportManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Submit a report
    pub async fn submit_report(
        &self,
        org_id: &str,
        reporter_id: &str,
        report: NewReport,
    ) -> SteepleResult<Report> {
        let now = Utc::now();
        let id = new_id();

        if report.reason.trim().is_empty() {
            return Err(SteepleError::invalid("Report reason cannot be empty"));
        }

        sqlx::query(
            r#"
            INSERT INTO reports (id, org_id, reporter_id, target_type, target_id, reason, details, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'open', ?)
            "#,
        )
        .bind(&id)
        .bind(org_id)
        .bind(reporter_id)
        .bind(report.target_type.as_str())
        .bind(&report.target_id)
        .bind(&report.reason)
        .bind(report.details.as_ref().map(|d| d.to_string()))
        .bind(format_timestamp(now))
        .execute(&self.db)
        .await?;

        Ok(Report {
            id,
            org_id: org_id.to_string(),
            reporter_id: reporter_id.to_string(),
            target_type: report.target_type,
            target_id: report.target_id,
            reason: report.reason,
            details: report.details,
            status: ReportStatus::Open,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
            hidden_at: None,
            created_at: now,
        })
    }

    /// Get a report, scoped to its organization
    pub async fn get_report(&self, org_id: &str, report_id: &str) -> SteepleResult<Option<Report>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reports WHERE id = ? AND org_id = ?",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .bind(org_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_report).transpose()
    }

    /// Write a transition and the resulting visibility, returning the updated row
    pub async fn apply_transition(
        &self,
        org_id: &str,
        report_id: &str,
        transition: &Transition,
        hidden_at: Option<DateTime<Utc>>,
    ) -> SteepleResult<Report> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reports
            SET status = ?,
                resolved_at = ?,
                resolved_by = ?,
                resolution_note = ?,
                hidden_at = ?
            WHERE id = ? AND org_id = ?
            RETURNING {}
            "#,
            REPORT_COLUMNS
        ))
        .bind(transition.status.as_str())
        .bind(transition.resolved_at.map(format_timestamp))
        .bind(&transition.resolved_by)
        .bind(&transition.resolution_note)
        .bind(hidden_at.map(format_timestamp))
        .bind(report_id)
        .bind(org_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => parse_report(row),
            None => Err(SteepleError::NotFound("Report not found".to_string())),
        }
    }

    /// Set `hidden_at` on the reported content row.
    ///
    /// Returns `false` without touching storage for target types that cannot
    /// be hidden.
    pub async fn set_target_hidden(
        &self,
        org_id: &str,
        target_type: TargetType,
        target_id: &str,
        hidden_at: Option<DateTime<Utc>>,
    ) -> SteepleResult<bool> {
        let Some(table) = target_type.hideable_table() else {
            return Ok(false);
        };

        sqlx::query(&format!(
            "UPDATE {} SET hidden_at = ? WHERE id = ? AND org_id = ?",
            table
        ))
        .bind(hidden_at.map(format_timestamp))
        .bind(target_id)
        .bind(org_id)
        .execute(&self.db)
        .await?;

        Ok(true)
    }

    /// List reports with the given statuses, newest first
    pub async fn list_reports(
        &self,
        org_id: &str,
        statuses: &[ReportStatus],
        limit: i64,
    ) -> SteepleResult<Vec<Report>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM reports WHERE org_id = ",
            REPORT_COLUMNS
        ));
        query.push_bind(org_id);

        if !statuses.is_empty() {
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }

        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(limit);

        let rows = query.build().fetch_all(&self.db).await?;
        rows.into_iter().map(parse_report).collect()
    }
}

fn parse_optional_timestamp(row: &SqliteRow, column: &str) -> SteepleResult<Option<DateTime<Utc>>> {
    row.get::<Option<String>, _>(column)
        .as_deref()
        .map(parse_timestamp)
        .transpose()
}

fn parse_report(row: SqliteRow) -> SteepleResult<Report> {
    let target_type: String = row.get("target_type");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let details = row
        .get::<Option<String>, _>("details")
        .and_then(|raw| serde_json::from_str(&raw).ok());

    Ok(Report {
        id: row.get("id"),
        org_id: row.get("org_id"),
        reporter_id: row.get("reporter_id"),
        target_type: target_type.parse()?,
        target_id: row.get("target_id"),
        reason: row.get("reason"),
        details,
        status: status.parse()?,
        resolved_at: parse_optional_timestamp(&row, "resolved_at")?,
        resolved_by: row.get("resolved_by"),
        resolution_note: row.get("resolution_note"),
        hidden_at: parse_optional_timestamp(&row, "hidden_at")?,
        created_at: parse_timestamp(&created_at)?,
    })
}
