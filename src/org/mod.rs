/// Organizations and membership
///
/// Every request that touches org data resolves the caller's membership
/// here and hands the result to [`crate::policy`] for the role decision.

pub mod session;

pub use session::OrgSession;

use crate::error::{SteepleError, SteepleResult};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Member role within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Moderator,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Moderator => "moderator",
            MemberRole::Member => "member",
        }
    }
}

impl FromStr for MemberRole {
    type Err = SteepleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(MemberRole::Owner),
            "moderator" => Ok(MemberRole::Moderator),
            "member" => Ok(MemberRole::Member),
            _ => Err(SteepleError::Internal(format!("Invalid member role: {}", s))),
        }
    }
}

/// Membership lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Invited,
    Suspended,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Invited => "invited",
            MemberStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for MemberStatus {
    type Err = SteepleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MemberStatus::Active),
            "invited" => Ok(MemberStatus::Invited),
            "suspended" => Ok(MemberStatus::Suspended),
            _ => Err(SteepleError::Internal(format!("Invalid member status: {}", s))),
        }
    }
}

/// A user's membership in one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub org_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub status: MemberStatus,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Organization record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub timezone: String,
}

/// Membership manager
#[derive(Clone)]
pub struct MembershipManager {
    db: SqlitePool,
}

impl MembershipManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Look up a user's membership in an org, whatever its status
    pub async fn get_membership(
        &self,
        org_id: &str,
        user_id: &str,
    ) -> SteepleResult<Option<Membership>> {
        let row = sqlx::query(
            r#"
            SELECT org_id, user_id, role, status
            FROM organization_members
            WHERE org_id = ? AND user_id = ?
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| {
            let role: String = row.get("role");
            let status: String = row.get("status");
            Ok(Membership {
                org_id: row.get("org_id"),
                user_id: row.get("user_id"),
                role: role.parse()?,
                status: status.parse()?,
            })
        })
        .transpose()
    }

    /// Add or update a membership
    pub async fn upsert_membership(
        &self,
        org_id: &str,
        user_id: &str,
        role: MemberRole,
        status: MemberStatus,
    ) -> SteepleResult<Membership> {
        let now = crate::db::format_timestamp(chrono::Utc::now());

        sqlx::query(
            r#"
            INSERT INTO organization_members (org_id, user_id, role, status, joined_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (org_id, user_id) DO UPDATE SET
                role = excluded.role,
                status = excluded.status
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(Membership {
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
            role,
            status,
        })
    }

    /// Get organization by ID
    pub async fn get_organization(&self, org_id: &str) -> SteepleResult<Option<Organization>> {
        let row = sqlx::query("SELECT id, name, slug, timezone FROM organizations WHERE id = ?")
            .bind(org_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|row| Organization {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
            timezone: row.get("timezone"),
        }))
    }

    /// Create an organization
    pub async fn create_organization(
        &self,
        name: &str,
        slug: &str,
        timezone: &str,
    ) -> SteepleResult<Organization> {
        let id = crate::db::new_id();

        sqlx::query(
            "INSERT INTO organizations (id, name, slug, timezone, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(slug)
        .bind(timezone)
        .bind(crate::db::format_timestamp(chrono::Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(Organization {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            timezone: timezone.to_string(),
        })
    }
}
