/// Staff impersonation through single-use magic links
use crate::{
    auth::issue_access_token,
    config::AuthConfig,
    db::{format_timestamp, parse_timestamp},
    error::{StorageContext, SteepleError, SteepleResult},
    metrics::IMPERSONATION_LINKS_TOTAL,
    moderation::{AuditLog, NewAdminAction},
    org::{MembershipManager, OrgSession},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use serde_json::json;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

const TOKEN_BYTES: usize = 32;
/// Characters of the action link recorded in the audit trail
const LINK_SUFFIX_CHARS: usize = 16;

#[derive(Debug, Clone)]
pub struct MagicLink {
    pub token: String,
    pub user_id: String,
    pub org_id: String,
    pub redirect_to: Option<String>,
    pub created_by: String,
    pub expires_at: DateTime<Utc>,
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `<public_url>/auth/verify?token=..&type=magiclink[&redirect_to=..]`
pub fn action_link(public_url: &str, token: &str, redirect_to: Option<&str>) -> String {
    let mut link = format!(
        "{}/auth/verify?token={}&type=magiclink",
        public_url.trim_end_matches('/'),
        token
    );
    if let Some(redirect) = redirect_to {
        link.push_str("&redirect_to=");
        link.push_str(&urlencoding::encode(redirect));
    }
    link
}

fn link_suffix(link: &str) -> String {
    let chars: Vec<char> = link.chars().collect();
    chars[chars.len().saturating_sub(LINK_SUFFIX_CHARS)..]
        .iter()
        .collect()
}

#[derive(Clone)]
pub struct MagicLinkManager {
    db: SqlitePool,
}

impl MagicLinkManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        org_id: &str,
        user_id: &str,
        created_by: &str,
        redirect_to: Option<String>,
        ttl: Duration,
    ) -> SteepleResult<MagicLink> {
        let now = Utc::now();
        let link = MagicLink {
            token: generate_token(),
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
            redirect_to,
            created_by: created_by.to_string(),
            expires_at: now + ttl,
        };

        sqlx::query(
            r#"
            INSERT INTO magic_links (token, user_id, org_id, redirect_to, created_by, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&link.token)
        .bind(&link.user_id)
        .bind(&link.org_id)
        .bind(&link.redirect_to)
        .bind(&link.created_by)
        .bind(format_timestamp(now))
        .bind(format_timestamp(link.expires_at))
        .execute(&self.db)
        .await?;

        Ok(link)
    }

    /// Mark an unexpired, unused link consumed and return it
    pub async fn consume(&self, token: &str) -> SteepleResult<Option<MagicLink>> {
        let now = format_timestamp(Utc::now());

        let row = sqlx::query(
            r#"
            UPDATE magic_links
            SET consumed_at = ?
            WHERE token = ? AND consumed_at IS NULL AND expires_at > ?
            RETURNING token, user_id, org_id, redirect_to, created_by, expires_at
            "#,
        )
        .bind(&now)
        .bind(token)
        .bind(&now)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_link).transpose()
    }

    /// Delete links that expired before `cutoff`
    pub async fn purge_expired(&self, cutoff: DateTime<Utc>) -> SteepleResult<u64> {
        let result = sqlx::query("DELETE FROM magic_links WHERE expires_at < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

fn parse_link(row: SqliteRow) -> SteepleResult<MagicLink> {
    let expires_at: String = row.get("expires_at");
    Ok(MagicLink {
        token: row.get("token"),
        user_id: row.get("user_id"),
        org_id: row.get("org_id"),
        redirect_to: row.get("redirect_to"),
        created_by: row.get("created_by"),
        expires_at: parse_timestamp(&expires_at)?,
    })
}

/// Session minted from a consumed link
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedLink {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user_id: String,
    pub redirect_to: Option<String>,
}

#[derive(Clone)]
pub struct ImpersonationService {
    memberships: MembershipManager,
    links: MagicLinkManager,
    audit: AuditLog,
    auth: AuthConfig,
    public_url: String,
}

impl ImpersonationService {
    pub fn new(
        memberships: MembershipManager,
        links: MagicLinkManager,
        audit: AuditLog,
        auth: AuthConfig,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            memberships,
            links,
            audit,
            auth,
            public_url: public_url.into(),
        }
    }

    /// Issue a sign-in link for `target_user_id` on behalf of a staff session
    pub async fn issue_link(
        &self,
        session: &OrgSession,
        target_user_id: &str,
        redirect_to: Option<String>,
    ) -> SteepleResult<String> {
        let target = self
            .memberships
            .get_membership(&session.org_id, target_user_id)
            .await
            .storage_context(
                "organization_members.select",
                "Failed to verify target membership",
            )?;

        if !target.as_ref().is_some_and(|m| m.is_active()) {
            return Err(SteepleError::invalid("Target user is not an active member"));
        }

        let link = self
            .links
            .create(
                &session.org_id,
                target_user_id,
                &session.user_id,
                redirect_to.clone(),
                Duration::seconds(self.auth.magic_link_ttl_secs),
            )
            .await
            .storage_context("magic_links.insert", "Failed to generate impersonation link")?;

        let action_link = action_link(&self.public_url, &link.token, redirect_to.as_deref());

        self.audit
            .append(
                &session.org_id,
                &session.user_id,
                NewAdminAction {
                    action: "impersonate".to_string(),
                    target_type: "user".to_string(),
                    target_id: Some(target_user_id.to_string()),
                    payload: json!({
                        "redirect_to": redirect_to,
                        "target_user_id": target_user_id,
                        "link_suffix": link_suffix(&action_link),
                    }),
                },
            )
            .await
            .storage_context("admin_actions.insert", "Failed to log impersonation attempt")?;

        IMPERSONATION_LINKS_TOTAL.inc();
        tracing::warn!(
            actor = %session.user_id,
            target = %target_user_id,
            org_id = %session.org_id,
            "impersonation link issued"
        );

        Ok(action_link)
    }

    /// Exchange a link token for an access token
    pub async fn verify(&self, token: &str) -> SteepleResult<VerifiedLink> {
        let link = self
            .links
            .consume(token)
            .await
            .storage_context("magic_links.update", "Failed to verify link")?
            .ok_or_else(|| SteepleError::Unauthenticated("Invalid or expired link".to_string()))?;

        let access_token = issue_access_token(&link.user_id, &self.auth, Some(&link.created_by))?;

        Ok(VerifiedLink {
            access_token,
            token_type: "bearer",
            expires_in: self.auth.access_token_ttl_secs,
            user_id: link.user_id,
            redirect_to: link.redirect_to,
        })
    }
}
