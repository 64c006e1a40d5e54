/// Append-only audit trail of staff actions
use crate::db::{format_timestamp, new_id, parse_timestamp};
use crate::error::SteepleResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

/// Audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAction {
    pub id: String,
    pub org_id: String,
    pub actor_id: String,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Input for an audit entry
#[derive(Debug, Clone)]
pub struct NewAdminAction {
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub payload: Value,
}

/// Audit log. Entries are only ever inserted.
#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
}

impl AuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn append(
        &self,
        org_id: &str,
        actor_id: &str,
        entry: NewAdminAction,
    ) -> SteepleResult<AdminAction> {
        let id = new_id();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO admin_actions (id, org_id, actor_id, action, target_type, target_id, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(org_id)
        .bind(actor_id)
        .bind(&entry.action)
        .bind(&entry.target_type)
        .bind(&entry.target_id)
        .bind(entry.payload.to_string())
        .bind(format_timestamp(now))
        .execute(&self.db)
        .await?;

        Ok(AdminAction {
            id,
            org_id: org_id.to_string(),
            actor_id: actor_id.to_string(),
            action: entry.action,
            target_type: entry.target_type,
            target_id: entry.target_id,
            payload: entry.payload,
            created_at: now,
        })
    }

    /// Most recent entries for an org
    pub async fn list_for_org(&self, org_id: &str, limit: i64) -> SteepleResult<Vec<AdminAction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, actor_id, action, target_type, target_id, payload, created_at
            FROM admin_actions
            WHERE org_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(org_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                let payload = row
                    .get::<Option<String>, _>("payload")
                    .and_then(|raw| serde_json::from_str(&raw).ok())
                    .unwrap_or(Value::Null);

                Ok(AdminAction {
                    id: row.get("id"),
                    org_id: row.get("org_id"),
                    actor_id: row.get("actor_id"),
                    action: row.get("action"),
                    target_type: row.get("target_type"),
                    target_id: row.get("target_id"),
                    payload,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_and_list() {
        let log = AuditLog::new(create_memory_pool().await.unwrap());

        log.append(
            "org-1",
            "mod-1",
            NewAdminAction {
                action: "report_resolve".to_string(),
                target_type: "prayer".to_string(),
                target_id: Some("prayer-1".to_string()),
                payload: json!({ "report_id": "r-1", "hide_target": true }),
            },
        )
        .await
        .unwrap();

        let entries = log.list_for_org("org-1", 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "report_resolve");
        assert_eq!(entries[0].payload["hide_target"], true);

        assert!(log.list_for_org("org-2", 10).await.unwrap().is_empty());
    }
}
