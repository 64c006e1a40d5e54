/// Report action orchestration
use super::{
    audit::{AuditLog, NewAdminAction},
    reports::{Report, ReportAction, ReportManager},
};
use crate::{
    error::{StorageContext, SteepleError, SteepleResult},
    metrics,
    org::OrgSession,
};
use chrono::Utc;
use serde_json::json;

/// A moderator's decision on one report
#[derive(Debug, Clone)]
pub struct ModerationRequest {
    pub report_id: String,
    pub action: ReportAction,
    pub hide_target: Option<bool>,
    pub resolution_note: Option<String>,
}

/// Applies report actions: report row, then target visibility, then audit.
///
/// Steps run in sequence with no rollback; a failure after the report update
/// leaves that update in place.
#[derive(Clone)]
pub struct ModerationService {
    reports: ReportManager,
    audit: AuditLog,
}

impl ModerationService {
    pub fn new(reports: ReportManager, audit: AuditLog) -> Self {
        Self { reports, audit }
    }

    /// Apply `request` on behalf of an already-authorized staff session
    pub async fn act(&self, session: &OrgSession, request: ModerationRequest) -> SteepleResult<Report> {
        let report = self
            .reports
            .get_report(&session.org_id, &request.report_id)
            .await
            .storage_context("reports.select", "Failed to load report")?
            .ok_or_else(|| SteepleError::NotFound("Report not found".to_string()))?;

        let now = Utc::now();
        let transition = request
            .action
            .transition(&session.user_id, request.resolution_note.clone(), now);
        let hidden_at = transition.hidden_at(report.hidden_at, request.hide_target, now);

        let updated = self
            .reports
            .apply_transition(&session.org_id, &report.id, &transition, hidden_at)
            .await
            .storage_context("reports.update", "Failed to update report")?;

        if request.hide_target.is_some() {
            let written = self
                .reports
                .set_target_hidden(&session.org_id, report.target_type, &report.target_id, hidden_at)
                .await
                .storage_context("target.update", "Failed to update target visibility")?;

            if !written {
                tracing::debug!(
                    target_type = report.target_type.as_str(),
                    "target type has no visibility column, skipping"
                );
            }
        }

        self.audit
            .append(
                &session.org_id,
                &session.user_id,
                NewAdminAction {
                    action: format!("report_{}", request.action.as_str()),
                    target_type: report.target_type.as_str().to_string(),
                    target_id: Some(report.target_id.clone()),
                    payload: json!({
                        "report_id": report.id,
                        "previous_status": report.status,
                        "status": updated.status,
                        "hide_target": request.hide_target.unwrap_or(false),
                        "resolution_note": updated.resolution_note,
                    }),
                },
            )
            .await
            .storage_context("admin_actions.insert", "Failed to log admin action")?;

        metrics::record_moderation_action(request.action.as_str(), report.target_type.as_str());
        tracing::info!(
            report_id = %report.id,
            org_id = %session.org_id,
            actor = %session.user_id,
            action = request.action.as_str(),
            previous_status = report.status.as_str(),
            "report action applied"
        );

        Ok(updated)
    }
}
